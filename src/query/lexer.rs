use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Identifier(String),
    Number(f64),
    Integer(i64),
    String(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Minus,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    Eof,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars();
        let peeked = chars.next();
        Self {
            input,
            chars,
            peeked,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let current = self.peeked.take();
        self.peeked = self.chars.next();
        current
    }

    fn peek(&self) -> Option<char> {
        self.peeked
    }

    fn consume_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            buf.push(ch);
            self.bump();
        }
        buf
    }

    /// Consume `second` if it is next, choosing between the two tokens
    fn one_or_two(&mut self, second: char, single: Token, double: Token) -> Token {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            double
        } else {
            single
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.consume_while(char::is_whitespace);
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '(' => {
                self.bump();
                Ok(Token::LParen)
            }
            ')' => {
                self.bump();
                Ok(Token::RParen)
            }
            '[' => {
                self.bump();
                Ok(Token::LBracket)
            }
            ']' => {
                self.bump();
                Ok(Token::RBracket)
            }
            ',' => {
                self.bump();
                Ok(Token::Comma)
            }
            '-' => {
                self.bump();
                Ok(Token::Minus)
            }
            '~' => {
                self.bump();
                Ok(Token::Not)
            }
            '&' => Ok(self.one_or_two('&', Token::And, Token::And)),
            '|' => Ok(self.one_or_two('|', Token::Or, Token::Or)),
            '<' => Ok(self.one_or_two('=', Token::Less, Token::LessEquals)),
            '>' => Ok(self.one_or_two('=', Token::Greater, Token::GreaterEquals)),
            '!' => Ok(self.one_or_two('=', Token::Not, Token::NotEquals)),
            '=' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(Token::Equals)
                } else {
                    Err(self.error("single '=' is not a comparison, use '=='"))
                }
            }
            '\'' | '"' => self.string_literal(ch),
            '`' => {
                self.bump();
                let name = self.consume_while(|c| c != '`');
                if self.bump() != Some('`') {
                    return Err(self.error("unterminated backtick identifier"));
                }
                Ok(Token::Identifier(name))
            }
            c if c.is_ascii_digit() || c == '.' => self.number(),
            c if is_ident_start(c) => {
                let ident = self.consume_while(is_ident_part);
                Ok(keyword(&ident).unwrap_or(Token::Identifier(ident)))
            }
            other => Err(self.error(&format!("unexpected character {:?}", other))),
        }
    }

    fn string_literal(&mut self, quote: char) -> Result<Token> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => return Ok(Token::String(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Token> {
        let mut text = self.consume_while(|c| c.is_ascii_digit() || c == '.' || c == '_');
        text.retain(|c| c != '_');
        if matches!(self.peek(), Some('e' | 'E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            let digits = self.consume_while(|c| c.is_ascii_digit());
            if digits.is_empty() {
                return Err(self.error(&format!("invalid number {:?}", text)));
            }
            text.push_str(&digits);
        }

        if let Ok(i) = text.parse::<i64>() {
            return Ok(Token::Integer(i));
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(&format!("invalid number {:?}", text)))
    }

    fn error(&self, message: &str) -> EngineError {
        EngineError::InvalidExpression(format!("{} in {:?}", message, self.input))
    }
}

fn keyword(ident: &str) -> Option<Token> {
    match ident.to_ascii_lowercase().as_str() {
        "and" => Some(Token::And),
        "or" => Some(Token::Or),
        "not" => Some(Token::Not),
        "in" => Some(Token::In),
        "true" => Some(Token::True),
        "false" => Some(Token::False),
        _ => None,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap()
    }

    #[test]
    fn test_comparison_and_keywords() {
        assert_eq!(
            lex("age >= 30 AND name != 'bob'"),
            vec![
                Token::Identifier("age".into()),
                Token::GreaterEquals,
                Token::Integer(30),
                Token::And,
                Token::Identifier("name".into()),
                Token::NotEquals,
                Token::String("bob".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_symbolic_operators_and_backticks() {
        assert_eq!(
            lex("~(`gene A` < 1.5e-1) | x == \"q\\\"x\""),
            vec![
                Token::Not,
                Token::LParen,
                Token::Identifier("gene A".into()),
                Token::Less,
                Token::Number(0.15),
                Token::RParen,
                Token::Or,
                Token::Identifier("x".into()),
                Token::Equals,
                Token::String("q\"x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_errors() {
        for bad in ["a = 1", "'open", "a # b", "`col", "1e"] {
            let err = Lexer::new(bad).tokenize().unwrap_err();
            assert!(matches!(err, EngineError::InvalidExpression(_)), "{}", bad);
        }
    }
}
