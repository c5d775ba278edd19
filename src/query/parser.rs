use crate::error::{EngineError, Result};
use crate::query::lexer::{Lexer, Token};

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Integer(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Column(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
}

impl Expr {
    /// Column names referenced anywhere in the tree, first occurrence order
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::In { expr, list, .. } => {
                expr.collect_columns(out);
                for item in list {
                    item.collect_columns(out);
                }
            }
        }
    }
}

// Binding powers: or < and < not < comparison
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_COMPARE: u8 = 4;

enum Infix {
    Or,
    And,
    Compare(CompareOp),
    In { negated: bool },
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if *self.peek() == token {
            self.bump();
            Ok(())
        } else {
            Err(EngineError::InvalidExpression(format!(
                "expected {:?}, found {:?}",
                token,
                self.peek()
            )))
        }
    }

    pub fn parse(mut self) -> Result<Expr> {
        if *self.peek() == Token::Eof {
            return Err(EngineError::InvalidExpression("empty expression".to_string()));
        }
        let expr = self.parse_expr(0)?;
        if *self.peek() != Token::Eof {
            return Err(EngineError::InvalidExpression(format!(
                "unexpected token {:?}",
                self.peek()
            )));
        }
        Ok(expr)
    }

    fn infix(&self) -> Option<(Infix, u8)> {
        let infix = match self.peek() {
            Token::Or => (Infix::Or, PREC_OR),
            Token::And => (Infix::And, PREC_AND),
            Token::Equals => (Infix::Compare(CompareOp::Equals), PREC_COMPARE),
            Token::NotEquals => (Infix::Compare(CompareOp::NotEquals), PREC_COMPARE),
            Token::Less => (Infix::Compare(CompareOp::Less), PREC_COMPARE),
            Token::LessEquals => (Infix::Compare(CompareOp::LessEquals), PREC_COMPARE),
            Token::Greater => (Infix::Compare(CompareOp::Greater), PREC_COMPARE),
            Token::GreaterEquals => (Infix::Compare(CompareOp::GreaterEquals), PREC_COMPARE),
            Token::In => (Infix::In { negated: false }, PREC_COMPARE),
            Token::Not if *self.peek_at(1) == Token::In => (Infix::In { negated: true }, PREC_COMPARE),
            _ => return None,
        };
        Some(infix)
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some((infix, prec)) = self.infix() {
            if prec < min_prec {
                break;
            }
            left = match infix {
                Infix::Or => {
                    self.bump();
                    let right = self.parse_expr(prec + 1)?;
                    Expr::Or(Box::new(left), Box::new(right))
                }
                Infix::And => {
                    self.bump();
                    let right = self.parse_expr(prec + 1)?;
                    Expr::And(Box::new(left), Box::new(right))
                }
                Infix::Compare(op) => {
                    if matches!(left, Expr::Compare { .. } | Expr::In { .. }) {
                        return Err(EngineError::InvalidExpression(
                            "chained comparisons are not supported".to_string(),
                        ));
                    }
                    self.bump();
                    let right = self.parse_expr(prec + 1)?;
                    Expr::Compare {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
                Infix::In { negated } => {
                    if negated {
                        self.bump();
                    }
                    self.bump();
                    let list = self.parse_list()?;
                    Expr::In {
                        expr: Box::new(left),
                        list,
                        negated,
                    }
                }
            };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        match self.bump() {
            Token::Not => {
                let inner = self.parse_expr(PREC_NOT)?;
                Ok(Expr::Not(Box::new(inner)))
            }
            Token::Minus => match self.bump() {
                Token::Integer(i) => Ok(Expr::Literal(Literal::Integer(-i))),
                Token::Number(n) => Ok(Expr::Literal(Literal::Number(-n))),
                other => Err(EngineError::InvalidExpression(format!(
                    "expected a number after '-', found {:?}",
                    other
                ))),
            },
            Token::Integer(i) => Ok(Expr::Literal(Literal::Integer(i))),
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::String(s) => Ok(Expr::Literal(Literal::Text(s))),
            Token::True => Ok(Expr::Literal(Literal::Boolean(true))),
            Token::False => Ok(Expr::Literal(Literal::Boolean(false))),
            Token::Identifier(name) => Ok(Expr::Column(name)),
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Eof => Err(EngineError::InvalidExpression(
                "unexpected end of expression".to_string(),
            )),
            other => Err(EngineError::InvalidExpression(format!(
                "unexpected token in expression: {:?}",
                other
            ))),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LBracket)?;
        let mut items = Vec::new();
        if *self.peek() == Token::RBracket {
            self.bump();
            return Ok(items);
        }
        loop {
            items.push(self.parse_prefix()?);
            match self.bump() {
                Token::Comma => continue,
                Token::RBracket => return Ok(items),
                other => {
                    return Err(EngineError::InvalidExpression(format!(
                        "expected ',' or ']' in list, found {:?}",
                        other
                    )))
                }
            }
        }
    }
}

/// Parse a filter expression into a tree
pub fn parse(input: &str) -> Result<Expr> {
    Parser::new(input)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::Column(name.to_string()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Integer(i)))
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a > 1 or b < 2 and c == 3").unwrap();
        let expected = Expr::Or(
            Box::new(Expr::Compare {
                op: CompareOp::Greater,
                left: col("a"),
                right: int(1),
            }),
            Box::new(Expr::And(
                Box::new(Expr::Compare {
                    op: CompareOp::Less,
                    left: col("b"),
                    right: int(2),
                }),
                Box::new(Expr::Compare {
                    op: CompareOp::Equals,
                    left: col("c"),
                    right: int(3),
                }),
            )),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_not_applies_to_comparison() {
        let expr = parse("not a == -1").unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::Compare {
                op: CompareOp::Equals,
                left: col("a"),
                right: int(-1),
            }))
        );
    }

    #[test]
    fn test_not_in_list() {
        let expr = parse("dept not in ['a', \"b\"]").unwrap();
        assert_eq!(
            expr,
            Expr::In {
                expr: col("dept"),
                list: vec![
                    Expr::Literal(Literal::Text("a".into())),
                    Expr::Literal(Literal::Text("b".into())),
                ],
                negated: true,
            }
        );
    }

    #[test]
    fn test_columns_are_collected_once() {
        let expr = parse("(x > 1 and y < 2) or x == 3").unwrap();
        assert_eq!(expr.columns(), vec!["x", "y"]);
    }

    #[test]
    fn test_malformed_expressions() {
        for bad in ["", "a >", "a > 1 and", "(a > 1", "a > 1 b", "a < b < c", "x in 3", "- a"] {
            assert!(
                matches!(parse(bad), Err(EngineError::InvalidExpression(_))),
                "expected failure for {:?}",
                bad
            );
        }
    }
}
