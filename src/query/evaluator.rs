//! Row-wise evaluation of a parsed filter expression under three-valued logic

use crate::data_utils::Scalar;
use crate::ingestion::schema_inference::parse_datetime;
use crate::query::parser::{CompareOp, Expr, Literal};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Kleene truth value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn from_bool(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    fn negate(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    fn to_scalar(self) -> Scalar {
        match self {
            Truth::True => Scalar::Bool(true),
            Truth::False => Scalar::Bool(false),
            Truth::Unknown => Scalar::Null,
        }
    }
}

/// Operands of incompatible types met in one row; the row is dropped
#[derive(Clone, Debug, PartialEq)]
pub struct TypeMismatch {
    pub left: &'static str,
    pub right: &'static str,
}

type RowResult<T> = std::result::Result<T, TypeMismatch>;

fn kind(value: &Scalar) -> &'static str {
    match value {
        Scalar::Null => "null",
        Scalar::Bool(_) => "boolean",
        Scalar::Int(_) | Scalar::Float(_) => "number",
        Scalar::Str(_) => "string",
        Scalar::Temporal(_) => "temporal",
    }
}

fn literal_scalar(literal: &Literal) -> Scalar {
    match literal {
        Literal::Integer(i) => Scalar::Int(*i),
        Literal::Number(n) => Scalar::Float(*n),
        Literal::Text(s) => Scalar::Str(s.clone()),
        Literal::Boolean(b) => Scalar::Bool(*b),
    }
}

/// Order two non-null scalars, `None` when they cannot be compared
/// (NaN against anything)
fn order(left: &Scalar, right: &Scalar) -> RowResult<Option<Ordering>> {
    let mismatch = || TypeMismatch {
        left: kind(left),
        right: kind(right),
    };
    let ordering = match (left, right) {
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Scalar::Int(_) | Scalar::Float(_), Scalar::Int(_) | Scalar::Float(_)) => {
            let (a, b) = (left.as_f64(), right.as_f64());
            a.zip(b).and_then(|(a, b)| a.partial_cmp(&b))
        }
        (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Temporal(a), Scalar::Temporal(b)) => Some(a.cmp(b)),
        (Scalar::Temporal(a), Scalar::Str(s)) => Some(a.cmp(&parse_datetime(s).ok_or_else(mismatch)?)),
        (Scalar::Str(s), Scalar::Temporal(b)) => Some(parse_datetime(s).ok_or_else(mismatch)?.cmp(b)),
        _ => return Err(mismatch()),
    };
    Ok(ordering)
}

fn compare(op: CompareOp, left: &Scalar, right: &Scalar) -> RowResult<Truth> {
    if left.is_null() || right.is_null() {
        return Ok(Truth::Unknown);
    }
    let Some(ordering) = order(left, right)? else {
        return Ok(Truth::Unknown);
    };
    let result = match op {
        CompareOp::Equals => ordering == Ordering::Equal,
        CompareOp::NotEquals => ordering != Ordering::Equal,
        CompareOp::Less => ordering == Ordering::Less,
        CompareOp::LessEquals => ordering != Ordering::Greater,
        CompareOp::Greater => ordering == Ordering::Greater,
        CompareOp::GreaterEquals => ordering != Ordering::Less,
    };
    Ok(Truth::from_bool(result))
}

/// Columns the expression reads, materialized once
pub struct RowContext<'a> {
    columns: HashMap<&'a str, &'a [Scalar]>,
}

impl<'a> RowContext<'a> {
    pub fn new(columns: &'a [(String, Vec<Scalar>)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, cells)| (name.as_str(), cells.as_slice()))
                .collect(),
        }
    }

    fn cell(&self, name: &str, row: usize) -> Scalar {
        self.columns
            .get(name)
            .and_then(|cells| cells.get(row))
            .cloned()
            .unwrap_or(Scalar::Null)
    }

    /// Evaluate the predicate for one row
    pub fn eval_predicate(&self, expr: &Expr, row: usize) -> RowResult<Truth> {
        match expr {
            Expr::Not(inner) => Ok(self.eval_predicate(inner, row)?.negate()),
            Expr::And(left, right) => match self.eval_predicate(left, row)? {
                Truth::False => Ok(Truth::False),
                Truth::True => self.eval_predicate(right, row),
                Truth::Unknown => match self.eval_predicate(right, row)? {
                    Truth::False => Ok(Truth::False),
                    _ => Ok(Truth::Unknown),
                },
            },
            Expr::Or(left, right) => match self.eval_predicate(left, row)? {
                Truth::True => Ok(Truth::True),
                Truth::False => self.eval_predicate(right, row),
                Truth::Unknown => match self.eval_predicate(right, row)? {
                    Truth::True => Ok(Truth::True),
                    _ => Ok(Truth::Unknown),
                },
            },
            Expr::Compare { op, left, right } => {
                let left = self.eval_value(left, row)?;
                let right = self.eval_value(right, row)?;
                compare(*op, &left, &right)
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let value = self.eval_value(expr, row)?;
                let truth = self.membership(&value, list, row)?;
                Ok(if *negated { truth.negate() } else { truth })
            }
            Expr::Literal(_) | Expr::Column(_) => match self.eval_value(expr, row)? {
                Scalar::Bool(b) => Ok(Truth::from_bool(b)),
                Scalar::Null => Ok(Truth::Unknown),
                other => Err(TypeMismatch {
                    left: kind(&other),
                    right: "boolean",
                }),
            },
        }
    }

    fn eval_value(&self, expr: &Expr, row: usize) -> RowResult<Scalar> {
        match expr {
            Expr::Literal(literal) => Ok(literal_scalar(literal)),
            Expr::Column(name) => Ok(self.cell(name, row)),
            predicate => Ok(self.eval_predicate(predicate, row)?.to_scalar()),
        }
    }

    fn membership(&self, value: &Scalar, list: &[Expr], row: usize) -> RowResult<Truth> {
        if value.is_null() {
            return Ok(Truth::Unknown);
        }
        let mut saw_unknown = false;
        for item in list {
            let candidate = self.eval_value(item, row)?;
            // Items of another type simply do not match
            match compare(CompareOp::Equals, value, &candidate) {
                Ok(Truth::True) => return Ok(Truth::True),
                Ok(Truth::Unknown) => saw_unknown = true,
                Ok(Truth::False) | Err(_) => {}
            }
        }
        Ok(if saw_unknown { Truth::Unknown } else { Truth::False })
    }
}
