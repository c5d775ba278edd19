//! Column-wise lowering of a filter expression onto polars expressions
//!
//! Only trees whose every comparison is statically type-consistent are
//! lowered. Polars compares with nulls as unknown and combines booleans with
//! Kleene `and`/`or`, so the lowered mask keeps exactly the rows the row-wise
//! evaluator would keep. Anything that could raise a per-row type error goes
//! back to the row-wise path.

use crate::data_utils::{column_type, ColumnType};
use crate::ingestion::schema_inference::parse_datetime;
use crate::query::parser::{CompareOp, Expr, Literal};
use polars::prelude as pl;
use polars::prelude::{DataFrame, DataType, TimeUnit};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Numeric,
    Text,
    Boolean,
    /// Epoch milliseconds
    Temporal,
}

/// A lowered operand. Text literals are kept aside so they can still be
/// read as timestamps against a temporal column.
struct Operand {
    expr: pl::Expr,
    kind: Kind,
    text: Option<String>,
}

/// Polars mask for `expr`, or `None` when the tree needs row-wise evaluation
pub fn lower(expr: &Expr, df: &DataFrame) -> Option<pl::Expr> {
    let columns = expr.columns();
    if columns.is_empty() {
        return None;
    }
    // NaN compares as unknown row-wise but is ordered by polars
    for name in &columns {
        if has_nan(df, name)? {
            return None;
        }
    }
    Lowering { df }.predicate(expr)
}

fn has_nan(df: &DataFrame, name: &str) -> Option<bool> {
    let series = df.column(name).ok()?;
    if !series.dtype().is_float() {
        return Some(false);
    }
    let floats = series.cast(&DataType::Float64).ok()?;
    let values = floats.f64().ok()?;
    let has_nan = values.into_iter().flatten().any(f64::is_nan);
    Some(has_nan)
}

struct Lowering<'a> {
    df: &'a DataFrame,
}

impl Lowering<'_> {
    fn predicate(&self, expr: &Expr) -> Option<pl::Expr> {
        match expr {
            Expr::Not(inner) => Some(self.predicate(inner)?.not()),
            Expr::And(left, right) => Some(self.predicate(left)?.and(self.predicate(right)?)),
            Expr::Or(left, right) => Some(self.predicate(left)?.or(self.predicate(right)?)),
            Expr::Compare { op, left, right } => self.compare(*op, left, right),
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let membership = self.membership(expr, list)?;
                Some(if *negated { membership.not() } else { membership })
            }
            Expr::Column(_) | Expr::Literal(_) => {
                let operand = self.operand(expr)?;
                (operand.kind == Kind::Boolean).then_some(operand.expr)
            }
        }
    }

    fn operand(&self, expr: &Expr) -> Option<Operand> {
        let (expr, kind, text) = match expr {
            Expr::Column(name) => {
                let series = self.df.column(name).ok()?;
                match column_type(series) {
                    ColumnType::Integer | ColumnType::Float => (pl::col(name), Kind::Numeric, None),
                    ColumnType::Boolean => (pl::col(name), Kind::Boolean, None),
                    ColumnType::Temporal => (
                        pl::col(name)
                            .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                            .cast(DataType::Int64),
                        Kind::Temporal,
                        None,
                    ),
                    // Only real string columns; other dtypes fall back
                    ColumnType::String if series.dtype() == &DataType::String => {
                        (pl::col(name), Kind::Text, None)
                    }
                    ColumnType::String => return None,
                }
            }
            Expr::Literal(Literal::Integer(i)) => (pl::lit(*i), Kind::Numeric, None),
            Expr::Literal(Literal::Number(f)) if !f.is_nan() => (pl::lit(*f), Kind::Numeric, None),
            Expr::Literal(Literal::Boolean(b)) => (pl::lit(*b), Kind::Boolean, None),
            Expr::Literal(Literal::Text(s)) => (pl::lit(s.clone()), Kind::Text, Some(s.clone())),
            _ => return None,
        };
        Some(Operand { expr, kind, text })
    }

    /// Bring both sides to one kind, reading a text literal as a timestamp
    /// when the other side is temporal
    fn unify(left: Operand, right: Operand) -> Option<(pl::Expr, pl::Expr, Kind)> {
        match (left.kind, right.kind) {
            (a, b) if a == b => Some((left.expr, right.expr, a)),
            (Kind::Temporal, Kind::Text) => {
                let millis = parse_datetime(right.text.as_deref()?)?.and_utc().timestamp_millis();
                Some((left.expr, pl::lit(millis), Kind::Temporal))
            }
            (Kind::Text, Kind::Temporal) => {
                let millis = parse_datetime(left.text.as_deref()?)?.and_utc().timestamp_millis();
                Some((pl::lit(millis), right.expr, Kind::Temporal))
            }
            _ => None,
        }
    }

    fn compare(&self, op: CompareOp, left: &Expr, right: &Expr) -> Option<pl::Expr> {
        let (l, r, kind) = Self::unify(self.operand(left)?, self.operand(right)?)?;
        let ordered = !matches!(op, CompareOp::Equals | CompareOp::NotEquals);
        if ordered && kind == Kind::Boolean {
            return None;
        }
        Some(match op {
            CompareOp::Equals => l.eq(r),
            CompareOp::NotEquals => l.neq(r),
            CompareOp::Less => l.lt(r),
            CompareOp::LessEquals => l.lt_eq(r),
            CompareOp::Greater => l.gt(r),
            CompareOp::GreaterEquals => l.gt_eq(r),
        })
    }

    /// `x in [a, b]` as `x == a or x == b`. Items of another kind never
    /// match and are left out; with none left the row-wise path decides.
    fn membership(&self, value: &Expr, list: &[Expr]) -> Option<pl::Expr> {
        let mut chain: Option<pl::Expr> = None;
        for item in list {
            let (l, r, _) = match Self::unify(self.operand(value)?, self.operand(item)?) {
                Some(pair) => pair,
                None => continue,
            };
            let test = l.eq(r);
            chain = Some(match chain {
                Some(acc) => acc.or(test),
                None => test,
            });
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use polars::prelude::*;

    fn frame() -> DataFrame {
        let visits = Series::new("visit", &[Some(0i64), Some(86_400_000), None])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let mut df = df![
            "age" => [Some(25i64), Some(40), None],
            "gene_A" => [Some(0.3), None, Some(0.9)],
            "dept" => [Some("a"), Some("b"), None],
            "positive" => [Some(true), None, Some(false)]
        ]
        .unwrap();
        df.with_column(visits).unwrap();
        df
    }

    fn lowers(expression: &str) -> bool {
        lower(&parse(expression).unwrap(), &frame()).is_some()
    }

    #[test]
    fn test_type_consistent_trees_lower() {
        assert!(lowers("age > 30 and gene_A < 0.5"));
        assert!(lowers("not (dept == 'a') or positive"));
        assert!(lowers("visit >= '1970-01-02'"));
        assert!(lowers("dept not in ['a', 1]"));
        assert!(lowers("positive != false"));
    }

    #[test]
    fn test_possible_type_errors_stay_row_wise() {
        assert!(!lowers("age > 'x'"));
        assert!(!lowers("visit > 'not a date'"));
        assert!(!lowers("dept"));
        assert!(!lowers("positive < true"));
        assert!(!lowers("dept in [1, 2]"));
        assert!(!lowers("1 < 2"));
    }

    #[test]
    fn test_nan_columns_stay_row_wise() {
        let df = df!["x" => [1.0, f64::NAN]].unwrap();
        assert!(lower(&parse("x > 0").unwrap(), &df).is_none());
    }
}
