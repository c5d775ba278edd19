//! Query Module - closed boolean filter language over table columns
//!
//! Expressions are tokenized and parsed with a Pratt parser. Type-consistent
//! trees run column-wise as polars expressions; the rest are evaluated row by
//! row under three-valued logic. Nothing is handed to a host evaluator.

pub mod columnar;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use evaluator::{RowContext, Truth};
pub use parser::{parse, CompareOp, Expr, Literal};

use crate::data_utils::{column_scalars, require_column};
use crate::error::Result;
use polars::prelude::*;
use tracing::debug;

/// Keep the rows for which `expression` is true
pub fn filter(df: &DataFrame, expression: &str) -> Result<DataFrame> {
    let expr = parse(expression)?;
    for name in expr.columns() {
        require_column(df, &name)?;
    }

    match columnar::lower(&expr, df) {
        Some(mask) => {
            debug!("Filter {:?} runs column-wise", expression);
            Ok(df.clone().lazy().filter(mask).collect()?)
        }
        None => filter_row_wise(df, &expr),
    }
}

/// Evaluate the predicate one row at a time. Rows that hit a type mismatch
/// are dropped.
pub fn filter_row_wise(df: &DataFrame, expr: &Expr) -> Result<DataFrame> {
    let mut columns = Vec::new();
    for name in expr.columns() {
        let cells = column_scalars(require_column(df, &name)?)?;
        columns.push((name, cells));
    }

    let ctx = RowContext::new(&columns);
    let mut type_errors = 0usize;
    let mask: Vec<bool> = (0..df.height())
        .map(|row| match ctx.eval_predicate(expr, row) {
            Ok(truth) => truth == Truth::True,
            Err(_) => {
                type_errors += 1;
                false
            }
        })
        .collect();

    if type_errors > 0 {
        debug!("Filter excluded {} row(s) on type mismatch", type_errors);
    }

    let mask = Series::new("mask", mask);
    Ok(df.filter(mask.bool()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn lab_frame() -> DataFrame {
        df![
            "age" => [25i64, 40, 55],
            "gene_A" => [Some(0.3), Some(0.6), None],
            "dept" => ["a", "b", "a"]
        ]
        .unwrap()
    }

    #[test]
    fn test_null_excluded_under_and() {
        let out = filter(&lab_frame(), "age > 30 and gene_A < 0.5").unwrap();
        assert_eq!(out.height(), 0);
        assert_eq!(out.width(), 3);
    }

    #[test]
    fn test_keeps_matching_rows_in_order() {
        let out = filter(&lab_frame(), "dept == 'a' or gene_A > 0.5").unwrap();
        let ages: Vec<i64> = out.column("age").unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(ages, vec![25, 40, 55]);

        let out = filter(&lab_frame(), "not (dept == 'a')").unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_unknown_column() {
        match filter(&lab_frame(), "weight > 3") {
            Err(EngineError::UnknownColumn(name)) => assert_eq!(name, "weight"),
            other => panic!("unexpected: {:?}", other.map(|df| df.height())),
        }
    }

    #[test]
    fn test_invalid_expression() {
        assert!(matches!(
            filter(&lab_frame(), "age >"),
            Err(EngineError::InvalidExpression(_))
        ));
        assert!(matches!(
            filter(&lab_frame(), "__import__('os').system('ls')"),
            Err(EngineError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_type_mismatch_drops_rows_without_failing() {
        let out = filter(&lab_frame(), "dept > 3").unwrap();
        assert_eq!(out.height(), 0);

        let out = filter(&lab_frame(), "age < 30 or dept > 3").unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_membership_filter() {
        let out = filter(&lab_frame(), "age in [40, 55] and dept != 'b'").unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_column_wise_matches_row_wise() {
        let df = df![
            "age" => [Some(25i64), None, Some(55), Some(31), Some(18)],
            "gene_A" => [Some(0.3), Some(0.6), None, Some(0.1), Some(0.5)],
            "dept" => [Some("a"), Some("b"), Some("a"), None, Some("c")],
            "positive" => [Some(true), Some(false), None, Some(true), Some(false)]
        ]
        .unwrap();
        for expression in [
            "age > 30 and gene_A < 0.5",
            "age < 20 or dept == 'a'",
            "not (gene_A >= 0.5)",
            "dept in ['a', 'c'] and positive",
            "dept not in ['b'] or age >= 55",
            "positive == false or gene_A <= 0.3",
        ] {
            let expr = parse(expression).unwrap();
            assert!(columnar::lower(&expr, &df).is_some(), "{}", expression);
            let column_wise = filter(&df, expression).unwrap();
            let row_wise = filter_row_wise(&df, &expr).unwrap();
            assert!(column_wise.equals_missing(&row_wise), "{}", expression);
        }
    }
}
