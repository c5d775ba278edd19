use crate::data_utils::{column_type, require_column, ColumnType};
use crate::error::{EngineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Supported group reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Mean,
    Sum,
    Count,
    Min,
    Max,
    Median,
    Std,
}

impl AggFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Mean => "mean",
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
            AggFunc::Std => "std",
        }
    }

    /// Reductions that only make sense over numbers
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            AggFunc::Mean | AggFunc::Sum | AggFunc::Median | AggFunc::Std
        )
    }

    fn expr(&self, value: Expr) -> Expr {
        match self {
            AggFunc::Mean => value.mean(),
            AggFunc::Sum => value.sum(),
            // Non-null count; the index type is widened so output is i64
            AggFunc::Count => value.count().cast(DataType::Int64),
            AggFunc::Min => value.min(),
            AggFunc::Max => value.max(),
            AggFunc::Median => value.median(),
            AggFunc::Std => value.std(1),
        }
    }
}

impl FromStr for AggFunc {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(AggFunc::Mean),
            "sum" => Ok(AggFunc::Sum),
            "count" => Ok(AggFunc::Count),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "median" => Ok(AggFunc::Median),
            "std" => Ok(AggFunc::Std),
            _ => Err(EngineError::UnsupportedAggregation(s.to_string())),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the reduced column: `<value_column>_<func>`
pub fn output_column(value_column: &str, func: AggFunc) -> String {
    format!("{}_{}", value_column, func.as_str())
}

/// Group by `group_column` and reduce `value_column`. Groups come out in
/// first-seen order; missing keys form their own group.
pub fn aggregate(
    df: &DataFrame,
    group_column: &str,
    value_column: &str,
    agg_func: &str,
) -> Result<DataFrame> {
    let func: AggFunc = agg_func.parse()?;
    require_column(df, group_column)?;
    let value = require_column(df, value_column)?;

    let value_type = column_type(value);
    if func.requires_numeric() && !value_type.is_arithmetic() {
        return Err(EngineError::InvalidColumnType(format!(
            "cannot compute {} of {} column '{}'",
            func, value_type, value_column
        )));
    }

    let alias = output_column(value_column, func);
    debug!(
        "Aggregating {} by {} with {}",
        value_column, group_column, func
    );

    // Booleans reduce as 0/1: sums stay integral, the rest are floats
    let mut value = col(value_column);
    if value_type == ColumnType::Boolean && func.requires_numeric() {
        let target = match func {
            AggFunc::Sum => DataType::Int64,
            _ => DataType::Float64,
        };
        value = value.cast(target);
    }

    let result = df
        .clone()
        .lazy()
        .group_by_stable([col(group_column)])
        .agg([func.expr(value).alias(&alias)])
        .collect()?;

    Ok(result)
}
