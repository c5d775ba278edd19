use crate::data_utils::{column_type, float_values};
use crate::error::Result;
use crate::safe_json::{any_value_to_json, safe_float};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SAMPLE_SIZE: usize = 3;

/// Per-column metadata shown next to an uploaded table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
    pub unique_count: usize,
    pub sample_values: Vec<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Profile every column, in column order
pub fn profile(df: &DataFrame) -> Result<Vec<ColumnProfile>> {
    df.get_columns().iter().map(profile_column).collect()
}

pub fn profile_column(series: &Series) -> Result<ColumnProfile> {
    let column_type = column_type(series);
    let mut sample_values = Vec::with_capacity(SAMPLE_SIZE);
    for idx in 0..series.len().min(SAMPLE_SIZE) {
        sample_values.push(any_value_to_json(&series.get(idx)?));
    }

    let mut profile = ColumnProfile {
        name: series.name().to_string(),
        dtype: column_type.name().to_string(),
        null_count: series.null_count(),
        unique_count: series.drop_nulls().n_unique()?,
        sample_values,
        min: None,
        max: None,
        mean: None,
    };

    // Booleans count as 0/1. All three stay None together for an
    // all-missing column
    if column_type.is_arithmetic() {
        let values = float_values(series)?;
        profile.min = values.min().and_then(safe_float);
        profile.max = values.max().and_then(safe_float);
        profile.mean = values.mean().and_then(safe_float);
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_numeric_and_text_columns() {
        let df = df![
            "age" => [Some(25i64), Some(40), Some(55), None],
            "dept" => [Some("a"), Some("a"), Some("b"), None]
        ]
        .unwrap();
        let profiles = profile(&df).unwrap();
        assert_eq!(profiles.len(), 2);

        let age = &profiles[0];
        assert_eq!(age.name, "age");
        assert_eq!(age.dtype, "integer");
        assert_eq!(age.null_count, 1);
        assert_eq!(age.unique_count, 3);
        assert_eq!(age.sample_values, vec![json!(25), json!(40), json!(55)]);
        assert_eq!(age.min, Some(25.0));
        assert_eq!(age.max, Some(55.0));
        assert_eq!(age.mean, Some(40.0));

        let dept = &profiles[1];
        assert_eq!(dept.dtype, "string");
        assert_eq!(dept.unique_count, 2);
        assert_eq!(dept.min, None);
        assert_eq!(dept.mean, None);
    }

    #[test]
    fn test_boolean_column_profiles_as_zero_one() {
        let df = df!["flag" => [Some(true), Some(false), Some(true), None]].unwrap();
        let p = &profile(&df).unwrap()[0];
        assert_eq!(p.dtype, "boolean");
        assert_eq!(p.unique_count, 2);
        assert_eq!(p.min, Some(0.0));
        assert_eq!(p.max, Some(1.0));
        let mean = p.mean.unwrap();
        assert!((mean - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(p.sample_values, vec![json!(true), json!(false), json!(true)]);
    }

    #[test]
    fn test_all_missing_numeric_column() {
        let df = df!["x" => [None::<f64>, None]].unwrap();
        let p = &profile(&df).unwrap()[0];
        assert_eq!(p.null_count, 2);
        assert_eq!(p.unique_count, 0);
        assert_eq!((p.min, p.max, p.mean), (None, None, None));
        assert_eq!(p.sample_values, vec![Value::Null, Value::Null]);
    }

    #[test]
    fn test_infinite_values_are_sanitized() {
        let df = df!["x" => [1.0, f64::INFINITY]].unwrap();
        let p = &profile(&df).unwrap()[0];
        assert_eq!(p.min, Some(1.0));
        assert_eq!(p.max, None);
        assert_eq!(p.mean, None);
        assert_eq!(p.sample_values, vec![json!(1.0), Value::Null]);
    }
}
