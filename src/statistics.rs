//! Descriptive statistics in the usual describe() layout
//!
//! Numeric and temporal columns get count/mean/std/min/quartiles/max, string
//! and boolean columns get count/unique/top/freq. A key that does not apply
//! to a column, or cannot be computed for it, renders as `""`.

use crate::data_utils::{
    column_type, float_values, millis_to_datetime, value_counts, ColumnType, TEMPORAL_FORMAT,
};
use crate::error::Result;
use crate::safe_json::{float_to_json, scalar_to_json};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const NUMERIC_KEYS: &[&str] = &["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
pub const CATEGORICAL_KEYS: &[&str] = &["count", "unique", "top", "freq"];
const KEY_ORDER: &[&str] = &[
    "count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%", "max",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub shape: Shape,
    pub dtypes: Map<String, Value>,
    pub null_counts: Map<String, Value>,
    pub statistics: Map<String, Value>,
}

fn is_numeric_like(column_type: ColumnType) -> bool {
    column_type.is_numeric() || column_type == ColumnType::Temporal
}

pub fn describe(df: &DataFrame) -> Result<Stats> {
    let types: Vec<ColumnType> = df.get_columns().iter().map(column_type).collect();
    let with_numeric = types.iter().any(|t| is_numeric_like(*t));
    let with_categorical = types.iter().any(|t| !is_numeric_like(*t));
    let keys: Vec<&str> = KEY_ORDER
        .iter()
        .copied()
        .filter(|k| {
            (with_numeric && NUMERIC_KEYS.contains(k))
                || (with_categorical && CATEGORICAL_KEYS.contains(k))
        })
        .collect();

    let mut dtypes = Map::new();
    let mut null_counts = Map::new();
    let mut statistics = Map::new();
    for (series, column_type) in df.get_columns().iter().zip(types) {
        let name = series.name().to_string();
        dtypes.insert(name.clone(), Value::String(column_type.name().to_string()));
        null_counts.insert(name.clone(), Value::from(series.null_count()));

        let mut block = match column_type {
            ColumnType::Integer | ColumnType::Float => numeric_block(series)?,
            ColumnType::Temporal => temporal_block(series)?,
            ColumnType::String | ColumnType::Boolean => categorical_block(series)?,
        };
        let mut ordered = Map::with_capacity(keys.len());
        for key in &keys {
            let value = block.remove(*key).unwrap_or_else(blank);
            ordered.insert(key.to_string(), value);
        }
        statistics.insert(name, Value::Object(ordered));
    }

    Ok(Stats {
        shape: Shape {
            rows: df.height(),
            columns: df.width(),
        },
        dtypes,
        null_counts,
        statistics,
    })
}

fn blank() -> Value {
    Value::String(String::new())
}

fn float_summary(values: &Float64Chunked) -> Result<Vec<(&'static str, Option<f64>)>> {
    let count = values.len() - values.null_count();
    Ok(vec![
        ("mean", values.mean()),
        // Sample std is undefined below two observations
        ("std", if count < 2 { None } else { values.std(1) }),
        ("min", values.min()),
        ("25%", values.quantile(0.25, QuantileInterpolOptions::Linear)?),
        ("50%", values.quantile(0.5, QuantileInterpolOptions::Linear)?),
        ("75%", values.quantile(0.75, QuantileInterpolOptions::Linear)?),
        ("max", values.max()),
    ])
}

fn non_null_count(values: &Float64Chunked) -> Value {
    Value::from(values.len() - values.null_count())
}

fn numeric_block(series: &Series) -> Result<HashMap<&'static str, Value>> {
    // NaN cells are treated as missing, like a null
    let values = float_values(series)?;
    let mut block = HashMap::new();
    block.insert("count", non_null_count(&values));
    for (key, stat) in float_summary(&values)? {
        block.insert(key, stat.map_or_else(blank, float_to_json));
    }
    Ok(block)
}

fn temporal_block(series: &Series) -> Result<HashMap<&'static str, Value>> {
    let millis = float_values(series)?;
    let mut block = HashMap::new();
    block.insert("count", non_null_count(&millis));
    for (key, stat) in float_summary(&millis)? {
        if key == "std" {
            continue;
        }
        let rendered = stat
            .and_then(|ms| millis_to_datetime(ms.round() as i64))
            .map_or_else(blank, |t| Value::String(t.format(TEMPORAL_FORMAT).to_string()));
        block.insert(key, rendered);
    }
    Ok(block)
}

fn categorical_block(series: &Series) -> Result<HashMap<&'static str, Value>> {
    let counts = value_counts(series)?;
    let mut block = HashMap::new();
    block.insert("count", Value::from(series.len() - series.null_count()));
    block.insert("unique", Value::from(counts.len()));
    // value_counts breaks ties by first appearance, so the head is the top
    match counts.first() {
        Some((value, freq)) => {
            block.insert("top", scalar_to_json(value));
            block.insert("freq", Value::from(*freq));
        }
        None => {
            block.insert("top", blank());
            block.insert("freq", blank());
        }
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quartiles_interpolate_linearly() {
        let df = df!["x" => [Some(4.0), None, Some(1.0), Some(3.0), Some(2.0)]].unwrap();
        let x = &describe(&df).unwrap().statistics["x"];
        assert_eq!(x["count"], json!(4));
        assert_eq!(x["25%"], json!(1.75));
        assert_eq!(x["50%"], json!(2.5));
        assert_eq!(x["75%"], json!(3.25));
    }

    #[test]
    fn test_numeric_only_frame() {
        let df = df!["x" => [1.0, 2.0, 3.0, 4.0]].unwrap();
        let stats = describe(&df).unwrap();
        assert_eq!(stats.shape, Shape { rows: 4, columns: 1 });
        let x = &stats.statistics["x"];
        let keys: Vec<&String> = x.as_object().unwrap().keys().collect();
        assert_eq!(keys, NUMERIC_KEYS.to_vec());
        assert_eq!(x["count"], json!(4));
        assert_eq!(x["mean"], json!(2.5));
        assert_eq!(x["min"], json!(1.0));
        assert_eq!(x["50%"], json!(2.5));
        assert_eq!(x["max"], json!(4.0));
        let std = x["std"].as_f64().unwrap();
        assert!((std - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn test_mixed_frame_uses_union_of_keys() {
        let df = df![
            "age" => [Some(25i64), Some(40), None],
            "dept" => [Some("a"), Some("b"), Some("a")]
        ]
        .unwrap();
        let stats = describe(&df).unwrap();
        assert_eq!(stats.dtypes["age"], json!("integer"));
        assert_eq!(stats.null_counts["age"], json!(1));

        let age = &stats.statistics["age"];
        assert_eq!(age.as_object().unwrap().len(), KEY_ORDER.len());
        assert_eq!(age["count"], json!(2));
        assert_eq!(age["unique"], json!(""));
        assert_eq!(age["top"], json!(""));

        let dept = &stats.statistics["dept"];
        assert_eq!(dept["count"], json!(3));
        assert_eq!(dept["unique"], json!(2));
        assert_eq!(dept["top"], json!("a"));
        assert_eq!(dept["freq"], json!(2));
        assert_eq!(dept["mean"], json!(""));
    }

    #[test]
    fn test_top_prefers_first_seen_on_ties() {
        let df = df!["k" => ["y", "x", "x", "y"]].unwrap();
        let stats = describe(&df).unwrap();
        assert_eq!(stats.statistics["k"]["top"], json!("y"));
    }

    #[test]
    fn test_single_value_has_blank_std() {
        let df = df!["x" => [7i64]].unwrap();
        let stats = describe(&df).unwrap();
        assert_eq!(stats.statistics["x"]["std"], json!(""));
        assert_eq!(stats.statistics["x"]["mean"], json!(7.0));
    }

    #[test]
    fn test_temporal_block_renders_iso_strings() {
        let day = |d: &str| {
            ::chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp_millis()
        };
        let millis = Series::new("visit", &[Some(day("2024-01-01")), None, Some(day("2024-01-03"))]);
        let visits = millis
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let df = DataFrame::new(vec![visits]).unwrap();
        let stats = describe(&df).unwrap();
        assert_eq!(stats.dtypes["visit"], json!("temporal"));

        let visit = &stats.statistics["visit"];
        assert_eq!(visit["count"], json!(2));
        assert_eq!(visit["mean"], json!("2024-01-02T00:00:00"));
        assert_eq!(visit["std"], json!(""));
        assert_eq!(visit["min"], json!("2024-01-01T00:00:00"));
        assert_eq!(visit["50%"], json!("2024-01-02T00:00:00"));
        assert_eq!(visit["max"], json!("2024-01-03T00:00:00"));
    }

    #[test]
    fn test_boolean_column_is_categorical() {
        let df = df!["flag" => [Some(false), Some(true), Some(true), None]].unwrap();
        let flag = &describe(&df).unwrap().statistics["flag"];
        assert_eq!(flag["count"], json!(3));
        assert_eq!(flag["unique"], json!(2));
        assert_eq!(flag["top"], json!(true));
        assert_eq!(flag["freq"], json!(2));
    }

    #[test]
    fn test_all_missing_column_is_blank() {
        let df = df!["x" => [None::<f64>, None]].unwrap();
        let stats = describe(&df).unwrap();
        assert_eq!(stats.statistics["x"]["count"], json!(0));
        assert_eq!(stats.statistics["x"]["mean"], json!(""));
        assert_eq!(stats.statistics["x"]["max"], json!(""));
    }
}
