use crate::error::{EngineError, Result};
use crate::safe_json;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Rendering format for temporal cells leaving the engine
pub const TEMPORAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Primitive type inferred for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    Temporal,
}

impl ColumnType {
    pub fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::Boolean => ColumnType::Boolean,
            dt if dt.is_integer() => ColumnType::Integer,
            dt if dt.is_float() => ColumnType::Float,
            dt if dt.is_temporal() => ColumnType::Temporal,
            _ => ColumnType::String,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
            ColumnType::Temporal => "temporal",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Numeric, or boolean reduced as 0/1
    pub fn is_arithmetic(&self) -> bool {
        self.is_numeric() || *self == ColumnType::Boolean
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value, detached from polars
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Temporal(NaiveDateTime),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Temporal(t) => write!(f, "{}", t.format(TEMPORAL_FORMAT)),
        }
    }
}

pub fn millis_to_datetime(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Fail with `UnknownColumn` unless the frame has the named column
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map_err(|_| EngineError::UnknownColumn(name.to_string()))
}

pub fn column_type(series: &Series) -> ColumnType {
    ColumnType::of(series.dtype())
}

/// Materialize a column into engine scalars
pub fn column_scalars(series: &Series) -> Result<Vec<Scalar>> {
    let cells = match column_type(series) {
        ColumnType::Integer => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Scalar::Null, Scalar::Int))
            .collect(),
        ColumnType::Float => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Scalar::Null, Scalar::Float))
            .collect(),
        ColumnType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Scalar::Null, Scalar::Bool))
            .collect(),
        ColumnType::String => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Scalar::Null, |s| Scalar::Str(s.to_string())))
            .collect(),
        ColumnType::Temporal => series
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| {
                v.and_then(millis_to_datetime)
                    .map_or(Scalar::Null, Scalar::Temporal)
            })
            .collect(),
    };
    Ok(cells)
}

/// Column as floats with NaN folded into null. Temporal columns come out as
/// epoch milliseconds.
pub fn float_values(series: &Series) -> Result<Float64Chunked> {
    let series = if column_type(series) == ColumnType::Temporal {
        series
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
    } else {
        series.clone()
    };
    let cast = series.cast(&DataType::Float64)?;
    let values = cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|f| !f.is_nan()))
        .collect();
    Ok(values)
}

/// Distinct non-missing values with their counts, by descending count.
/// Ties keep first-seen order.
pub fn value_counts(series: &Series) -> Result<Vec<(Scalar, usize)>> {
    const KEY: &str = "value";
    const COUNT: &str = "count";

    let mut keys = series.clone();
    keys.rename(KEY);
    let counted = DataFrame::new(vec![keys])?
        .lazy()
        .filter(col(KEY).is_not_null())
        .group_by_stable([col(KEY)])
        .agg([len().cast(DataType::Int64).alias(COUNT)])
        .collect()?;

    let values = column_scalars(counted.column(KEY)?)?;
    let counts = counted.column(COUNT)?.i64()?;
    let mut entries: Vec<(Scalar, usize)> = values
        .into_iter()
        .zip(counts.into_iter())
        .map(|(value, n)| (value, n.unwrap_or(0) as usize))
        .collect();
    // Stable sort, so equal counts stay in first-seen order
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(entries)
}

/// Build a typed series from scalars that all belong to `column_type`
/// (or are null). Cells of another kind become null.
pub fn scalars_to_series(name: &str, column_type: ColumnType, cells: &[Scalar]) -> Result<Series> {
    let series = match column_type {
        ColumnType::Integer => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Scalar::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnType::Float => {
            let values: Vec<Option<f64>> = cells.iter().map(Scalar::as_f64).collect();
            Series::new(name, values)
        }
        ColumnType::Boolean => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Scalar::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnType::String => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| match c {
                    Scalar::Null => None,
                    other => Some(other.to_string()),
                })
                .collect();
            Series::new(name, values)
        }
        ColumnType::Temporal => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Scalar::Temporal(t) => Some(t.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect();
            Series::new(name, values).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        }
    };
    Ok(series)
}

/// Row-oriented JSON records for the first `limit` rows (all rows when `None`).
/// Every cell passes the numeric safety layer.
pub fn frame_records(df: &DataFrame, limit: Option<usize>) -> Result<Vec<Value>> {
    let height = limit.map_or(df.height(), |l| l.min(df.height()));
    let mut columns = Vec::with_capacity(df.width());
    for series in df.get_columns() {
        let cells = column_scalars(&series.slice(0, height))?;
        columns.push((series.name().to_string(), cells));
    }

    let mut records = Vec::with_capacity(height);
    for row in 0..height {
        let mut record = Map::new();
        for (name, cells) in &columns {
            let cell = cells.get(row).unwrap_or(&Scalar::Null);
            record.insert(name.clone(), safe_json::scalar_to_json(cell));
        }
        records.push(Value::Object(record));
    }
    Ok(records)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}
