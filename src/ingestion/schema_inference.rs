//! Schema Inference - per-column type sniffing for raw uploaded cells
//!
//! Candidate order is integer, float, boolean, temporal, string. The first
//! candidate that accepts every non-missing cell of a column wins; a column
//! with no non-missing cells is float (all null).

use crate::data_utils::{scalars_to_series, ColumnType, Scalar};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// Text cells treated as missing values
pub const NA_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A cell as read from the source file, before typing
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawCell {
    fn is_missing(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => NA_MARKERS.contains(&s.trim()),
            _ => false,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            RawCell::Int(i) => Some(*i),
            // Spreadsheets store whole numbers as floats
            RawCell::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some(*f as i64)
            }
            RawCell::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            RawCell::Int(i) => Some(*i as f64),
            RawCell::Float(f) => Some(*f),
            RawCell::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            RawCell::Bool(b) => Some(*b),
            RawCell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            RawCell::DateTime(dt) => Some(*dt),
            RawCell::Text(s) => parse_datetime(s.trim()),
            _ => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.clone(),
            RawCell::Int(i) => i.to_string(),
            RawCell::Float(f) => f.to_string(),
            RawCell::Bool(true) => "True".to_string(),
            RawCell::Bool(false) => "False".to_string(),
            RawCell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Parse the timestamp shapes accepted for temporal columns and literals
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Schema Inference Engine
pub struct SchemaInference {
    candidates: Vec<ColumnType>,
}

impl SchemaInference {
    pub fn new() -> Self {
        Self {
            candidates: vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::Temporal,
            ],
        }
    }

    /// Pick the column type for a run of raw cells
    pub fn infer_column(&self, cells: &[RawCell]) -> ColumnType {
        let present: Vec<&RawCell> = cells.iter().filter(|c| !c.is_missing()).collect();
        if present.is_empty() {
            return ColumnType::Float;
        }

        self.candidates
            .iter()
            .copied()
            .find(|candidate| present.iter().all(|cell| Self::accepts(*candidate, cell)))
            .unwrap_or(ColumnType::String)
    }

    fn accepts(candidate: ColumnType, cell: &RawCell) -> bool {
        match candidate {
            ColumnType::Integer => cell.as_int().is_some(),
            ColumnType::Float => cell.as_float().is_some(),
            ColumnType::Boolean => cell.as_bool().is_some(),
            ColumnType::Temporal => cell.as_datetime().is_some(),
            ColumnType::String => true,
        }
    }

    fn convert(column_type: ColumnType, cell: &RawCell) -> Scalar {
        if cell.is_missing() {
            return Scalar::Null;
        }
        let converted = match column_type {
            ColumnType::Integer => cell.as_int().map(Scalar::Int),
            ColumnType::Float => cell.as_float().map(Scalar::Float),
            ColumnType::Boolean => cell.as_bool().map(Scalar::Bool),
            ColumnType::Temporal => cell.as_datetime().map(Scalar::Temporal),
            ColumnType::String => Some(Scalar::Str(cell.as_text())),
        };
        converted.unwrap_or(Scalar::Null)
    }

    /// Infer the column type and build the typed series
    pub fn build_series(&self, name: &str, cells: &[RawCell]) -> Result<Series> {
        let column_type = self.infer_column(cells);
        let scalars: Vec<Scalar> = cells
            .iter()
            .map(|cell| Self::convert(column_type, cell))
            .collect();
        scalars_to_series(name, column_type, &scalars)
    }

    /// Assemble a frame from column-major raw cells
    pub fn build_frame(&self, headers: &[String], columns: &[Vec<RawCell>]) -> Result<DataFrame> {
        let mut series = Vec::with_capacity(headers.len());
        for (name, cells) in headers.iter().zip(columns) {
            series.push(self.build_series(name, cells)?);
        }
        Ok(DataFrame::new(series)?)
    }
}

impl Default for SchemaInference {
    fn default() -> Self {
        Self::new()
    }
}

/// Make header names unique: blank headers become `Unnamed: <idx>`, repeats
/// get a `.<n>` suffix.
pub fn dedupe_headers(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (idx, header) in raw.iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            header.trim().to_string()
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(cells: &[&str]) -> Vec<RawCell> {
        cells.iter().map(|c| RawCell::Text(c.to_string())).collect()
    }

    #[test]
    fn test_integer_wins_over_float() {
        let inference = SchemaInference::new();
        assert_eq!(inference.infer_column(&text(&["1", "2", ""])), ColumnType::Integer);
        assert_eq!(inference.infer_column(&text(&["1", "2.5"])), ColumnType::Float);
    }

    #[test]
    fn test_boolean_and_temporal_detection() {
        let inference = SchemaInference::new();
        assert_eq!(inference.infer_column(&text(&["true", "FALSE", "NA"])), ColumnType::Boolean);
        assert_eq!(
            inference.infer_column(&text(&["2024-01-05", "2024-02-01 10:00:00"])),
            ColumnType::Temporal
        );
    }

    #[test]
    fn test_mixed_cells_fall_back_to_string() {
        let inference = SchemaInference::new();
        assert_eq!(inference.infer_column(&text(&["1", "abc"])), ColumnType::String);
        assert_eq!(inference.infer_column(&text(&["true", "1"])), ColumnType::String);
    }

    #[test]
    fn test_all_missing_column_is_float() {
        let inference = SchemaInference::new();
        let series = inference.build_series("empty", &text(&["", "NA", "null"])).unwrap();
        assert_eq!(series.dtype(), &DataType::Float64);
        assert_eq!(series.null_count(), 3);
    }

    #[test]
    fn test_spreadsheet_whole_floats_are_integers() {
        let inference = SchemaInference::new();
        let cells = vec![RawCell::Float(3.0), RawCell::Int(4), RawCell::Empty];
        assert_eq!(inference.infer_column(&cells), ColumnType::Integer);
    }

    #[test]
    fn test_dedupe_headers() {
        let raw: Vec<String> = vec!["a".into(), "".into(), "a".into(), "a".into()];
        assert_eq!(dedupe_headers(&raw), vec!["a", "Unnamed: 1", "a.1", "a.2"]);
    }
}
