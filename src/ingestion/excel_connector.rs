//! Excel Connector - first worksheet of an xls/xlsx workbook as a typed frame

use crate::error::{EngineError, Result};
use crate::ingestion::schema_inference::{dedupe_headers, RawCell, SchemaInference};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::*;
use std::io::Cursor;
use tracing::debug;

fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Int(i) => RawCell::Int(*i),
        Data::Float(f) => RawCell::Float(*f),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => dt.as_datetime().map_or(RawCell::Empty, RawCell::DateTime),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
    }
}

fn header_name(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Load the first sheet; its first row is the header row
pub fn load_workbook(source_name: &str, bytes: &[u8]) -> Result<DataFrame> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| {
        EngineError::ParseError(format!("Failed to open workbook {}: {}", source_name, e))
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EngineError::ParseError(format!("Workbook {} has no sheets", source_name)))?
        .map_err(|e| {
            EngineError::ParseError(format!("Failed to read first sheet of {}: {}", source_name, e))
        })?;

    let mut rows = range.rows();
    let raw_headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(header_name).collect(),
        None => {
            return Err(EngineError::ParseError(format!(
                "No columns to parse from file {}",
                source_name
            )))
        }
    };

    let headers = dedupe_headers(&raw_headers);
    let mut columns: Vec<Vec<RawCell>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(row.get(idx).map_or(RawCell::Empty, raw_cell));
        }
    }

    let df = SchemaInference::new().build_frame(&headers, &columns)?;
    debug!(
        "Parsed workbook {}: {} rows x {} columns",
        source_name,
        df.height(),
        df.width()
    );
    Ok(df)
}
