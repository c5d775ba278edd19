//! CSV Connector - parses raw CSV bytes into a typed frame

use crate::error::{EngineError, Result};
use crate::ingestion::schema_inference::{dedupe_headers, RawCell, SchemaInference};
use csv::ReaderBuilder;
use polars::prelude::*;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV Connector - header row gives the column names, every other row is data
pub struct CsvConnector<'a> {
    source_name: &'a str,
    bytes: &'a [u8],
    delimiter: u8,
}

impl<'a> CsvConnector<'a> {
    pub fn new(source_name: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            source_name,
            bytes: bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read header + records into column-major raw cells
    fn read_columns(&self) -> Result<(Vec<String>, Vec<Vec<RawCell>>)> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(self.bytes);

        let raw_headers: Vec<String> = rdr
            .headers()
            .map_err(|e| EngineError::ParseError(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if raw_headers.is_empty() || raw_headers.iter().all(|h| h.trim().is_empty()) {
            return Err(EngineError::ParseError(format!(
                "No columns to parse from file {}",
                self.source_name
            )));
        }

        let headers = dedupe_headers(&raw_headers);
        let width = headers.len();
        let mut columns: Vec<Vec<RawCell>> = vec![Vec::new(); width];

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| {
                EngineError::ParseError(format!("Failed to read CSV record {}: {}", line + 1, e))
            })?;
            if record.len() > width {
                return Err(EngineError::ParseError(format!(
                    "Expected {} fields in line {}, saw {}",
                    width,
                    line + 2,
                    record.len()
                )));
            }
            // Short rows are padded with empty cells
            for (idx, column) in columns.iter_mut().enumerate() {
                let cell = match record.get(idx) {
                    Some(field) => RawCell::Text(field.to_string()),
                    None => RawCell::Empty,
                };
                column.push(cell);
            }
        }

        Ok((headers, columns))
    }

    pub fn load(&self) -> Result<DataFrame> {
        let (headers, columns) = self.read_columns()?;
        let df = SchemaInference::new().build_frame(&headers, &columns)?;
        debug!(
            "Parsed CSV {}: {} rows x {} columns",
            self.source_name,
            df.height(),
            df.width()
        );
        Ok(df)
    }
}
