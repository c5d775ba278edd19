//! Ingestion Module - uploaded bytes into typed in-memory tables
//!
//! - CSV via the csv crate plus explicit per-column type sniffing
//! - xls/xlsx via calamine (first sheet, header row)
//! - ZIP archives holding any number of the above

pub mod archive;
pub mod csv_connector;
pub mod excel_connector;
pub mod schema_inference;

pub use archive::load_archive;
pub use csv_connector::CsvConnector;
pub use excel_connector::load_workbook;
pub use schema_inference::{RawCell, SchemaInference};

use crate::error::{EngineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Extensions loadable as a single table
pub const TABLE_EXTENSIONS: &[&str] = &["csv", "xls", "xlsx"];

/// Lowercase extension after the last dot, empty when there is none
pub fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Upload kind, decided by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Xls,
    Xlsx,
    Zip,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Result<Self> {
        match extension(filename).as_str() {
            "csv" => Ok(FileKind::Csv),
            "xls" => Ok(FileKind::Xls),
            "xlsx" => Ok(FileKind::Xlsx),
            "zip" => Ok(FileKind::Zip),
            other => Err(EngineError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Xls => "xls",
            FileKind::Xlsx => "xlsx",
            FileKind::Zip => "zip",
        }
    }
}

/// Parse a single CSV or Excel file
pub fn load_table(bytes: &[u8], filename: &str) -> Result<DataFrame> {
    match FileKind::from_filename(filename)? {
        FileKind::Csv => CsvConnector::new(filename, bytes).load(),
        FileKind::Xls | FileKind::Xlsx => load_workbook(filename, bytes),
        FileKind::Zip => Err(EngineError::UnsupportedFormat("zip".to_string())),
    }
}

/// Everything parsed out of one uploaded file
#[derive(Debug)]
pub struct Upload {
    pub file_kind: FileKind,
    pub tables: Vec<(String, DataFrame)>,
}

/// Dispatch an upload: archives fan out into many tables, plain files load as one
pub fn load_upload(bytes: &[u8], filename: &str) -> Result<Upload> {
    if filename.trim().is_empty() {
        return Err(EngineError::ParseError("No filename provided.".to_string()));
    }

    let file_kind = FileKind::from_filename(filename)?;
    let tables = match file_kind {
        FileKind::Zip => load_archive(bytes)?,
        _ => vec![(filename.to_string(), load_table(bytes, filename)?)],
    };

    info!(
        "Loaded {} table(s) from {} ({})",
        tables.len(),
        filename,
        file_kind.as_str()
    );
    Ok(Upload { file_kind, tables })
}
