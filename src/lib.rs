//! Lab Co-Pilot data engine
//!
//! Loads uploaded CSV, Excel and ZIP files into polars tables, and answers
//! profiling, filtering, aggregation, statistics and chart requests with
//! JSON that never contains NaN or infinities.

pub mod aggregate;
pub mod charts;
pub mod config;
pub mod data_utils;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod profiler;
pub mod query;
pub mod safe_json;
pub mod service;
pub mod statistics;
pub mod store;

pub use aggregate::{aggregate, AggFunc};
pub use charts::{build_chart, PlotKind};
pub use config::ServerConfig;
pub use error::{EngineError, Result};
pub use ingestion::{load_table, load_upload};
pub use profiler::{profile, ColumnProfile};
pub use query::filter;
pub use service::DataService;
pub use statistics::{describe, Stats};
pub use store::DatasetStore;
