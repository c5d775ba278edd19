//! Data Service - request/response layer over the engine and the store
//!
//! Every response type here is what the HTTP layer serializes. Row payloads
//! keep the historical shape: missing cells are rendered as `""`.

use crate::aggregate::aggregate;
use crate::charts::build_chart;
use crate::config::ServerConfig;
use crate::data_utils::{column_names, frame_records};
use crate::error::Result;
use crate::ingestion::load_upload;
use crate::profiler::{profile, ColumnProfile};
use crate::query;
use crate::safe_json::{blank_missing, ensure_finite, sanitize};
use crate::statistics::{describe, Stats};
use crate::store::{DatasetStore, Listing};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFileInfo {
    pub file_id: String,
    pub filename: String,
    pub columns: Vec<String>,
    pub column_info: Vec<ColumnProfile>,
    pub row_count: usize,
    pub preview: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDataResponse {
    pub files: Vec<UploadedFileInfo>,
    pub file_type: String,
    pub total_files: usize,
}

pub type DatasetListing = Listing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    pub conditions: String,
}

fn default_agg_func() -> String {
    "mean".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    pub group_column: String,
    pub value_column: String,
    #[serde(default = "default_agg_func")]
    pub agg_func: String,
}

fn default_plot_type() -> String {
    "bar".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default = "default_plot_type")]
    pub plot_type: String,
    pub x_column: String,
    #[serde(default)]
    pub y_column: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Vec<Value>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub statistics: Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotResponse {
    pub plot_json: String,
    pub plot_type: String,
}

/// Sanitized records with missing cells blanked
fn blank_records(df: &DataFrame, limit: Option<usize>) -> Result<Vec<Value>> {
    Ok(frame_records(df, limit)?
        .into_iter()
        .map(blank_missing)
        .collect())
}

fn data_response(df: &DataFrame, limit: Option<usize>) -> Result<DataResponse> {
    Ok(DataResponse {
        data: blank_records(df, limit)?,
        columns: column_names(df),
        row_count: df.height(),
    })
}

/// Engine operations bound to a dataset store
#[derive(Clone)]
pub struct DataService {
    store: DatasetStore,
    filter_row_limit: usize,
    preview_rows: usize,
}

impl DataService {
    pub fn new(store: DatasetStore, config: &ServerConfig) -> Self {
        Self {
            store,
            filter_row_limit: config.filter_row_limit,
            preview_rows: config.preview_rows,
        }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Parse an uploaded file and store every table it contains. The last
    /// stored table becomes active.
    pub fn upload(&self, bytes: &[u8], filename: &str) -> Result<UploadDataResponse> {
        let upload = load_upload(bytes, filename)?;

        // Profile everything before touching the store so a failure stores nothing
        let mut prepared = Vec::with_capacity(upload.tables.len());
        for (name, df) in upload.tables {
            let column_info = profile(&df)?;
            let preview = blank_records(&df, Some(self.preview_rows))?;
            prepared.push((name, df, column_info, preview));
        }

        let mut files = Vec::with_capacity(prepared.len());
        for (name, df, column_info, preview) in prepared {
            let columns = column_names(&df);
            let row_count = df.height();
            let file_id = self.store.insert(&name, df);
            files.push(UploadedFileInfo {
                file_id,
                filename: name,
                columns,
                column_info,
                row_count,
                preview,
            });
        }

        info!("Upload {} produced {} dataset(s)", filename, files.len());
        Ok(UploadDataResponse {
            total_files: files.len(),
            file_type: upload.file_kind.as_str().to_string(),
            files,
        })
    }

    pub fn list(&self) -> DatasetListing {
        self.store.list()
    }

    pub fn filter(&self, req: &FilterRequest) -> Result<DataResponse> {
        let (_, df) = self.store.resolve(req.file_id.as_deref())?;
        let result = query::filter(&df, &req.conditions)?;
        data_response(&result, Some(self.filter_row_limit))
    }

    pub fn aggregate(&self, req: &AggregateRequest) -> Result<DataResponse> {
        let (_, df) = self.store.resolve(req.file_id.as_deref())?;
        let result = aggregate(&df, &req.group_column, &req.value_column, &req.agg_func)?;
        data_response(&result, None)
    }

    pub fn describe(&self, file_id: Option<&str>) -> Result<StatsResponse> {
        let (_, df) = self.store.resolve(file_id)?;
        Ok(StatsResponse {
            statistics: describe(&df)?,
        })
    }

    pub fn plot(&self, req: &PlotRequest) -> Result<PlotResponse> {
        let (_, df) = self.store.resolve(req.file_id.as_deref())?;
        let figure = sanitize(build_chart(
            &df,
            &req.plot_type,
            &req.x_column,
            req.y_column.as_deref(),
            req.title.as_deref(),
        )?);
        ensure_finite(&figure)?;
        Ok(PlotResponse {
            plot_json: serde_json::to_string(&figure)?,
            plot_type: req.plot_type.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;

    fn service() -> DataService {
        DataService::new(DatasetStore::new(), &ServerConfig::default())
    }

    const CSV: &[u8] = b"age,gene_A,dept\n25,0.3,a\n40,0.6,b\n55,,a\n";

    #[test]
    fn test_upload_profiles_and_previews() {
        let svc = service();
        let resp = svc.upload(CSV, "lab.csv").unwrap();
        assert_eq!(resp.file_type, "csv");
        assert_eq!(resp.total_files, 1);

        let file = &resp.files[0];
        assert_eq!(file.columns, vec!["age", "gene_A", "dept"]);
        assert_eq!(file.row_count, 3);
        assert_eq!(file.column_info[1].dtype, "float");
        assert_eq!(file.preview[2]["gene_A"], json!(""));
        assert_eq!(svc.list().active_dataset_id.as_deref(), Some(file.file_id.as_str()));
    }

    #[test]
    fn test_requests_without_dataset() {
        let svc = service();
        let req = FilterRequest {
            file_id: None,
            conditions: "age > 1".to_string(),
        };
        assert!(matches!(svc.filter(&req), Err(EngineError::NoDatasetFound)));
        assert!(matches!(svc.describe(None), Err(EngineError::NoDatasetFound)));
    }

    #[test]
    fn test_filter_caps_rows_but_reports_total() {
        let store = DatasetStore::new();
        let config = ServerConfig {
            filter_row_limit: 2,
            ..ServerConfig::default()
        };
        let svc = DataService::new(store, &config);
        svc.upload(CSV, "lab.csv").unwrap();

        let resp = svc
            .filter(&FilterRequest {
                file_id: None,
                conditions: "age >= 25".to_string(),
            })
            .unwrap();
        assert_eq!(resp.row_count, 3);
        assert_eq!(resp.data.len(), 2);
        assert_eq!(resp.columns, vec!["age", "gene_A", "dept"]);
    }

    #[test]
    fn test_aggregate_and_plot() {
        let svc = service();
        svc.upload(CSV, "lab.csv").unwrap();

        let agg: AggregateRequest = serde_json::from_value(json!({
            "group_column": "dept",
            "value_column": "age"
        }))
        .unwrap();
        assert_eq!(agg.agg_func, "mean");
        let resp = svc.aggregate(&agg).unwrap();
        assert_eq!(resp.columns, vec!["dept", "age_mean"]);
        assert_eq!(resp.data[0], json!({"dept": "a", "age_mean": 40.0}));

        let plot: PlotRequest = serde_json::from_value(json!({"x_column": "dept"})).unwrap();
        let resp = svc.plot(&plot).unwrap();
        assert_eq!(resp.plot_type, "bar");
        let figure: Value = serde_json::from_str(&resp.plot_json).unwrap();
        assert_eq!(figure["data"][0]["y"], json!([2, 1]));
    }

    #[test]
    fn test_describe_selected_dataset() {
        let svc = service();
        let first = svc.upload(CSV, "lab.csv").unwrap().files[0].file_id.clone();
        svc.upload(b"x\n1\n", "other.csv").unwrap();

        let resp = svc.describe(Some(&first)).unwrap();
        assert_eq!(resp.statistics.shape.rows, 3);
        assert_eq!(resp.statistics.statistics["age"]["count"], json!(3));
    }
}
