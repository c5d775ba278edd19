use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unsupported file format: .{0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse file: {0}")]
    ParseError(String),

    #[error("The uploaded file is not a valid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("No CSV or Excel files found inside the ZIP archive.")]
    EmptyArchive,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Unsupported aggregation: {0}. Use one of mean, sum, count, min, max, median, std")]
    UnsupportedAggregation(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Unsupported plot type: {0}. Use one of: bar, pie, scatter, line, histogram, box.")]
    UnsupportedChartType(String),

    #[error("No dataset found. Upload a file first.")]
    NoDatasetFound,

    #[error("Invalid column type: {0}")]
    InvalidColumnType(String),

    #[error("Output contains a non-finite number at {0}")]
    NonFiniteOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for EngineError {
    fn from(err: polars::error::PolarsError) -> Self {
        EngineError::Polars(err.to_string())
    }
}

impl EngineError {
    /// HTTP status used when this error crosses the request boundary
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::NoDatasetFound => 404,
            EngineError::NonFiniteOutput(_)
            | EngineError::Config(_)
            | EngineError::Polars(_)
            | EngineError::Json(_)
            | EngineError::Io(_) => 500,
            _ => 400,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
