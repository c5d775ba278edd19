//! Server configuration, read from the environment (after `.env` is loaded)

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const BIND_VAR: &str = "LAB_COPILOT_BIND";
pub const ALLOWED_ORIGINS_VAR: &str = "ALLOWED_ORIGINS";
pub const MAX_UPLOAD_VAR: &str = "LAB_COPILOT_MAX_UPLOAD_BYTES";
pub const READ_TIMEOUT_VAR: &str = "LAB_COPILOT_READ_TIMEOUT_SECS";
pub const FILTER_LIMIT_VAR: &str = "LAB_COPILOT_FILTER_ROW_LIMIT";
pub const PREVIEW_ROWS_VAR: &str = "LAB_COPILOT_PREVIEW_ROWS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub read_timeout_secs: u64,
    /// Rows returned by a filter request; `row_count` stays the full total
    pub filter_row_limit: usize,
    pub preview_rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 50 * 1024 * 1024,
            read_timeout_secs: 30,
            filter_row_limit: 100,
            preview_rows: 5,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind) = get(BIND_VAR) {
            config.bind = bind.trim().to_string();
        }
        if let Some(origins) = get(ALLOWED_ORIGINS_VAR) {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(v) = get(MAX_UPLOAD_VAR) {
            config.max_upload_bytes = parse_var(MAX_UPLOAD_VAR, &v)?;
        }
        if let Some(v) = get(READ_TIMEOUT_VAR) {
            config.read_timeout_secs = parse_var(READ_TIMEOUT_VAR, &v)?;
        }
        if let Some(v) = get(FILTER_LIMIT_VAR) {
            config.filter_row_limit = parse_var(FILTER_LIMIT_VAR, &v)?;
        }
        if let Some(v) = get(PREVIEW_ROWS_VAR) {
            config.preview_rows = parse_var(PREVIEW_ROWS_VAR, &v)?;
        }
        Ok(config)
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("invalid value for {}: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.filter_row_limit, 100);
        assert!(config.origin_allowed("http://localhost:3000"));
        assert!(!config.origin_allowed("http://evil.example"));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (BIND_VAR, "127.0.0.1:9000"),
            (ALLOWED_ORIGINS_VAR, "http://a.test, http://b.test,"),
            (FILTER_LIMIT_VAR, "10"),
            (PREVIEW_ROWS_VAR, " "),
        ]))
        .unwrap();
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.filter_row_limit, 10);
        assert_eq!(config.preview_rows, 5);
    }

    #[test]
    fn test_invalid_number() {
        let err = ServerConfig::from_lookup(lookup(&[(MAX_UPLOAD_VAR, "lots")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
