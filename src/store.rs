//! Dataset Store
//!
//! Holds uploaded tables for the lifetime of the process. Cloning the store
//! clones the handle; every clone sees the same datasets.

use crate::data_utils::column_names;
use crate::error::{EngineError, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

const ID_LEN: usize = 12;

/// Listing entry for one stored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub file_id: String,
    pub filename: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub datasets: Vec<DatasetMeta>,
    pub active_dataset_id: Option<String>,
}

#[derive(Default)]
struct Inner {
    // Insertion order
    entries: Vec<(DatasetMeta, Arc<DataFrame>)>,
    active: Option<String>,
}

impl Inner {
    fn find(&self, id: &str) -> Option<&(DatasetMeta, Arc<DataFrame>)> {
        self.entries.iter().find(|(meta, _)| meta.file_id == id)
    }
}

/// In-memory dataset registry
#[derive(Clone, Default)]
pub struct DatasetStore {
    inner: Arc<RwLock<Inner>>,
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..ID_LEN].to_string()
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        // A panicked writer cannot leave the entry list half-updated
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a table under a fresh id and make it the active dataset
    pub fn insert(&self, filename: &str, df: DataFrame) -> String {
        let mut inner = self.write();
        let mut id = new_id();
        while inner.find(&id).is_some() {
            id = new_id();
        }
        let meta = DatasetMeta {
            file_id: id.clone(),
            filename: filename.to_string(),
            columns: column_names(&df),
            row_count: df.height(),
        };
        info!(
            "Stored dataset {} ({}, {} rows)",
            id, filename, meta.row_count
        );
        inner.entries.push((meta, Arc::new(df)));
        inner.active = Some(id.clone());
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<DataFrame>> {
        self.read().find(id).map(|(_, df)| Arc::clone(df))
    }

    pub fn meta(&self, id: &str) -> Option<DatasetMeta> {
        self.read().find(id).map(|(meta, _)| meta.clone())
    }

    /// Look up `id`, or the active dataset when no id is given
    pub fn resolve(&self, id: Option<&str>) -> Result<(String, Arc<DataFrame>)> {
        let inner = self.read();
        let id = match id.filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => inner.active.clone().ok_or(EngineError::NoDatasetFound)?,
        };
        inner
            .find(&id)
            .map(|(meta, df)| (meta.file_id.clone(), Arc::clone(df)))
            .ok_or(EngineError::NoDatasetFound)
    }

    pub fn list(&self) -> Listing {
        let inner = self.read();
        Listing {
            datasets: inner.entries.iter().map(|(meta, _)| meta.clone()).collect(),
            active_dataset_id: inner.active.clone(),
        }
    }

    pub fn active_id(&self) -> Option<String> {
        self.read().active.clone()
    }

    /// Drop a dataset; when it was active, the most recent remaining one
    /// becomes active
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.write();
        let before = inner.entries.len();
        inner.entries.retain(|(meta, _)| meta.file_id != id);
        let removed = inner.entries.len() != before;
        if removed && inner.active.as_deref() == Some(id) {
            inner.active = inner.entries.last().map(|(meta, _)| meta.file_id.clone());
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.write();
        inner.entries.clear();
        inner.active = None;
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
