//! Per-dataset process metadata
//!
//! `process.json` records how a dataset's arrays were produced:
//!
//! ```json
//! {"Conversions": ["png", "scale"], "Transforms": ["grayscale"], "Bundled": true}
//! ```
//!
//! Conversions are fixed when the dataset is built. Transforms and the
//! bundling flag are rewritten every time the dataset is materialized.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::write_atomic;
use crate::error::{Result, StoreError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessRecord {
    /// Conversions baked into the dataset's image files, in order
    #[serde(rename = "Conversions")]
    pub conversions: Vec<String>,

    /// Transforms applied to the arrays in `X.npy`, in order
    #[serde(rename = "Transforms")]
    pub transforms: Vec<String>,

    /// Whether `Y.npy` holds 0/1 labels. `None` until labels are built.
    #[serde(rename = "Bundled")]
    pub bundled: Option<bool>,
}

impl ProcessRecord {
    /// Metadata for a freshly built dataset
    pub fn new(conversions: Vec<String>) -> Self {
        Self {
            conversions,
            transforms: Vec::new(),
            bundled: None,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Self::from_json(&raw).map_err(|e| StoreError::json(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(|e| StoreError::json(path, e))?;
        write_atomic(path, json.as_bytes())
    }

    /// Load, change in memory, write back.
    pub fn update(path: &Path, change: impl FnOnce(&mut Self)) -> Result<Self> {
        let mut record = Self::load(path)?;
        change(&mut record);
        record.save(path)?;
        Ok(record)
    }
}
