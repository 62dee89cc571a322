//! State management module
//!
//! This module handles everything persisted on disk:
//! - The store handle and its directory tree (store.rs)
//! - Ledger tables for the store and for datasets (ledger.rs)
//! - Per-dataset process metadata (process.rs)

pub mod ledger;
pub mod process;
pub mod store;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Ledger file name, both for the store (`data/log.csv`) and for datasets
pub const LEDGER_FILE: &str = "log.csv";
/// Per-dataset metadata file
pub const PROCESS_FILE: &str = "process.json";
/// Image directory name, both in the store and in datasets
pub const IMAGES_DIR: &str = "images";
/// Materialized feature array
pub const FEATURES_FILE: &str = "X.npy";
/// Materialized label array
pub const LABELS_FILE: &str = "Y.npy";

/// Sibling path used while a file is being rewritten.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write to a temp file next to `path`, then rename over it, so readers
/// never see a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
