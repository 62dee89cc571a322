//! Error types for the image store
//!
//! Every fallible operation in the crate returns [`Result`]. Filesystem,
//! table, JSON and image errors carry the path they happened at so a failed
//! per-image job can be traced back to the file that caused it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed ledger at {path}: {message}")]
    LedgerFormat { path: PathBuf, message: String },

    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unknown {kind} '{key}'")]
    UnknownOperation { kind: &'static str, key: String },

    #[error("unknown class label '{key}'")]
    UnknownClass { key: String },

    #[error("image {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("array of shape {shape:?} is not an image layout")]
    UnsupportedLayout { shape: Vec<usize> },

    #[error("store not initialized: {path} is missing")]
    NotInitialized { path: PathBuf },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// Convenience constructors
impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn ledger(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LedgerFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    pub fn unknown_conversion(key: impl Into<String>) -> Self {
        Self::UnknownOperation {
            kind: "conversion",
            key: key.into(),
        }
    }

    pub fn unknown_transform(key: impl Into<String>) -> Self {
        Self::UnknownOperation {
            kind: "transform",
            key: key.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True when the error is a missing file or directory, wherever it
    /// surfaced (plain io, the CSV reader, or the image decoder).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Self::Csv { source, .. } => match source.kind() {
                csv::ErrorKind::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
                _ => false,
            },
            Self::Image { source, .. } => match source {
                image::ImageError::IoError(err) => err.kind() == std::io::ErrorKind::NotFound,
                _ => false,
            },
            _ => false,
        }
    }
}
