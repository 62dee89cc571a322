//! Store configuration
//!
//! Settings are read from a JSON file (explicit path, or the per-user
//! config directory), then overridden from the environment, then validated.
//!
//! ```json
//! {
//!   "root": "/srv/imageset",
//!   "pool_size": 8,
//!   "scale_width": 400,
//!   "scale_height": 300,
//!   "default_class": "none",
//!   "classes": { "none": 0, "bar": 1, "line": 2, "pie": 3 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Worker count used by every parallel map unless configured otherwise
pub const DEFAULT_POOL_SIZE: usize = 4;
/// Standard modelling size used by the `scale` conversion and transform
pub const DEFAULT_SCALE_WIDTH: u32 = 400;
pub const DEFAULT_SCALE_HEIGHT: u32 = 300;
/// Class assigned to files imported without a store ledger row
pub const DEFAULT_CLASS: &str = "none";

const ENV_ROOT: &str = "IMAGESET_ROOT";
const ENV_POOL_SIZE: &str = "IMAGESET_POOL_SIZE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `data/` and `tmp/`
    pub root: PathBuf,
    /// Number of workers in each parallel map
    pub pool_size: usize,
    /// Target width of the `scale` operations
    pub scale_width: u32,
    /// Target height of the `scale` operations
    pub scale_height: u32,
    /// Label given to files that don't come from the store
    pub default_class: String,
    /// Label key -> integer id. Id 0 is the "negative" class for bundling.
    pub classes: BTreeMap<String, i64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(DEFAULT_CLASS.to_string(), 0);
        Self {
            root: PathBuf::from("."),
            pool_size: DEFAULT_POOL_SIZE,
            scale_width: DEFAULT_SCALE_WIDTH,
            scale_height: DEFAULT_SCALE_HEIGHT,
            default_class: DEFAULT_CLASS.to_string(),
            classes,
        }
    }
}

impl StoreConfig {
    /// Default config location:
    /// - Linux: ~/.config/imageset/config.json
    /// - macOS: ~/Library/Application Support/imageset/config.json
    /// - Windows: %APPDATA%\imageset\config.json
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("imageset");
            path.push("config.json");
            path
        })
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::json(path, e))
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when a file is there and built-in defaults otherwise. Environment
    /// overrides are applied last and the result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    log::debug!("Using config file {}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `IMAGESET_ROOT` / `IMAGESET_POOL_SIZE` overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var(ENV_ROOT) {
            self.root = PathBuf::from(root);
        }
        if let Ok(raw) = std::env::var(ENV_POOL_SIZE) {
            self.pool_size = raw.trim().parse().map_err(|_| {
                StoreError::config(format!("{ENV_POOL_SIZE} must be a positive integer, got '{raw}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StoreError::config("pool_size must be greater than 0"));
        }
        if self.scale_width == 0 || self.scale_height == 0 {
            return Err(StoreError::config(format!(
                "scale size must be non-zero, got {}x{}",
                self.scale_width, self.scale_height
            )));
        }
        if !self.classes.contains_key(&self.default_class) {
            return Err(StoreError::config(format!(
                "default_class '{}' is not one of the configured classes",
                self.default_class
            )));
        }
        Ok(())
    }

    /// Replace the root directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.pool_size, 4);
        assert_eq!((config.scale_width, config.scale_height), (400, 300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"pool_size": 2, "default_class": "other", "classes": {"other": 0, "bar": 1}}"#,
        )
        .unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.scale_width, DEFAULT_SCALE_WIDTH);
        assert_eq!(config.classes.get("bar"), Some(&1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = StoreConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::default();
        config.default_class = "missing".to_string();
        assert!(matches!(config.validate(), Err(StoreError::Config { .. })));
    }

    #[test]
    fn test_malformed_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StoreConfig::from_file(&path),
            Err(StoreError::Json { .. })
        ));
    }
}
