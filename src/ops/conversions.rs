//! File-level conversions
//!
//! A conversion rewrites an image file on disk and returns the path of the
//! result, which may differ from its input (format changes rename the file).
//! Conversions are baked into the stored files, so each one runs at most once
//! per file in a given store or dataset.

use image::{imageops::FilterType, ImageFormat};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// A named file operation: `apply(path) -> new_path`.
pub trait Conversion: Send + Sync {
    fn apply(&self, path: &Path) -> Result<PathBuf>;
}

impl<F> Conversion for F
where
    F: Fn(&Path) -> Result<PathBuf> + Send + Sync,
{
    fn apply(&self, path: &Path) -> Result<PathBuf> {
        self(path)
    }
}

/// Re-encode as PNG next to the source, then remove the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertToPng;

impl Conversion for ConvertToPng {
    fn apply(&self, path: &Path) -> Result<PathBuf> {
        let new_path = path.with_extension("png");

        let img = image::open(path).map_err(|e| StoreError::image(path, e))?;
        img.save_with_format(&new_path, ImageFormat::Png)
            .map_err(|e| StoreError::image(&new_path, e))?;
        drop(img);

        // A file that was already .png has just been rewritten in place
        if new_path != path {
            fs::remove_file(path).map_err(|e| StoreError::io(path, e))?;
        }

        log::debug!("🖼️  Converted {} to PNG", path.display());
        Ok(new_path)
    }
}

/// Single-channel grayscale, in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeGrayscale;

impl Conversion for MakeGrayscale {
    fn apply(&self, path: &Path) -> Result<PathBuf> {
        let img = image::open(path).map_err(|e| StoreError::image(path, e))?;
        let gray = img.to_luma8();
        gray.save(path).map_err(|e| StoreError::image(path, e))?;
        Ok(path.to_path_buf())
    }
}

/// Resize to exactly `width` x `height`, in place.
#[derive(Debug, Clone, Copy)]
pub struct ScaleImage {
    pub width: u32,
    pub height: u32,
}

impl Conversion for ScaleImage {
    fn apply(&self, path: &Path) -> Result<PathBuf> {
        let img = image::open(path).map_err(|e| StoreError::image(path, e))?;
        let scaled = img.resize_exact(self.width, self.height, FilterType::Lanczos3);
        scaled.save(path).map_err(|e| StoreError::image(path, e))?;
        Ok(path.to_path_buf())
    }
}

/// Conversions by key. Keys are kept sorted, which also fixes the order of
/// the flag columns in a new store ledger.
#[derive(Clone, Default)]
pub struct ConversionRegistry {
    entries: BTreeMap<String, Arc<dyn Conversion>>,
}

impl ConversionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in conversions: `grayscale`, `png`, `scale`.
    pub fn with_defaults(scale_width: u32, scale_height: u32) -> Self {
        let mut registry = Self::new();
        registry.register("png", ConvertToPng);
        registry.register("grayscale", MakeGrayscale);
        registry.register(
            "scale",
            ScaleImage {
                width: scale_width,
                height: scale_height,
            },
        );
        registry
    }

    /// Add or replace a conversion.
    pub fn register(&mut self, key: impl Into<String>, conversion: impl Conversion + 'static) {
        self.entries.insert(key.into(), Arc::new(conversion));
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Conversion>> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::unknown_conversion(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Fail on the first key that isn't registered.
    pub fn validate<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        for key in keys {
            self.get(key.as_ref())?;
        }
        Ok(())
    }

    /// Apply `keys` in order, feeding each output path into the next one.
    pub fn apply_chain<S: AsRef<str>>(&self, path: &Path, keys: &[S]) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        for key in keys {
            current = self.get(key.as_ref())?.apply(&current)?;
        }
        Ok(current)
    }
}

impl std::fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
