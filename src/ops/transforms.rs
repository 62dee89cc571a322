//! In-memory transforms
//!
//! Transforms run at materialization time on already-decoded arrays and are
//! never written back to the image files. Each one maps one image array to
//! one image array.

use image::imageops::{self, FilterType};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::loader::{array_to_image, image_to_array, ImageArray};
use crate::error::{Result, StoreError};

/// A named array operation: `apply(array) -> array`.
pub trait Transform: Send + Sync {
    fn apply(&self, image: ImageArray) -> Result<ImageArray>;
}

impl<F> Transform for F
where
    F: Fn(ImageArray) -> Result<ImageArray> + Send + Sync,
{
    fn apply(&self, image: ImageArray) -> Result<ImageArray> {
        self(image)
    }
}

/// Collapse to a single channel; output shape is `[height, width]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl Transform for Grayscale {
    fn apply(&self, image: ImageArray) -> Result<ImageArray> {
        if image.ndim() == 2 {
            return Ok(image);
        }
        let img = array_to_image(&image)?;
        image_to_array(DynamicImage::ImageLuma8(img.to_luma8()))
    }
}

/// Resize to exactly `width` x `height`, keeping the channel count.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub width: u32,
    pub height: u32,
}

impl Transform for Scale {
    fn apply(&self, image: ImageArray) -> Result<ImageArray> {
        let img = array_to_image(&image)?;
        image_to_array(img.resize_exact(self.width, self.height, FilterType::Lanczos3))
    }
}

/// Mirror left to right.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlipHorizontal;

impl Transform for FlipHorizontal {
    fn apply(&self, image: ImageArray) -> Result<ImageArray> {
        let img = array_to_image(&image)?;
        let flipped = match img {
            DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(imageops::flip_horizontal(&buf)),
            DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(imageops::flip_horizontal(&buf)),
            DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(imageops::flip_horizontal(&buf)),
            other => DynamicImage::ImageRgba8(imageops::flip_horizontal(&other.to_rgba8())),
        };
        image_to_array(flipped)
    }
}

#[derive(Clone, Default)]
pub struct TransformRegistry {
    entries: BTreeMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in transforms: `flip_horizontal`, `grayscale`, `scale`.
    pub fn with_defaults(scale_width: u32, scale_height: u32) -> Self {
        let mut registry = Self::new();
        registry.register("grayscale", Grayscale);
        registry.register(
            "scale",
            Scale {
                width: scale_width,
                height: scale_height,
            },
        );
        registry.register("flip_horizontal", FlipHorizontal);
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, transform: impl Transform + 'static) {
        self.entries.insert(key.into(), Arc::new(transform));
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Transform>> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::unknown_transform(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn validate<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        for key in keys {
            self.get(key.as_ref())?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
