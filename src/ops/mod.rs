//! Pluggable image operations
//!
//! This module holds everything the store calls by key:
//! - Array decoding of image files (loader.rs)
//! - File-level conversions applied when building datasets (conversions.rs)
//! - In-memory transforms applied when materializing (transforms.rs)
//! - The class label vocabulary (classes.rs)

pub mod classes;
pub mod conversions;
pub mod loader;
pub mod transforms;

pub use classes::ClassVocabulary;
pub use conversions::{Conversion, ConversionRegistry};
pub use loader::{load_image_array, ImageArray};
pub use transforms::{Transform, TransformRegistry};
