//! Image decoding into arrays
//!
//! Images are held in memory as `ArrayD<u8>` in row-major order:
//! `[height, width]` for single-channel images, `[height, width, channels]`
//! for gray+alpha, RGB and RGBA. Higher bit depths are narrowed to 8 bits.

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{ArrayD, IxDyn};
use std::path::Path;

use crate::error::{Result, StoreError};

/// Decoded pixel data for one image
pub type ImageArray = ArrayD<u8>;

/// Decode an image file into an array.
///
/// The decoder and its file handle are dropped before this returns, so no
/// descriptor stays open while the array is in use.
pub fn load_image_array(path: &Path) -> Result<ImageArray> {
    let img = image::open(path).map_err(|e| StoreError::image(path, e))?;
    image_to_array(img)
}

/// Convert a decoded image into an array, keeping its channel count.
pub fn image_to_array(img: DynamicImage) -> Result<ImageArray> {
    let (width, height) = (img.width() as usize, img.height() as usize);

    let (channels, raw) = match img {
        DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (2, buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => (3, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (4, buf.into_raw()),
        // 16-bit and float images are narrowed to their 8-bit equivalent
        DynamicImage::ImageLuma16(_) => (1, img.to_luma8().into_raw()),
        DynamicImage::ImageLumaA16(_) => (2, img.to_luma_alpha8().into_raw()),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => (3, img.to_rgb8().into_raw()),
        _ => (4, img.to_rgba8().into_raw()),
    };

    let shape = if channels == 1 {
        vec![height, width]
    } else {
        vec![height, width, channels]
    };

    ArrayD::from_shape_vec(IxDyn(&shape), raw)
        .map_err(|_| StoreError::UnsupportedLayout { shape })
}

/// Convert an array back into an image for pixel-level operations.
pub fn array_to_image(array: &ImageArray) -> Result<DynamicImage> {
    let shape = array.shape().to_vec();
    let unsupported = || StoreError::UnsupportedLayout {
        shape: shape.clone(),
    };

    let (height, width, channels) = match shape.as_slice() {
        [h, w] => (*h, *w, 1),
        [h, w, c] => (*h, *w, *c),
        _ => return Err(unsupported()),
    };
    let width = u32::try_from(width).map_err(|_| unsupported())?;
    let height = u32::try_from(height).map_err(|_| unsupported())?;

    // iter() walks in logical (row-major) order regardless of memory layout
    let raw: Vec<u8> = array.iter().copied().collect();

    let img = match channels {
        1 => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(width, height, raw).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
        _ => None,
    };
    img.ok_or_else(unsupported)
}
