//! Image capability functions used by the pipeline.
//!
//! Everything here is synchronous and CPU-bound; async callers run it on
//! the blocking pool.

mod blur;
mod capture;
mod color;

pub use blur::stack_blur;
pub use capture::read_capture_metadata;
pub use color::dominant_color;

use crate::error::PhotoError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Decode a staged file as JPEG, rejecting any other format
pub fn decode_jpeg(path: &Path) -> Result<DynamicImage, PhotoError> {
    let file = File::open(path).map_err(|e| PhotoError::Decode(e.to_string()))?;
    image::load(BufReader::new(file), ImageFormat::Jpeg)
        .map_err(|e| PhotoError::Decode(e.to_string()))
}

/// Fit the image inside a `max_dimension` square, preserving aspect ratio.
///
/// Images already inside the box are returned at their own size.
pub fn bounded_resize(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image.clone();
    }
    // Catmull-Rom is the bicubic kernel
    image.resize(max_dimension, max_dimension, FilterType::CatmullRom)
}

/// Encode as baseline JPEG
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    Ok(buf)
}
