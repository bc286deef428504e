//! Loads a picture of a single digit as a network input.
//!
//! The image (PNG/JPEG/BMP/GIF) is resized to `width × height`, converted to
//! grayscale and normalized to `[0, 1]`. The result is a `(1, width * height)`
//! row in row-major pixel order, the same layout the IDX reader produces.
use std::path::Path;

use image::imageops::FilterType;

use crate::error::Result;
use crate::math::matrix::Matrix;

pub fn image_to_input<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Matrix> {
    let img = image::open(path)?;
    Ok(luma_to_input(&img, width, height))
}

pub fn image_bytes_to_input(bytes: &[u8], width: u32, height: u32) -> Result<Matrix> {
    let img = image::load_from_memory(bytes)?;
    Ok(luma_to_input(&img, width, height))
}

fn luma_to_input(img: &image::DynamicImage, width: u32, height: u32) -> Matrix {
    let gray = img.resize_exact(width, height, FilterType::Lanczos3).to_luma8();
    Matrix::row_vector(gray.pixels().map(|p| p.0[0] as f64 / 255.0).collect())
}
