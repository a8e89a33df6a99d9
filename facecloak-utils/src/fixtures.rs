//! Synthetic images for tests and benchmarks.
//!
//! Everything here is generated in memory so tests do not depend on binary fixture files.

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Alternating black/white squares of `cell` pixels.
pub fn checkerboard(width: u32, height: u32, cell: u32) -> RgbImage {
    let cell = cell.max(1);
    RgbImage::from_fn(width, height, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// Uniform fill.
pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(rgb))
}

/// Diagonal color gradient; every neighbouring pixel pair differs.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let r = ((x * 7 + y * 3) % 256) as u8;
        let g = ((x * 3 + y * 11) % 256) as u8;
        Rgb([r, g, 255u8.wrapping_sub(r)])
    })
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png_bytes(image: &RgbImage) -> Result<Vec<u8>> {
    encode_with(image, ImageFormat::Png)
}

/// Encode an RGB image as JPEG bytes (default quality).
pub fn encode_jpeg_bytes(image: &RgbImage) -> Result<Vec<u8>> {
    encode_with(image, ImageFormat::Jpeg)
}

fn encode_with(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .with_context(|| format!("failed to encode fixture as {format:?}"))?;
    Ok(buffer.into_inner())
}
