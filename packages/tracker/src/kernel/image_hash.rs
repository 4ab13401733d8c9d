//! Perceptual hashing and screenshot compositing.
//!
//! The hash is a coarse similarity fingerprint, not a cryptographic hash:
//! the image is reduced to an 8x8 grayscale grid and each cell contributes
//! one bit depending on whether it is brighter than the grid mean. Equality
//! is bitwise; no distance threshold is applied.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Side length of the downsample grid.
const HASH_GRID: u32 = 8;

/// Compute the perceptual hash of encoded image bytes.
///
/// Always returns a 16-character lowercase hex string. Deterministic:
/// the same bytes always produce the same hash.
pub fn perceptual_hash(bytes: &[u8]) -> Result<String> {
    let img = image::load_from_memory(bytes).context("Failed to decode image")?;
    Ok(hash_image(&img))
}

/// Hash an already-decoded image.
pub fn hash_image(img: &DynamicImage) -> String {
    let small = img
        .resize_exact(HASH_GRID, HASH_GRID, FilterType::Triangle)
        .to_luma8();

    let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;

    let mut bits: u64 = 0;
    for pixel in pixels {
        bits = (bits << 1) | u64::from(pixel as f64 > mean);
    }

    format!("{:016x}", bits)
}

/// Stack screenshots vertically into one PNG.
///
/// The composite keeps the first image's width, paints a white background,
/// and stacks images top-to-bottom in capture order, so its height is the
/// sum of the input heights. A single screenshot is returned as-is.
pub fn combine_screenshots(screenshots: &[Vec<u8>]) -> Result<Vec<u8>> {
    if screenshots.is_empty() {
        anyhow::bail!("No screenshots to combine");
    }
    if screenshots.len() == 1 {
        return Ok(screenshots[0].clone());
    }

    let images = screenshots
        .iter()
        .map(|bytes| image::load_from_memory(bytes).context("Failed to decode screenshot"))
        .collect::<Result<Vec<_>>>()?;

    let width = images[0].width();
    let total_height: u32 = images.iter().map(|img| img.height()).sum();

    let mut canvas = RgbImage::from_pixel(width, total_height, image::Rgb([255, 255, 255]));
    let mut top = 0u32;
    for img in &images {
        let rgb = img.to_rgb8();
        for (x, y, pixel) in rgb.enumerate_pixels() {
            if x < width {
                // in-bounds by construction for y
                canvas.put_pixel(x, top + y, *pixel);
            }
        }
        top += img.height();
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut out, ImageFormat::Png)
        .context("Failed to encode combined image")?;
    Ok(out.into_inner())
}
