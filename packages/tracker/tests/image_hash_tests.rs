//! Unit tests for perceptual hashing and screenshot compositing.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use tracker_core::kernel::image_hash::{combine_screenshots, hash_image, perceptual_hash};

fn png_bytes(image: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn solid(width: u32, height: u32, shade: u8) -> Vec<u8> {
    png_bytes(RgbImage::from_pixel(width, height, Rgb([shade, shade, shade])))
}

/// Top half one shade, bottom half another.
fn split(width: u32, height: u32, top: u8, bottom: u8) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |_, y| {
        if y < height / 2 {
            Rgb([top, top, top])
        } else {
            Rgb([bottom, bottom, bottom])
        }
    });
    png_bytes(image)
}

#[test]
fn same_bytes_produce_same_hash() {
    let bytes = split(64, 64, 10, 240);
    assert_eq!(
        perceptual_hash(&bytes).unwrap(),
        perceptual_hash(&bytes).unwrap()
    );
}

#[test]
fn hash_is_always_sixteen_hex_chars() {
    for bytes in [solid(8, 8, 128), solid(640, 480, 0), split(33, 77, 5, 250)] {
        let hash = perceptual_hash(&bytes).unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn inverted_layouts_hash_differently() {
    let light_on_top = perceptual_hash(&split(64, 64, 240, 10)).unwrap();
    let dark_on_top = perceptual_hash(&split(64, 64, 10, 240)).unwrap();
    assert_ne!(light_on_top, dark_on_top);
}

#[test]
fn uniform_image_hashes_to_zero_bits() {
    // Every cell equals the mean, so no cell exceeds it
    let hash = perceptual_hash(&solid(100, 100, 77)).unwrap();
    assert_eq!(hash, "0000000000000000");
}

#[test]
fn hash_image_matches_bytes_path() {
    let bytes = split(64, 64, 20, 200);
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(hash_image(&decoded), perceptual_hash(&bytes).unwrap());
}

#[test]
fn composite_height_is_sum_of_input_heights() {
    let combined = combine_screenshots(&[
        solid(120, 40, 10),
        solid(120, 60, 120),
        solid(120, 25, 250),
    ])
    .unwrap();
    let image = image::load_from_memory(&combined).unwrap();
    assert_eq!(image.width(), 120);
    assert_eq!(image.height(), 40 + 60 + 25);
}

#[test]
fn composite_keeps_first_image_width() {
    let combined = combine_screenshots(&[solid(100, 30, 10), solid(80, 30, 200)]).unwrap();
    let image = image::load_from_memory(&combined).unwrap();
    assert_eq!(image.width(), 100);
    assert_eq!(image.height(), 60);
}

#[test]
fn composite_stacks_in_capture_order() {
    let combined = combine_screenshots(&[solid(10, 10, 0), solid(10, 10, 255)]).unwrap();
    let image = image::load_from_memory(&combined).unwrap().to_rgb8();
    assert_eq!(image.get_pixel(5, 2), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(5, 15), &Rgb([255, 255, 255]));
}

#[test]
fn single_screenshot_is_returned_unchanged() {
    let bytes = solid(50, 50, 128);
    assert_eq!(combine_screenshots(&[bytes.clone()]).unwrap(), bytes);
}

#[test]
fn empty_input_is_an_error() {
    assert!(combine_screenshots(&[]).is_err());
}
