//! Small helpers for generating deterministic pixel buffers and comparing
//! decoded results, used by codec tests and by the in-process image mocks.

use image::{DynamicImage, GrayImage, RgbImage};

/// A deterministic RGB gradient image.
#[must_use]
pub fn new_test_rgb(width: u32, height: u32) -> DynamicImage {
	DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
		image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
	}))
}

/// A deterministic greyscale gradient image.
#[must_use]
pub fn new_test_grey(width: u32, height: u32) -> DynamicImage {
	DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
		image::Luma([((x * 7 + y * 13) % 256) as u8])
	}))
}

/// Largest absolute per-channel difference between two images.
///
/// Zero means a bit-exact round-trip; lossy codecs are asserted against a
/// small bound instead.
///
/// # Panics
/// Panics if the images have different dimensions or channel layouts.
#[must_use]
pub fn max_channel_difference(a: &DynamicImage, b: &DynamicImage) -> u8 {
	assert_eq!(a.width(), b.width(), "image widths differ");
	assert_eq!(a.height(), b.height(), "image heights differ");
	assert_eq!(a.color(), b.color(), "image color types differ");

	a.as_bytes()
		.iter()
		.zip(b.as_bytes())
		.map(|(x, y)| x.abs_diff(*y))
		.max()
		.unwrap_or(0)
}
