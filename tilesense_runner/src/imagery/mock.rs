//! Synthetic image sources for tests and local development.

use super::{ImageMetadata, ImageReader, ImageSource};
use crate::{ClassifiedError, ErrorClass};
use anyhow::{Result, ensure};
use async_trait::async_trait;
use dashmap::DashMap;
use image::{DynamicImage, RgbImage};
use tilesense_core::PixelRect;

/// An [`ImageSource`] producing a deterministic gradient for any window.
///
/// Pixels are a pure function of their full-image coordinates, so two
/// overlapping tiles agree on their shared pixels, as they would for a real
/// image.
#[derive(Debug)]
pub struct MockImageSource {
	metadata: ImageMetadata,
}

impl MockImageSource {
	/// A georeferenced mock image anchored at (8.0°E, 50.0°N) with a pixel
	/// size of one millionth of a degree.
	#[must_use]
	pub fn new(width: u32, height: u32) -> Self {
		Self {
			metadata: ImageMetadata {
				width,
				height,
				geotransform: Some([8.0, 1e-6, 0.0, 50.0, 0.0, -1e-6]),
				source_id: Some("mock-collect-001".to_string()),
				source_time: Some("2024-05-04T10:00:00Z".to_string()),
				category: Some("EO".to_string()),
			},
		}
	}

	/// A mock image without georeferencing metadata.
	#[must_use]
	pub fn new_without_geolocation(width: u32, height: u32) -> Self {
		let mut source = Self::new(width, height);
		source.metadata.geotransform = None;
		source
	}
}

#[async_trait]
impl ImageSource for MockImageSource {
	fn metadata(&self) -> &ImageMetadata {
		&self.metadata
	}

	async fn read_region(&self, rect: &PixelRect) -> Result<DynamicImage> {
		ensure!(
			self.metadata.full_rect()?.contains(rect),
			"window {rect} escapes the {}x{} image",
			self.metadata.width,
			self.metadata.height
		);
		let origin = (rect.x, rect.y);
		Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(
			rect.width,
			rect.height,
			move |x, y| {
				let (gx, gy) = (origin.0 + x, origin.1 + y);
				image::Rgb([(gx % 256) as u8, (gy % 256) as u8, ((gx + gy) % 256) as u8])
			},
		)))
	}
}

/// An [`ImageReader`] serving registered mock images by URI.
#[derive(Default)]
pub struct MockImageReader {
	images: DashMap<String, ImageMetadata>,
}

impl MockImageReader {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a mock image under `uri`.
	pub fn insert(&self, uri: &str, source: MockImageSource) {
		self.images.insert(uri.to_string(), source.metadata.clone());
	}
}

#[async_trait]
impl ImageReader for MockImageReader {
	async fn open(&self, uri: &str) -> Result<Box<dyn ImageSource>> {
		match self.images.get(uri) {
			Some(metadata) => Ok(Box::new(MockImageSource {
				metadata: metadata.clone(),
			})),
			None => Err(ClassifiedError::new(
				ErrorClass::Decode,
				&format!("no image registered under '{uri}'"),
			)),
		}
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
