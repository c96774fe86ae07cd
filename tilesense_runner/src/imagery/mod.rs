//! The image-decoder collaborator contract.
//!
//! Decoding NITF/GeoTIFF imagery is out of scope; the engine only needs the
//! narrow contract below: open an image by URI, learn its dimensions and
//! georeferencing metadata, and read rectangular pixel windows. Sources are
//! range-readable, so a worker never has to hold a full image in memory.

mod mock;
pub use mock::*;

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use tilesense_core::PixelRect;

/// Metadata of an opened image, as surfaced by the decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMetadata {
	/// Full image width in pixels.
	pub width: u32,
	/// Full image height in pixels.
	pub height: u32,
	/// Six-element affine geotransform (GDAL convention) when the image is
	/// georeferenced; `None` leaves lifted features without world geometry.
	pub geotransform: Option<[f64; 6]>,
	/// Identifier of the source collection.
	pub source_id: Option<String>,
	/// Acquisition time of the image.
	pub source_time: Option<String>,
	/// Sensor category inferred from the metadata (e.g. `EO`, `SAR`).
	pub category: Option<String>,
}

impl ImageMetadata {
	/// The full-image rectangle.
	pub fn full_rect(&self) -> Result<PixelRect> {
		PixelRect::new_full(self.width, self.height)
	}
}

/// An opened image: immutable metadata plus range-readable pixels.
#[async_trait]
pub trait ImageSource: Send + Sync + std::fmt::Debug {
	fn metadata(&self) -> &ImageMetadata;

	/// Reads the pixel window `rect`, which must lie within the image.
	async fn read_region(&self, rect: &PixelRect) -> Result<DynamicImage>;
}

/// Opens images by URI.
#[async_trait]
pub trait ImageReader: Send + Sync {
	async fn open(&self, uri: &str) -> Result<Box<dyn ImageSource>>;
}
