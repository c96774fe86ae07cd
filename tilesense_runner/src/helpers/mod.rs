//! Programmable in-process collaborators for tests and local development.

use crate::{ModelClient, ModelEndpoint};
use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::atomic::{AtomicU64, Ordering};
use tilesense_core::TileDescriptor;
use tilesense_geometry::FeatureCollection;

/// Per-tile behavior of a [`MockModelClient`].
pub type TileHandler = Box<dyn Fn(&TileDescriptor) -> Result<FeatureCollection> + Send + Sync>;

/// A [`ModelClient`] that answers from a closure instead of the network.
///
/// The closure decides per tile descriptor what the "model" detects, which
/// lets tests place detections at exact full-image positions or fail chosen
/// tiles.
pub struct MockModelClient {
	handler: TileHandler,
	invocations: AtomicU64,
}

impl MockModelClient {
	#[must_use]
	pub fn new(handler: TileHandler) -> Self {
		Self {
			handler,
			invocations: AtomicU64::new(0),
		}
	}

	/// A model that never detects anything.
	#[must_use]
	pub fn new_empty() -> Self {
		Self::new(Box::new(|_| Ok(FeatureCollection::default())))
	}

	/// Number of tiles this model has been invoked for.
	#[must_use]
	pub fn invocations(&self) -> u64 {
		self.invocations.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl ModelClient for MockModelClient {
	async fn invoke(
		&self,
		_endpoint: &ModelEndpoint,
		tile: &TileDescriptor,
		_pixels: &DynamicImage,
	) -> Result<FeatureCollection> {
		self.invocations.fetch_add(1, Ordering::Relaxed);
		(self.handler)(tile)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::request::tests::test_request;
	use tilesense_core::{PixelRect, TileCompression, TileFormat};
	use tilesense_image::helper::new_test_rgb;

	#[tokio::test]
	async fn counts_invocations_and_delegates() -> Result<()> {
		let model = MockModelClient::new_empty();
		let tile = TileDescriptor {
			rect: PixelRect::new(0, 0, 8, 8)?,
			format: TileFormat::PNG,
			compression: TileCompression::None,
		};
		let endpoint = test_request().image_processor;

		let collection = model.invoke(&endpoint, &tile, &new_test_rgb(8, 8)).await?;
		assert!(collection.is_empty());
		assert_eq!(model.invocations(), 1);
		Ok(())
	}
}
