//! The sensor-model adapter: mapping image pixels to earth coordinates.
//!
//! Full photogrammetry is an external collaborator. The engine relies on the
//! [`SensorModel`] trait only; images with an affine geotransform get the
//! built-in [`AffineSensorModel`], anything without usable geolocation
//! metadata gets no model at all, leaving lifted features with a null
//! geometry but intact pixel coordinates.

mod affine;
pub use affine::*;

use crate::ImageMetadata;
use anyhow::Result;
use log::warn;
use std::sync::Arc;

/// A point on earth: longitude/latitude in degrees, elevation in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldPoint {
	pub lon: f64,
	pub lat: f64,
	pub elev: Option<f64>,
}

/// Maps full-image pixel coordinates to world coordinates.
pub trait SensorModel: Send + Sync {
	/// Grounds one pixel. Errors are caught per feature by the lifter.
	fn pixel_to_world(&self, x: f64, y: f64) -> Result<WorldPoint>;

	/// Inverse mapping, used for round-trip validation.
	fn world_to_pixel(&self, lon: f64, lat: f64) -> Result<(f64, f64)>;
}

/// Builds the sensor model for an opened image.
///
/// Returns `None` when the image carries no usable geolocation metadata or
/// when the metadata fails round-trip validation; in both cases processing
/// continues with null world geometry.
#[must_use]
pub fn sensor_from_metadata(metadata: &ImageMetadata) -> Option<Arc<dyn SensorModel>> {
	let geotransform = metadata.geotransform?;
	match AffineSensorModel::new(geotransform, metadata.width, metadata.height) {
		Ok(model) => Some(Arc::new(model)),
		Err(error) => {
			warn!("ignoring unusable geotransform: {error:#}");
			None
		}
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
