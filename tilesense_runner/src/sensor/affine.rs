//! Affine geotransform sensor model.

use super::{SensorModel, WorldPoint};
use anyhow::{Result, ensure};
use tilesense_derive::context;

/// Acceptable pixel error when validating the transform round trip.
const ROUNDTRIP_TOLERANCE: f64 = 1e-6;

/// A [`SensorModel`] backed by a six-element affine geotransform in GDAL
/// convention:
///
/// ```text
/// lon = t[0] + x * t[1] + y * t[2]
/// lat = t[3] + x * t[4] + y * t[5]
/// ```
///
/// The inverse is computed at construction and the mapping is validated by
/// a pixel→world→pixel round trip over the image corners.
#[derive(Debug, Clone)]
pub struct AffineSensorModel {
	transform: [f64; 6],
	inverse: [f64; 6],
}

impl AffineSensorModel {
	/// Builds and validates the model for an image of the given size.
	#[context("building affine sensor model from geotransform {transform:?}")]
	pub fn new(transform: [f64; 6], width: u32, height: u32) -> Result<AffineSensorModel> {
		let [c, a, b, f, d, e] = transform;
		let det = a * e - b * d;
		ensure!(det.abs() > f64::EPSILON, "geotransform is singular (det={det})");

		let inverse = [
			(b * f - c * e) / det,
			e / det,
			-b / det,
			(c * d - a * f) / det,
			-d / det,
			a / det,
		];
		let model = AffineSensorModel { transform, inverse };

		for (x, y) in [
			(0.0, 0.0),
			(f64::from(width), 0.0),
			(0.0, f64::from(height)),
			(f64::from(width), f64::from(height)),
		] {
			let world = model.pixel_to_world(x, y)?;
			let (rx, ry) = model.world_to_pixel(world.lon, world.lat)?;
			ensure!(
				(rx - x).abs() < ROUNDTRIP_TOLERANCE && (ry - y).abs() < ROUNDTRIP_TOLERANCE,
				"round trip of pixel ({x}, {y}) drifted to ({rx}, {ry})"
			);
		}
		Ok(model)
	}
}

impl SensorModel for AffineSensorModel {
	fn pixel_to_world(&self, x: f64, y: f64) -> Result<WorldPoint> {
		let t = &self.transform;
		Ok(WorldPoint {
			lon: t[0] + x * t[1] + y * t[2],
			lat: t[3] + x * t[4] + y * t[5],
			elev: None,
		})
	}

	fn world_to_pixel(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
		let i = &self.inverse;
		Ok((i[0] + lon * i[1] + lat * i[2], i[3] + lon * i[4] + lat * i[5]))
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use rstest::rstest;

	fn north_up() -> AffineSensorModel {
		AffineSensorModel::new([8.0, 1e-5, 0.0, 50.0, 0.0, -1e-5], 1000, 800).unwrap()
	}

	#[rstest]
	#[case((0.0, 0.0), (8.0, 50.0))]
	#[case((1000.0, 0.0), (8.01, 50.0))]
	#[case((0.0, 800.0), (8.0, 49.992))]
	#[case((500.0, 400.0), (8.005, 49.996))]
	fn north_up_mapping(#[case] pixel: (f64, f64), #[case] world: (f64, f64)) {
		let point = north_up().pixel_to_world(pixel.0, pixel.1).unwrap();
		assert_relative_eq!(point.lon, world.0, epsilon = 1e-9);
		assert_relative_eq!(point.lat, world.1, epsilon = 1e-9);
		assert!(point.elev.is_none());
	}

	#[test]
	fn rotated_transform_round_trips() {
		let model = AffineSensorModel::new([8.0, 7e-6, 3e-6, 50.0, 2e-6, -8e-6], 2000, 2000).unwrap();
		let world = model.pixel_to_world(123.0, 456.0).unwrap();
		let (x, y) = model.world_to_pixel(world.lon, world.lat).unwrap();
		assert_relative_eq!(x, 123.0, epsilon = 1e-6);
		assert_relative_eq!(y, 456.0, epsilon = 1e-6);
	}

	#[test]
	fn singular_transform_is_rejected() {
		assert!(AffineSensorModel::new([8.0, 1e-5, 0.0, 50.0, 2e-5, 0.0], 10, 10).is_err());
	}
}
