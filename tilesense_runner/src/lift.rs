//! The feature lifter: rewriting per-tile detections into full-image pixel
//! coordinates and world coordinates, and attaching pedigree.
//!
//! Models see one tile at a time and report geometry in the tile frame. The
//! lifter translates those coordinates by the tile origin, grounds them
//! through the sensor model into `geometry`/`bbox`, and stamps source and
//! inference metadata. A failing lift is non-fatal: the feature keeps its
//! pixel coordinates, gets a null geometry and a lift-error tag.

use crate::{ImageMetadata, SensorModel, clock::now_rfc3339};
use anyhow::Result;
use log::debug;
use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};
use tilesense_core::{PixelRect, TileFormat};
use tilesense_geometry::{Bounds, Feature, Geometry, InferenceMetadata, Position, SourceMetadata};

/// Lifts the features of one image; shared by all tiles of its regions.
pub struct FeatureLifter {
	job_id: String,
	source: SourceMetadata,
	sensor: Option<Arc<dyn SensorModel>>,
	lift_errors: AtomicU64,
}

impl FeatureLifter {
	#[must_use]
	pub fn new(
		job_id: &str,
		image_url: &str,
		format: TileFormat,
		metadata: &ImageMetadata,
		sensor: Option<Arc<dyn SensorModel>>,
	) -> Self {
		Self {
			job_id: job_id.to_string(),
			source: SourceMetadata {
				location: image_url.to_string(),
				format: format.to_string(),
				category: metadata.category.clone(),
				source_id: metadata.source_id.clone(),
				source_time: metadata.source_time.clone(),
			},
			sensor,
			lift_errors: AtomicU64::new(0),
		}
	}

	/// Number of features whose coordinate lift failed so far.
	#[must_use]
	pub fn lift_errors(&self) -> u64 {
		self.lift_errors.load(Ordering::Relaxed)
	}

	/// Lifts all features returned by the model for the tile at `tile`.
	#[must_use]
	pub fn lift_tile_features(&self, features: Vec<Feature>, tile: &PixelRect) -> Vec<Feature> {
		features
			.into_iter()
			.map(|feature| self.lift_feature(feature, tile))
			.collect()
	}

	fn lift_feature(&self, mut feature: Feature, tile: &PixelRect) -> Feature {
		feature.normalize();

		// Tile frame → full-image frame.
		let (dx, dy) = (f64::from(tile.x), f64::from(tile.y));
		feature.properties.image_geometry = feature
			.properties
			.image_geometry
			.as_ref()
			.map(|geometry| translate(geometry, dx, dy));
		feature.properties.image_bbox = feature.properties.image_bbox.map(|bounds| bounds.translate(dx, dy));

		// Full-image frame → world.
		let mut lift_error = None;
		if let Some(sensor) = &self.sensor {
			match self.ground(&feature, sensor.as_ref()) {
				Ok((geometry, bbox)) => {
					feature.geometry = geometry;
					feature.bbox = bbox;
				}
				Err(error) => {
					debug!("coordinate lift failed for job '{}': {error:#}", self.job_id);
					feature.geometry = None;
					feature.bbox = None;
					lift_error = Some(format!("{error:#}"));
					self.lift_errors.fetch_add(1, Ordering::Relaxed);
				}
			}
		}

		feature.properties.source_metadata.push(self.source.clone());
		feature.properties.inference_metadata = Some(InferenceMetadata {
			job_id: self.job_id.clone(),
			inference_time: now_rfc3339(),
			lift_error,
		});
		feature
	}

	/// Grounds the pixel geometry and bbox of a feature into world space.
	fn ground(&self, feature: &Feature, sensor: &dyn SensorModel) -> Result<(Option<Geometry>, Option<Bounds>)> {
		let geometry = match &feature.properties.image_geometry {
			Some(geometry) => Some(geometry.map_positions(|position| {
				let point = sensor.pixel_to_world(position.x, position.y)?;
				Ok(Position {
					x: point.lon,
					y: point.lat,
					z: point.elev,
				})
			})?),
			None => None,
		};

		// The world bbox comes from the pixel bbox corners so that rotated
		// transforms still produce a covering box.
		let bbox = match &feature.properties.image_bbox {
			Some(bounds) => {
				let mut world: Option<Bounds> = None;
				for (x, y) in bounds.corners() {
					let point = sensor.pixel_to_world(x, y)?;
					world = Some(match world {
						Some(b) => b.include(point.lon, point.lat),
						None => Bounds::new_point(point.lon, point.lat),
					});
				}
				world
			}
			None => geometry.as_ref().and_then(Geometry::bounds),
		};

		Ok((geometry, bbox))
	}
}

/// Infallible translation of a geometry.
fn translate(geometry: &Geometry, dx: f64, dy: f64) -> Geometry {
	geometry
		.map_positions(|position| {
			Ok(Position {
				x: position.x + dx,
				y: position.y + dy,
				z: position.z,
			})
		})
		.expect("translation cannot fail")
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
