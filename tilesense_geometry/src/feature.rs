//! Detected features and their provenance metadata.
//!
//! A [`Feature`] is GeoJSON-compatible: `geometry`/`bbox` carry world
//! coordinates (filled in by the lifter), while `properties.imageGeometry`
//! and `properties.imageBBox` carry pixel coordinates. Unknown properties
//! from model responses are preserved verbatim in `extra`.

use crate::{Bounds, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One class assignment of a detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureClass {
	/// Ontology IRI of the class.
	pub iri: String,
	/// Confidence score in `[0, 1]`.
	pub score: f64,
	/// Original score before distillation decayed it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub raw_score: Option<f64>,
}

impl FeatureClass {
	#[must_use]
	pub fn new(iri: &str, score: f64) -> Self {
		Self {
			iri: iri.to_string(),
			score,
			raw_score: None,
		}
	}
}

/// Provenance of the source image a detection came from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
	/// URI of the source image.
	pub location: String,
	/// Payload format the tile was sent as.
	pub format: String,
	/// Sensor category inferred from image metadata.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	/// Identifier of the source collection.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_id: Option<String>,
	/// Acquisition time of the source image.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_time: Option<String>,
}

/// Provenance of the inference run that produced a detection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceMetadata {
	/// Job the detection belongs to.
	pub job_id: String,
	/// Wall-clock time the feature was lifted.
	pub inference_time: String,
	/// Present when the coordinate lift failed for this feature.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lift_error: Option<String>,
}

/// The `properties` member of a detected feature.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
	/// Detection geometry in pixel coordinates (tile frame from the model,
	/// full-image frame after lifting).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_geometry: Option<Geometry>,
	/// Detection bounds in pixel coordinates.
	#[serde(default, skip_serializing_if = "Option::is_none", rename = "imageBBox")]
	pub image_bbox: Option<Bounds>,
	/// Class assignments, highest score first by convention.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub feature_classes: Vec<FeatureClass>,
	/// Source image provenance.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub source_metadata: Vec<SourceMetadata>,
	/// Inference run provenance.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inference_metadata: Option<InferenceMetadata>,

	/// Deprecated spelling of `imageBBox`, migrated by [`Feature::normalize`].
	#[serde(default, skip_serializing_if = "Option::is_none", rename = "bounds_imcoords")]
	pub bounds_imcoords: Option<Bounds>,
	/// Deprecated class map, migrated by [`Feature::normalize`].
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty", rename = "feature_types")]
	pub feature_types: BTreeMap<String, f64>,

	/// Unrecognized properties, preserved verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// The required `type` member of a Feature. A single-variant enum so that
/// deserialization rejects any other value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
enum FeatureType {
	#[default]
	Feature,
}

/// A GeoJSON Feature representing one detected object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
	#[serde(rename = "type")]
	feature_type: FeatureType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<Value>,
	/// World-coordinate geometry; `null` until lifted, and stays `null` when
	/// the image carries no usable geolocation.
	#[serde(default)]
	pub geometry: Option<Geometry>,
	/// World-coordinate bounds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bbox: Option<Bounds>,
	#[serde(default)]
	pub properties: FeatureProperties,
}

impl Feature {
	/// A feature with only a pixel geometry, as a model would return it.
	#[must_use]
	pub fn from_image_geometry(geometry: Geometry) -> Self {
		Feature {
			properties: FeatureProperties {
				image_geometry: Some(geometry),
				..Default::default()
			},
			..Default::default()
		}
	}

	/// Adds a class assignment.
	#[must_use]
	pub fn with_class(mut self, iri: &str, score: f64) -> Self {
		self.properties.feature_classes.push(FeatureClass::new(iri, score));
		self
	}

	/// The class assignment with the highest score; the first one wins ties.
	#[must_use]
	pub fn dominant_class(&self) -> Option<&FeatureClass> {
		let mut best: Option<&FeatureClass> = None;
		for class in &self.properties.feature_classes {
			if best.is_none_or(|b| class.score > b.score) {
				best = Some(class);
			}
		}
		best
	}

	/// Pixel bounds used for IoU comparisons: the explicit `imageBBox`, or
	/// the axis-aligned bounds of `imageGeometry`.
	#[must_use]
	pub fn image_bounds(&self) -> Option<Bounds> {
		self
			.properties
			.image_bbox
			.or_else(|| self.properties.image_geometry.as_ref().and_then(Geometry::bounds))
	}

	/// Migrates deprecated fields and fills derivable ones:
	/// `bounds_imcoords` → `imageBBox`, `feature_types` → `featureClasses`,
	/// and a missing `imageBBox` is derived from `imageGeometry`.
	pub fn normalize(&mut self) {
		if self.properties.image_bbox.is_none() {
			self.properties.image_bbox = self.properties.bounds_imcoords.take();
		} else {
			self.properties.bounds_imcoords = None;
		}

		if self.properties.feature_classes.is_empty() && !self.properties.feature_types.is_empty() {
			self.properties.feature_classes = std::mem::take(&mut self.properties.feature_types)
				.into_iter()
				.map(|(iri, score)| FeatureClass {
					iri,
					score,
					raw_score: None,
				})
				.collect();
		} else {
			self.properties.feature_types.clear();
		}

		if self.properties.image_bbox.is_none() {
			self.properties.image_bbox = self.properties.image_geometry.as_ref().and_then(Geometry::bounds);
		}
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn serde_wire_shape() {
		let feature = Feature::from_image_geometry(Geometry::new_point([10.0, 20.0])).with_class("ship", 0.9);
		let json = serde_json::to_value(&feature).unwrap();
		assert_eq!(json["type"], "Feature");
		assert_eq!(json["geometry"], Value::Null);
		assert_eq!(json["properties"]["imageGeometry"]["type"], "Point");
		assert_eq!(json["properties"]["featureClasses"][0]["iri"], "ship");

		let parsed: Feature = serde_json::from_value(json).unwrap();
		assert_eq!(parsed, feature);
	}

	#[test]
	fn unknown_properties_are_preserved() {
		let json = r#"{
			"type": "Feature",
			"geometry": null,
			"properties": {"imageBBox": [0, 0, 4, 4], "detectionId": "abc"}
		}"#;
		let feature: Feature = serde_json::from_str(json).unwrap();
		assert_eq!(feature.properties.extra["detectionId"], "abc");
		let out = serde_json::to_value(&feature).unwrap();
		assert_eq!(out["properties"]["detectionId"], "abc");
	}

	#[test]
	fn dominant_class_prefers_first_on_ties() {
		let feature = Feature::default()
			.with_class("ship", 0.7)
			.with_class("boat", 0.9)
			.with_class("barge", 0.9);
		assert_eq!(feature.dominant_class().unwrap().iri, "boat");
		assert!(Feature::default().dominant_class().is_none());
	}

	#[test]
	fn normalize_migrates_bounds_imcoords() {
		let json = r#"{
			"type": "Feature",
			"geometry": null,
			"properties": {"bounds_imcoords": [1, 2, 3, 4]}
		}"#;
		let mut feature: Feature = serde_json::from_str(json).unwrap();
		feature.normalize();
		assert_eq!(feature.properties.image_bbox, Some(Bounds::new(1.0, 2.0, 3.0, 4.0)));
		assert!(feature.properties.bounds_imcoords.is_none());
	}

	#[test]
	fn normalize_migrates_feature_types() {
		let json = r#"{
			"type": "Feature",
			"geometry": null,
			"properties": {"feature_types": {"ship": 0.8, "airplane": 0.2}}
		}"#;
		let mut feature: Feature = serde_json::from_str(json).unwrap();
		feature.normalize();
		let iris: Vec<&str> = feature
			.properties
			.feature_classes
			.iter()
			.map(|c| c.iri.as_str())
			.collect();
		assert_eq!(iris, vec!["airplane", "ship"]);
		assert!(feature.properties.feature_types.is_empty());
		assert_eq!(feature.dominant_class().unwrap().iri, "ship");
	}

	#[test]
	fn normalize_keeps_explicit_image_bbox() {
		let json = r#"{
			"type": "Feature",
			"geometry": null,
			"properties": {"imageBBox": [0, 0, 9, 9], "bounds_imcoords": [1, 1, 2, 2]}
		}"#;
		let mut feature: Feature = serde_json::from_str(json).unwrap();
		feature.normalize();
		assert_eq!(feature.properties.image_bbox, Some(Bounds::new(0.0, 0.0, 9.0, 9.0)));
		assert!(feature.properties.bounds_imcoords.is_none());
	}

	#[test]
	fn normalize_derives_bbox_from_geometry() {
		let mut feature =
			Feature::from_image_geometry(Geometry::new_multi_point(vec![[1.0, 8.0], [5.0, 2.0]]));
		feature.normalize();
		assert_eq!(feature.properties.image_bbox, Some(Bounds::new(1.0, 2.0, 5.0, 8.0)));
		assert_eq!(feature.image_bounds(), Some(Bounds::new(1.0, 2.0, 5.0, 8.0)));
	}
}
