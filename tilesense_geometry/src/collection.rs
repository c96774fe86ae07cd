//! GeoJSON FeatureCollections, the wire format of model responses and of the
//! aggregated per-job output document.

use crate::Feature;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tilesense_derive::context;

/// The required `type` member of a FeatureCollection. A single-variant enum
/// so that deserialization rejects any other value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
enum CollectionType {
	#[default]
	FeatureCollection,
}

/// A GeoJSON FeatureCollection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
	#[serde(rename = "type")]
	collection_type: CollectionType,
	pub features: Vec<Feature>,
}

impl FeatureCollection {
	#[must_use]
	pub fn from(features: Vec<Feature>) -> Self {
		Self {
			collection_type: CollectionType::FeatureCollection,
			features,
		}
	}

	/// Parses a FeatureCollection from a GeoJSON string.
	#[context("parsing GeoJSON FeatureCollection ({} bytes)", json.len())]
	pub fn from_json_str(json: &str) -> Result<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Serializes the collection as a GeoJSON string.
	pub fn to_json_string(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.features.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.features.is_empty()
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Geometry;

	#[test]
	fn roundtrip() -> Result<()> {
		let collection = FeatureCollection::from(vec![
			Feature::from_image_geometry(Geometry::new_point([1.0, 2.0])).with_class("ship", 0.9),
		]);
		let json = collection.to_json_string()?;
		assert!(json.starts_with(r#"{"type":"FeatureCollection""#));
		assert_eq!(FeatureCollection::from_json_str(&json)?, collection);
		Ok(())
	}

	#[test]
	fn rejects_wrong_type_tag() {
		assert!(FeatureCollection::from_json_str(r#"{"type":"Collection","features":[]}"#).is_err());
		assert!(FeatureCollection::from_json_str("not json").is_err());
	}

	#[test]
	fn empty_collection() -> Result<()> {
		let collection = FeatureCollection::from_json_str(r#"{"type":"FeatureCollection","features":[]}"#)?;
		assert!(collection.is_empty());
		assert_eq!(collection.len(), 0);
		Ok(())
	}
}
