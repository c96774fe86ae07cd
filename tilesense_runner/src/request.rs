//! Wire types of the work queues: image requests and the region requests
//! derived from them.

use crate::{ClassifiedError, ErrorClass};
use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use tilesense_core::{MAX_TILE_SIZE, PixelRect, TileCompression, TileFormat};
use tilesense_derive::context;
use tilesense_geometry::DistillationMode;

/// Descriptor of the remote model endpoint a job runs against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEndpoint {
	/// For HTTP endpoints, the base URL the worker posts tiles to.
	pub name: String,
	#[serde(rename = "type")]
	pub kind: EndpointKind,
}

/// Supported endpoint transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
	#[serde(rename = "HTTP")]
	Http,
}

impl ModelEndpoint {
	/// The invocation URL tiles are posted to.
	#[must_use]
	pub fn invocation_url(&self) -> String {
		format!("{}/invocations", self.name.trim_end_matches('/'))
	}
}

/// One output destination of a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OutputDescriptor {
	/// Object-store sink: one GeoJSON document per job.
	S3 { bucket: String, prefix: String },
	/// Streaming-bus sink: features emitted in batches.
	Kinesis {
		stream: String,
		#[serde(default = "default_batch_size")]
		batch_size: usize,
	},
}

fn default_batch_size() -> usize {
	100
}

/// An image processing request, as read from the image queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
	pub job_name: String,
	pub job_id: String,
	/// Source images; the first entry is the primary image.
	pub image_urls: Vec<String>,
	pub outputs: Vec<OutputDescriptor>,
	pub image_processor: ModelEndpoint,
	pub image_processor_tile_size: u32,
	pub image_processor_tile_overlap: u32,
	pub image_processor_tile_format: TileFormat,
	#[serde(default)]
	pub image_processor_tile_compression: TileCompression,
	/// Optional override of the worker's region size.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub region_size: Option<u32>,
	/// Optional override of the worker's default distillation mode.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub feature_distillation: Option<String>,
}

impl ImageRequest {
	/// Parses a request from a queue message body.
	#[context("parsing image request ({} bytes)", body.len())]
	pub fn from_json_str(body: &str) -> Result<Self> {
		Ok(serde_json::from_str(body)?)
	}

	/// The primary image the job runs on.
	#[must_use]
	pub fn primary_image_url(&self) -> &str {
		self.image_urls.first().map_or("", String::as_str)
	}

	/// Checks required fields, tile parameter bounds and the
	/// format/compression table. Violations are permanent validation errors.
	pub fn validate(&self) -> Result<()> {
		self
			.validate_inner()
			.map_err(|e| ClassifiedError::wrap(ErrorClass::Validation, e))
	}

	#[context("validating image request '{}'", self.job_id)]
	fn validate_inner(&self) -> Result<()> {
		ensure!(!self.job_id.trim().is_empty(), "jobId must not be empty");
		ensure!(!self.image_urls.is_empty(), "imageUrls must not be empty");
		ensure!(
			self.image_urls.iter().all(|url| !url.trim().is_empty()),
			"imageUrls must not contain empty entries"
		);
		ensure!(!self.outputs.is_empty(), "outputs must not be empty");
		ensure!(
			!self.image_processor.name.trim().is_empty(),
			"imageProcessor.name must not be empty"
		);

		let tile_size = self.image_processor_tile_size;
		ensure!(
			tile_size >= 1 && tile_size <= MAX_TILE_SIZE,
			"imageProcessorTileSize ({tile_size}) must be within 1..={MAX_TILE_SIZE}"
		);
		ensure!(
			self.image_processor_tile_overlap < tile_size,
			"imageProcessorTileOverlap ({}) must be smaller than the tile size ({tile_size})",
			self.image_processor_tile_overlap
		);

		self
			.image_processor_tile_format
			.ensure_compression(self.image_processor_tile_compression)?;

		if let Some(region_size) = self.region_size {
			ensure!(region_size > 0, "regionSize override must be > 0");
		}
		if let Some(mode) = &self.feature_distillation {
			DistillationMode::parse_str(mode)?;
		}
		Ok(())
	}

	/// The distillation mode of this job, falling back to the worker default.
	#[context("resolving distillation mode for job '{}'", self.job_id)]
	pub fn distillation_mode(&self, default_mode: &str) -> Result<DistillationMode> {
		DistillationMode::parse_str(self.feature_distillation.as_deref().unwrap_or(default_mode))
	}

	/// Derives the self-contained request for one region of this image.
	#[must_use]
	pub fn region_request(&self, region: PixelRect) -> RegionRequest {
		RegionRequest {
			job_id: self.job_id.clone(),
			image_url: self.primary_image_url().to_string(),
			region,
			tile_size: self.image_processor_tile_size,
			tile_overlap: self.image_processor_tile_overlap,
			tile_format: self.image_processor_tile_format,
			tile_compression: self.image_processor_tile_compression,
			image_processor: self.image_processor.clone(),
			outputs: self.outputs.clone(),
			feature_distillation: self.feature_distillation.clone(),
		}
	}
}

/// A region processing request, self-contained so any worker can process it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRequest {
	pub job_id: String,
	pub image_url: String,
	/// Region bounds in full-image pixel coordinates.
	pub region: PixelRect,
	pub tile_size: u32,
	pub tile_overlap: u32,
	pub tile_format: TileFormat,
	#[serde(default)]
	pub tile_compression: TileCompression,
	pub image_processor: ModelEndpoint,
	pub outputs: Vec<OutputDescriptor>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub feature_distillation: Option<String>,
}

impl RegionRequest {
	/// Parses a request from a queue message body.
	#[context("parsing region request ({} bytes)", body.len())]
	pub fn from_json_str(body: &str) -> Result<Self> {
		Ok(serde_json::from_str(body)?)
	}

	/// Stable identifier of the region within its job, derived from the
	/// region bounds so that re-planning produces identical ids.
	#[must_use]
	pub fn region_id(&self) -> String {
		region_id(&self.region)
	}

	/// The distillation mode of this region, falling back to the worker default.
	#[context("resolving distillation mode for job '{}'", self.job_id)]
	pub fn distillation_mode(&self, default_mode: &str) -> Result<DistillationMode> {
		DistillationMode::parse_str(self.feature_distillation.as_deref().unwrap_or(default_mode))
	}
}

/// Region identifier derived from region bounds.
#[must_use]
pub fn region_id(region: &PixelRect) -> String {
	format!("region-{}", region)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
	use super::*;
	use crate::classify;
	use pretty_assertions::assert_eq;

	pub fn test_request() -> ImageRequest {
		ImageRequest {
			job_name: "ships-over-harbor".to_string(),
			job_id: "job-0001".to_string(),
			image_urls: vec!["mem://images/harbor.tif".to_string()],
			outputs: vec![OutputDescriptor::S3 {
				bucket: "results".to_string(),
				prefix: "detections".to_string(),
			}],
			image_processor: ModelEndpoint {
				name: "http://models.local/ship-detector".to_string(),
				kind: EndpointKind::Http,
			},
			image_processor_tile_size: 2048,
			image_processor_tile_overlap: 50,
			image_processor_tile_format: TileFormat::PNG,
			image_processor_tile_compression: TileCompression::None,
			region_size: None,
			feature_distillation: None,
		}
	}

	#[test]
	fn wire_roundtrip_uses_camel_case() {
		let request = test_request();
		let json = serde_json::to_value(&request).unwrap();
		assert_eq!(json["jobId"], "job-0001");
		assert_eq!(json["imageProcessorTileSize"], 2048);
		assert_eq!(json["imageProcessor"]["type"], "HTTP");
		assert_eq!(json["outputs"][0]["type"], "S3");

		let parsed = ImageRequest::from_json_str(&json.to_string()).unwrap();
		assert_eq!(parsed, request);
	}

	#[test]
	fn compression_defaults_to_none() {
		let json = r#"{
			"jobName": "j", "jobId": "job-2", "imageUrls": ["mem://i.tif"],
			"outputs": [{"type": "Kinesis", "stream": "features"}],
			"imageProcessor": {"name": "http://m", "type": "HTTP"},
			"imageProcessorTileSize": 512,
			"imageProcessorTileOverlap": 0,
			"imageProcessorTileFormat": "PNG"
		}"#;
		let request = ImageRequest::from_json_str(json).unwrap();
		assert_eq!(request.image_processor_tile_compression, TileCompression::None);
		assert_eq!(
			request.outputs[0],
			OutputDescriptor::Kinesis {
				stream: "features".to_string(),
				batch_size: 100
			}
		);
	}

	#[test]
	fn validation_catches_bad_requests() {
		let mut request = test_request();
		request.job_id = " ".to_string();
		assert!(request.validate().is_err());

		let mut request = test_request();
		request.image_urls.clear();
		assert!(request.validate().is_err());

		let mut request = test_request();
		request.image_processor_tile_size = 0;
		assert!(request.validate().is_err());

		let mut request = test_request();
		request.image_processor_tile_size = MAX_TILE_SIZE + 1;
		assert!(request.validate().is_err());

		let mut request = test_request();
		request.image_processor_tile_overlap = 2048;
		assert!(request.validate().is_err());

		let mut request = test_request();
		request.feature_distillation = Some("MAX-POOL".to_string());
		assert!(request.validate().is_err());
	}

	#[test]
	fn validation_enforces_format_compression_table() {
		let mut request = test_request();
		request.image_processor_tile_format = TileFormat::PNG;
		request.image_processor_tile_compression = TileCompression::Lzw;
		let error = request.validate().unwrap_err();
		assert_eq!(classify(&error), ErrorClass::Validation);

		request.image_processor_tile_format = TileFormat::GTIFF;
		assert!(request.validate().is_ok());
	}

	#[test]
	fn region_request_is_self_contained() {
		let request = test_request();
		let region = PixelRect::new(8192, 0, 8192, 8192).unwrap();
		let derived = request.region_request(region);
		assert_eq!(derived.job_id, request.job_id);
		assert_eq!(derived.image_url, "mem://images/harbor.tif");
		assert_eq!(derived.region, region);
		assert_eq!(derived.region_id(), "region-8192x8192+8192+0");

		let json = serde_json::to_string(&derived).unwrap();
		assert_eq!(RegionRequest::from_json_str(&json).unwrap(), derived);
	}

	#[test]
	fn distillation_falls_back_to_worker_default() {
		let mut request = test_request();
		assert_eq!(
			request.distillation_mode("NONE").unwrap(),
			tilesense_geometry::DistillationMode::None
		);
		request.feature_distillation = Some("NMS".to_string());
		assert!(matches!(
			request.distillation_mode("NONE").unwrap(),
			tilesense_geometry::DistillationMode::Nms { .. }
		));
	}

	#[test]
	fn invocation_url_is_normalized() {
		let endpoint = ModelEndpoint {
			name: "http://models.local/detector/".to_string(),
			kind: EndpointKind::Http,
		};
		assert_eq!(endpoint.invocation_url(), "http://models.local/detector/invocations");
	}
}
