//! In-memory sinks used by tests and single-host deployments.

use super::{FeatureSink, SinkFactory};
use crate::OutputDescriptor;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tilesense_geometry::{Feature, FeatureCollection};

/// An object-store sink holding one GeoJSON document per job in memory.
#[derive(Debug, Default)]
pub struct MemoryFeatureStore {
	bucket: String,
	prefix: String,
	regions: DashMap<(String, String), Vec<Feature>>,
	documents: DashMap<String, String>,
}

impl MemoryFeatureStore {
	#[must_use]
	pub fn new(bucket: &str, prefix: &str) -> Self {
		Self {
			bucket: bucket.to_string(),
			prefix: prefix.to_string(),
			..Default::default()
		}
	}

	fn object_uri(&self, job_id: &str) -> String {
		format!("s3://{}/{}/{}.geojson", self.bucket, self.prefix, job_id)
	}

	/// The finalized GeoJSON document of a job, for assertions in tests.
	pub fn document(&self, job_id: &str) -> Result<Option<FeatureCollection>> {
		match self.documents.get(job_id) {
			Some(doc) => Ok(Some(FeatureCollection::from_json_str(&doc)?)),
			None => Ok(None),
		}
	}

	/// Number of regions appended for a job.
	#[must_use]
	pub fn region_count(&self, job_id: &str) -> usize {
		self.regions.iter().filter(|entry| entry.key().0 == job_id).count()
	}
}

#[async_trait]
impl FeatureSink for MemoryFeatureStore {
	async fn append(&self, job_id: &str, region_id: &str, features: &[Feature]) -> Result<()> {
		// Keyed by region id: a redelivered region replaces its append.
		self
			.regions
			.insert((job_id.to_string(), region_id.to_string()), features.to_vec());
		Ok(())
	}

	async fn finalize(&self, job_id: &str) -> Result<Option<String>> {
		let mut parts: Vec<(String, Vec<Feature>)> = self
			.regions
			.iter()
			.filter(|entry| entry.key().0 == job_id)
			.map(|entry| (entry.key().1.clone(), entry.value().clone()))
			.collect();
		// Regions complete in arbitrary order; sort for a stable document.
		parts.sort_by(|a, b| a.0.cmp(&b.0));

		let collection = FeatureCollection::from(parts.into_iter().flat_map(|(_, features)| features).collect());
		self.documents.insert(job_id.to_string(), collection.to_json_string()?);
		Ok(Some(self.object_uri(job_id)))
	}
}

/// A streaming-bus sink emitting features in bounded batches.
#[derive(Debug)]
pub struct MemoryStreamSink {
	stream: String,
	batch_size: usize,
	pending: Mutex<Vec<Feature>>,
	batches: Mutex<Vec<Vec<Feature>>>,
}

impl MemoryStreamSink {
	#[must_use]
	pub fn new(stream: &str, batch_size: usize) -> Self {
		Self {
			stream: stream.to_string(),
			batch_size: batch_size.max(1),
			pending: Mutex::new(Vec::new()),
			batches: Mutex::new(Vec::new()),
		}
	}

	/// All emitted batches, for assertions in tests.
	#[must_use]
	pub fn batches(&self) -> Vec<Vec<Feature>> {
		self.batches.lock().clone()
	}

	/// Total number of emitted features.
	#[must_use]
	pub fn emitted_count(&self) -> usize {
		self.batches.lock().iter().map(Vec::len).sum()
	}

	fn drain_full_batches(&self) {
		let mut pending = self.pending.lock();
		let mut batches = self.batches.lock();
		while pending.len() >= self.batch_size {
			batches.push(pending.drain(..self.batch_size).collect());
		}
	}
}

#[async_trait]
impl FeatureSink for MemoryStreamSink {
	async fn append(&self, _job_id: &str, _region_id: &str, features: &[Feature]) -> Result<()> {
		self.pending.lock().extend_from_slice(features);
		self.drain_full_batches();
		Ok(())
	}

	async fn finalize(&self, _job_id: &str) -> Result<Option<String>> {
		self.drain_full_batches();
		let mut pending = self.pending.lock();
		if !pending.is_empty() {
			self.batches.lock().push(pending.drain(..).collect());
		}
		Ok(Some(format!("kinesis://{}", self.stream)))
	}
}

/// A [`SinkFactory`] resolving every output onto shared in-memory sinks, so
/// that all workers of a test or single-host run observe the same state.
#[derive(Default)]
pub struct MemorySinkFactory {
	stores: DashMap<(String, String), Arc<MemoryFeatureStore>>,
	streams: DashMap<String, Arc<MemoryStreamSink>>,
}

impl MemorySinkFactory {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// The shared store behind an `S3` output.
	#[must_use]
	pub fn store(&self, bucket: &str, prefix: &str) -> Arc<MemoryFeatureStore> {
		self
			.stores
			.entry((bucket.to_string(), prefix.to_string()))
			.or_insert_with(|| Arc::new(MemoryFeatureStore::new(bucket, prefix)))
			.clone()
	}

	/// The shared sink behind a `Kinesis` output.
	#[must_use]
	pub fn stream(&self, stream: &str, batch_size: usize) -> Arc<MemoryStreamSink> {
		self
			.streams
			.entry(stream.to_string())
			.or_insert_with(|| Arc::new(MemoryStreamSink::new(stream, batch_size)))
			.clone()
	}
}

impl SinkFactory for MemorySinkFactory {
	fn open_sinks(&self, outputs: &[OutputDescriptor]) -> Result<Vec<Arc<dyn FeatureSink>>> {
		outputs
			.iter()
			.map(|output| {
				Ok(match output {
					OutputDescriptor::S3 { bucket, prefix } => self.store(bucket, prefix) as Arc<dyn FeatureSink>,
					OutputDescriptor::Kinesis { stream, batch_size } => {
						self.stream(stream, *batch_size) as Arc<dyn FeatureSink>
					}
				})
			})
			.collect()
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use tilesense_geometry::Geometry;

	fn features(n: usize) -> Vec<Feature> {
		(0..n)
			.map(|i| Feature::from_image_geometry(Geometry::new_point([i as f64, 0.0])))
			.collect()
	}

	#[tokio::test]
	async fn store_appends_are_idempotent_per_region() -> Result<()> {
		let store = MemoryFeatureStore::new("results", "detections");
		store.append("job", "region-a", &features(3)).await?;
		store.append("job", "region-b", &features(2)).await?;
		// Redelivered region replaces its earlier append.
		store.append("job", "region-a", &features(3)).await?;

		let uri = store.finalize("job").await?;
		assert_eq!(uri.as_deref(), Some("s3://results/detections/job.geojson"));
		assert_eq!(store.document("job")?.unwrap().len(), 5);
		assert_eq!(store.region_count("job"), 2);
		Ok(())
	}

	#[tokio::test]
	async fn stream_batches_by_size() -> Result<()> {
		let sink = MemoryStreamSink::new("features", 4);
		sink.append("job", "region-a", &features(6)).await?;
		assert_eq!(sink.batches().len(), 1);

		sink.append("job", "region-b", &features(3)).await?;
		sink.finalize("job").await?;

		let batches = sink.batches();
		assert_eq!(batches.len(), 3);
		assert_eq!(batches[0].len(), 4);
		assert_eq!(batches[1].len(), 4);
		assert_eq!(batches[2].len(), 1);
		assert_eq!(sink.emitted_count(), 9);
		Ok(())
	}

	#[tokio::test]
	async fn factory_shares_sinks_across_opens() -> Result<()> {
		let factory = MemorySinkFactory::new();
		let outputs = vec![
			OutputDescriptor::S3 {
				bucket: "results".to_string(),
				prefix: "detections".to_string(),
			},
			OutputDescriptor::Kinesis {
				stream: "features".to_string(),
				batch_size: 10,
			},
		];

		let sinks = factory.open_sinks(&outputs)?;
		assert_eq!(sinks.len(), 2);
		sinks[0].append("job", "region-a", &features(1)).await?;

		// A second worker opening the same outputs sees the same store.
		let again = factory.open_sinks(&outputs)?;
		again[0].finalize("job").await?;
		assert_eq!(factory.store("results", "detections").document("job")?.unwrap().len(), 1);
		Ok(())
	}
}
