//! Shared test harness: a single-process "fleet" wired from the in-memory
//! collaborators.

use std::sync::Arc;
use tilesense_core::{TileCompression, TileFormat, WorkerConfig};
use tilesense_runner::{
	EndpointKind, ImageRequest, MemoryLedger, MemoryQueue, MemorySinkFactory, MockImageReader, ModelClient,
	ModelEndpoint, OutputDescriptor, RunnerContext, Worker,
};

pub struct Harness {
	pub ctx: Arc<RunnerContext>,
	pub ledger: Arc<MemoryLedger>,
	pub image_queue: Arc<MemoryQueue>,
	pub region_queue: Arc<MemoryQueue>,
	pub sinks: Arc<MemorySinkFactory>,
	pub reader: Arc<MockImageReader>,
}

impl Harness {
	pub fn new(config: WorkerConfig, model: Arc<dyn ModelClient>) -> Self {
		let _ = env_logger::builder().is_test(true).try_init();

		let ledger = Arc::new(MemoryLedger::new());
		let image_queue = Arc::new(MemoryQueue::new(config.visibility_timeout));
		let region_queue = Arc::new(MemoryQueue::new(config.visibility_timeout));
		let sinks = Arc::new(MemorySinkFactory::new());
		let reader = Arc::new(MockImageReader::new());

		let ctx = Arc::new(RunnerContext::new(
			config,
			ledger.clone(),
			image_queue.clone(),
			region_queue.clone(),
			reader.clone(),
			model,
			sinks.clone(),
		));

		Self {
			ctx,
			ledger,
			image_queue,
			region_queue,
			sinks,
			reader,
		}
	}

	pub fn worker(&self) -> Worker {
		Worker::new(self.ctx.clone())
	}

	pub async fn send_image_request(&self, request: &ImageRequest) {
		use tilesense_runner::WorkQueue;
		self
			.image_queue
			.send(serde_json::to_string(request).unwrap())
			.await
			.unwrap();
	}
}

/// A request against the mock image `mem://images/scene.tif` with an S3
/// output, PNG tiles and no distillation.
pub fn base_request(tile_size: u32, tile_overlap: u32) -> ImageRequest {
	ImageRequest {
		job_name: "detect-ships".to_string(),
		job_id: "job-0001".to_string(),
		image_urls: vec![IMAGE_URI.to_string()],
		outputs: vec![OutputDescriptor::S3 {
			bucket: "results".to_string(),
			prefix: "detections".to_string(),
		}],
		image_processor: ModelEndpoint {
			name: "http://models.local/ship-detector".to_string(),
			kind: EndpointKind::Http,
		},
		image_processor_tile_size: tile_size,
		image_processor_tile_overlap: tile_overlap,
		image_processor_tile_format: TileFormat::PNG,
		image_processor_tile_compression: TileCompression::None,
		region_size: None,
		feature_distillation: None,
	}
}

pub const IMAGE_URI: &str = "mem://images/scene.tif";
