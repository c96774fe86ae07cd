//! The dependency bundle handed to every workflow.
//!
//! No process-wide singletons: queue clients, the ledger, sinks, the decoder
//! and the model client are passed explicitly, so tests and deployments can
//! swap any collaborator. The configuration is read-only after startup.

use crate::{ImageReader, Ledger, ModelClient, SinkFactory, WorkQueue};
use std::sync::Arc;
use tilesense_core::{MetricsRegistry, WorkerConfig};
use uuid::Uuid;

/// Everything a workflow needs, shared across a worker via `Arc`.
pub struct RunnerContext {
	pub config: WorkerConfig,
	/// Identity of this worker process, recorded in region claims.
	pub worker_id: String,
	pub ledger: Arc<dyn Ledger>,
	pub image_queue: Arc<dyn WorkQueue>,
	pub region_queue: Arc<dyn WorkQueue>,
	pub reader: Arc<dyn ImageReader>,
	pub model: Arc<dyn ModelClient>,
	pub sinks: Arc<dyn SinkFactory>,
	pub metrics: Arc<MetricsRegistry>,
}

impl RunnerContext {
	/// Bundles the collaborators under a fresh worker identity.
	#[allow(clippy::too_many_arguments)]
	#[must_use]
	pub fn new(
		config: WorkerConfig,
		ledger: Arc<dyn Ledger>,
		image_queue: Arc<dyn WorkQueue>,
		region_queue: Arc<dyn WorkQueue>,
		reader: Arc<dyn ImageReader>,
		model: Arc<dyn ModelClient>,
		sinks: Arc<dyn SinkFactory>,
	) -> Self {
		let metrics = Arc::new(MetricsRegistry::new(&config.metrics_namespace));
		Self {
			config,
			worker_id: format!("worker-{}", Uuid::new_v4()),
			ledger,
			image_queue,
			region_queue,
			reader,
			model,
			sinks,
			metrics,
		}
	}
}
