//! Output sinks for aggregated features.
//!
//! A job writes its features to every sink named in the request's `outputs`.
//! Appends are keyed by region id so redelivered regions overwrite rather
//! than duplicate; the worker that closes the job calls `finalize`, which
//! assembles the job-level artifact (one GeoJSON document for object stores,
//! a final flush for streaming sinks) and returns a sink pointer recorded in
//! the job ledger.

mod memory;
pub use memory::*;

use crate::OutputDescriptor;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tilesense_geometry::Feature;

/// One output destination of a job.
#[async_trait]
pub trait FeatureSink: Send + Sync {
	/// Appends the features of one region. Idempotent per `(job, region)`:
	/// a redelivered region replaces its earlier append where the sink can
	/// express that, and downstream consumers dedupe by region id otherwise.
	async fn append(&self, job_id: &str, region_id: &str, features: &[Feature]) -> Result<()>;

	/// Completes the job artifact and returns its pointer, if the sink
	/// produces one.
	async fn finalize(&self, job_id: &str) -> Result<Option<String>>;
}

/// Resolves the `outputs` of a request into live sinks.
///
/// The object store and streaming bus are external collaborators; deployments
/// plug their transports in here. The in-memory factory backs tests and
/// single-host runs.
pub trait SinkFactory: Send + Sync {
	fn open_sinks(&self, outputs: &[OutputDescriptor]) -> Result<Vec<Arc<dyn FeatureSink>>>;
}
