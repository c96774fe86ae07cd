//! Process-local metrics, keyed by `(Operation, model name, input format)`.
//!
//! The registry is the in-process side of the metrics contract: workflows
//! increment counters and record durations here, and an external transport
//! (out of scope) periodically drains [`MetricsRegistry::snapshot`]. Tests
//! read the same snapshots to assert on throttle/retry/error behavior.

mod registry;
pub use registry::*;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The orchestration operations that emit metrics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
	ImageProcessing,
	RegionProcessing,
	TileGeneration,
	TileProcessing,
	ModelInvocation,
}

impl Display for Operation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Operation::ImageProcessing => "ImageProcessing",
			Operation::RegionProcessing => "RegionProcessing",
			Operation::TileGeneration => "TileGeneration",
			Operation::TileProcessing => "TileProcessing",
			Operation::ModelInvocation => "ModelInvocation",
		})
	}
}
