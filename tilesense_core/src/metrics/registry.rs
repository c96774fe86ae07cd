use super::Operation;
use dashmap::DashMap;
use log::info;
use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

/// Dimension tuple under which counters are aggregated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricScope {
	pub operation: Operation,
	pub model_name: String,
	pub input_format: String,
}

impl MetricScope {
	pub fn new(operation: Operation, model_name: &str, input_format: &str) -> Self {
		Self {
			operation,
			model_name: model_name.to_string(),
			input_format: input_format.to_string(),
		}
	}
}

/// Counters for one [`MetricScope`]. All methods are lock-free.
#[derive(Debug, Default)]
pub struct OperationMetrics {
	invocations: AtomicU64,
	errors: AtomicU64,
	throttles: AtomicU64,
	retries: AtomicU64,
	duration_ms: AtomicU64,
	samples: AtomicU64,
}

impl OperationMetrics {
	pub fn inc_invocations(&self) {
		self.invocations.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_errors(&self) {
		self.errors.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_throttles(&self) {
		self.throttles.fetch_add(1, Ordering::Relaxed);
	}
	pub fn inc_retries(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	/// Adds one duration sample.
	pub fn observe_duration(&self, duration: Duration) {
		self.duration_ms.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
		self.samples.fetch_add(1, Ordering::Relaxed);
	}

	/// A point-in-time copy of the counters.
	#[must_use]
	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			invocations: self.invocations.load(Ordering::Relaxed),
			errors: self.errors.load(Ordering::Relaxed),
			throttles: self.throttles.load(Ordering::Relaxed),
			retries: self.retries.load(Ordering::Relaxed),
			duration_ms: self.duration_ms.load(Ordering::Relaxed),
			samples: self.samples.load(Ordering::Relaxed),
		}
	}
}

/// Frozen counter values of one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
	pub invocations: u64,
	pub errors: u64,
	pub throttles: u64,
	pub retries: u64,
	pub duration_ms: u64,
	pub samples: u64,
}

/// Process-wide registry of [`OperationMetrics`], shared via `Arc`.
#[derive(Debug)]
pub struct MetricsRegistry {
	namespace: String,
	scopes: DashMap<MetricScope, Arc<OperationMetrics>>,
}

impl MetricsRegistry {
	#[must_use]
	pub fn new(namespace: &str) -> Self {
		Self {
			namespace: namespace.to_string(),
			scopes: DashMap::new(),
		}
	}

	#[must_use]
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Returns the counters for a scope, creating them on first use.
	pub fn scope(&self, operation: Operation, model_name: &str, input_format: &str) -> Arc<OperationMetrics> {
		self
			.scopes
			.entry(MetricScope::new(operation, model_name, input_format))
			.or_default()
			.clone()
	}

	/// Snapshot of all scopes, sorted for deterministic output.
	#[must_use]
	pub fn snapshot(&self) -> Vec<(MetricScope, MetricsSnapshot)> {
		let mut entries: Vec<(MetricScope, MetricsSnapshot)> = self
			.scopes
			.iter()
			.map(|entry| (entry.key().clone(), entry.value().snapshot()))
			.collect();
		entries.sort_by(|a, b| a.0.cmp(&b.0));
		entries
	}

	/// Logs one line per scope at info level.
	pub fn log_snapshot(&self) {
		for (scope, values) in self.snapshot() {
			info!(
				"{}: operation={} model={} format={} invocations={} errors={} throttles={} retries={} duration_ms={} samples={}",
				self.namespace,
				scope.operation,
				scope.model_name,
				scope.input_format,
				values.invocations,
				values.errors,
				values.throttles,
				values.retries,
				values.duration_ms,
				values.samples
			);
		}
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
