//! Concurrency limit tuning for I/O-heavy fan-out.
//!
//! Remote calls (queue sends, ledger writes, sink appends) spend most of
//! their time waiting and benefit from parallelism well above the CPU count;
//! CPU work (tiling math, feature distillation) does not.

use num_cpus;

/// Concurrency limits for different workload types.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyLimits {
	/// Concurrency for I/O-bound operations (queue sends, ledger writes).
	pub io_bound: usize,
	/// Concurrency for CPU-bound operations.
	pub cpu_bound: usize,
}

impl ConcurrencyLimits {
	/// Create concurrency limits with custom values, clamped to at least 1.
	pub fn new(io_bound: usize, cpu_bound: usize) -> Self {
		Self {
			io_bound: io_bound.max(1),
			cpu_bound: cpu_bound.max(1),
		}
	}
}

impl Default for ConcurrencyLimits {
	/// I/O-bound: 3x CPU count; CPU-bound: 1x CPU count.
	fn default() -> Self {
		let cpus = num_cpus::get();
		Self {
			io_bound: cpus * 3,
			cpu_bound: cpus,
		}
	}
}
