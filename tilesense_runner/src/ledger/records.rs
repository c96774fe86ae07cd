//! Durable job and region records.
//!
//! Records are only ever modified through conditional writes in the
//! [`Ledger`](super::Ledger); the `version` field backs optimistic
//! concurrency in store implementations.

use crate::{ImageRequest, clock::now_epoch_ms};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Lifecycle of a job. Transitions form a DAG with no regressions:
/// NEW → IN_PROGRESS → {SUCCESS, PARTIAL, FAILED}.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
	New,
	InProgress,
	Success,
	Partial,
	Failed,
}

impl JobStatus {
	/// Terminal states are written at most once.
	#[must_use]
	pub fn is_terminal(&self) -> bool {
		matches!(self, JobStatus::Success | JobStatus::Partial | JobStatus::Failed)
	}
}

impl Display for JobStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			JobStatus::New => "NEW",
			JobStatus::InProgress => "IN_PROGRESS",
			JobStatus::Success => "SUCCESS",
			JobStatus::Partial => "PARTIAL",
			JobStatus::Failed => "FAILED",
		})
	}
}

/// The per-image job record, keyed by job id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
	pub job_id: String,
	pub status: JobStatus,
	pub region_count: u64,
	pub region_success: u64,
	pub region_error: u64,
	/// Epoch milliseconds.
	pub start_time: u64,
	/// Epoch milliseconds, set with the terminal transition.
	pub end_time: Option<u64>,
	/// Echo of the request the job was created from.
	pub request: ImageRequest,
	/// Sink pointers recorded at finalization.
	pub output_locations: Vec<String>,
	/// Optimistic-concurrency version, bumped on every update.
	pub version: u64,
}

impl JobRecord {
	/// A fresh NEW record for a request.
	#[must_use]
	pub fn new(request: ImageRequest) -> Self {
		Self {
			job_id: request.job_id.clone(),
			status: JobStatus::New,
			region_count: 0,
			region_success: 0,
			region_error: 0,
			start_time: now_epoch_ms(),
			end_time: None,
			request,
			output_locations: Vec::new(),
			version: 0,
		}
	}

	/// The primary image of the job.
	#[must_use]
	pub fn image_url(&self) -> &str {
		self.request.primary_image_url()
	}

	/// The model the job runs against.
	#[must_use]
	pub fn model_name(&self) -> &str {
		&self.request.image_processor.name
	}

	/// The terminal status implied by the region counters: SUCCESS if every
	/// region succeeded, FAILED if none did, PARTIAL otherwise.
	#[must_use]
	pub fn terminal_status(&self) -> JobStatus {
		if self.region_error == 0 {
			JobStatus::Success
		} else if self.region_success == 0 {
			JobStatus::Failed
		} else {
			JobStatus::Partial
		}
	}

	/// `region_success + region_error`, never exceeding `region_count`.
	#[must_use]
	pub fn regions_resolved(&self) -> u64 {
		self.region_success + self.region_error
	}
}

/// Lifecycle of a region within a job.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionStatus {
	Claimed,
	Done,
	Error,
}

impl RegionStatus {
	#[must_use]
	pub fn is_resolved(&self) -> bool {
		matches!(self, RegionStatus::Done | RegionStatus::Error)
	}
}

impl Display for RegionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			RegionStatus::Claimed => "CLAIMED",
			RegionStatus::Done => "DONE",
			RegionStatus::Error => "ERROR",
		})
	}
}

/// The per-region record, keyed by `(job_id, region_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
	pub job_id: String,
	pub region_id: String,
	pub status: RegionStatus,
	/// Worker currently or last holding the claim.
	pub worker_id: String,
	/// Number of times the region has been claimed.
	pub attempts: u32,
	/// Features emitted by the region, recorded on DONE.
	pub feature_count: u64,
	/// Epoch milliseconds after which a CLAIMED record may be taken over.
	pub claim_expires: u64,
	/// Optimistic-concurrency version, bumped on every update.
	pub version: u64,
}

impl RegionRecord {
	/// A fresh claim attempt by `worker_id`, expiring after `claim_ms`.
	#[must_use]
	pub fn new_claim(job_id: &str, region_id: &str, worker_id: &str, claim_ms: u64) -> Self {
		Self {
			job_id: job_id.to_string(),
			region_id: region_id.to_string(),
			status: RegionStatus::Claimed,
			worker_id: worker_id.to_string(),
			attempts: 1,
			feature_count: 0,
			claim_expires: now_epoch_ms() + claim_ms,
			version: 0,
		}
	}

	/// A CLAIMED record is live while its expiry is in the future.
	#[must_use]
	pub fn claim_is_live(&self, now_ms: u64) -> bool {
		self.status == RegionStatus::Claimed && self.claim_expires > now_ms
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::request::tests::test_request;

	#[test]
	fn job_record_derives_fields_from_request() {
		let record = JobRecord::new(test_request());
		assert_eq!(record.job_id, "job-0001");
		assert_eq!(record.status, JobStatus::New);
		assert_eq!(record.image_url(), "mem://images/harbor.tif");
		assert_eq!(record.model_name(), "http://models.local/ship-detector");
		assert!(record.start_time > 0);
	}

	#[test]
	fn terminal_status_from_counters() {
		let mut record = JobRecord::new(test_request());
		record.region_count = 4;
		record.region_success = 4;
		assert_eq!(record.terminal_status(), JobStatus::Success);

		record.region_success = 2;
		record.region_error = 2;
		assert_eq!(record.terminal_status(), JobStatus::Partial);

		record.region_success = 0;
		record.region_error = 4;
		assert_eq!(record.terminal_status(), JobStatus::Failed);
	}

	#[test]
	fn status_wire_names() {
		assert_eq!(serde_json::to_string(&JobStatus::InProgress).unwrap(), "\"IN_PROGRESS\"");
		assert_eq!(serde_json::to_string(&RegionStatus::Claimed).unwrap(), "\"CLAIMED\"");
		assert!(JobStatus::Partial.is_terminal());
		assert!(!JobStatus::New.is_terminal());
	}

	#[test]
	fn claim_liveness() {
		let record = RegionRecord::new_claim("job", "region-1", "worker-a", 5_000);
		assert!(record.claim_is_live(now_epoch_ms()));
		assert!(!record.claim_is_live(record.claim_expires + 1));
	}
}
