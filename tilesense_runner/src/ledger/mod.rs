//! The job ledger: the only shared mutable state of the fleet.
//!
//! The ledger is a key-value store with **conditional updates**: predicates
//! are evaluated store-side (optimistic concurrency), never under client
//! locks. It enforces exactly one NEW→IN_PROGRESS transition per image,
//! atomic region counter increments, and exactly one terminal transition —
//! the worker whose increment closes the counters performs finalization.

mod memory;
pub use memory::*;
mod records;
pub use records::*;

use crate::clock::now_epoch_ms;
use anyhow::Result;
use async_trait::async_trait;

/// Store-side predicate of a conditional job update.
pub type JobPredicate = Box<dyn Fn(&JobRecord) -> bool + Send>;
/// Mutation applied when the predicate holds.
pub type JobMutation = Box<dyn FnOnce(&mut JobRecord) + Send>;

/// Outcome of [`Ledger::create_job_if_absent`].
#[derive(Clone, Debug, PartialEq)]
pub enum JobCreate {
	Created(JobRecord),
	Exists(JobRecord),
}

/// Outcome of [`Ledger::update_job_if`].
#[derive(Clone, Debug, PartialEq)]
pub enum JobUpdate {
	/// Predicate held; the returned record is the post-update state.
	Updated(JobRecord),
	/// Predicate failed; the returned record is the untouched state.
	Unchanged(JobRecord),
	/// No record under this key.
	Missing,
}

impl JobUpdate {
	/// The record after the operation, if one exists.
	#[must_use]
	pub fn record(&self) -> Option<&JobRecord> {
		match self {
			JobUpdate::Updated(record) | JobUpdate::Unchanged(record) => Some(record),
			JobUpdate::Missing => None,
		}
	}
}

/// Outcome of [`Ledger::claim_region`].
#[derive(Clone, Debug, PartialEq)]
pub enum RegionClaim {
	/// The claim succeeded; this worker owns the region.
	Claimed(RegionRecord),
	/// The region was already resolved (DONE or ERROR); skip it.
	AlreadyResolved(RegionRecord),
	/// Another worker holds a live claim; skip it.
	HeldByLiveWorker(RegionRecord),
}

/// Outcome of [`Ledger::resolve_region`].
#[derive(Clone, Debug, PartialEq)]
pub enum RegionResolution {
	/// The region transitioned CLAIMED→{DONE, ERROR} and was counted into
	/// the job record, returned post-update. If the returned status is
	/// terminal, **this call** closed the job and the caller finalizes.
	Counted(JobRecord),
	/// The region was resolved earlier; counters unchanged.
	AlreadyResolved(JobRecord),
}

/// Outcome of [`Ledger::start_job`].
#[derive(Clone, Debug, PartialEq)]
pub enum JobStart {
	/// Fresh job, transitioned NEW→IN_PROGRESS by this call.
	Started(JobRecord),
	/// The job exists and is not terminal; planning resumes idempotently.
	Resumed(JobRecord),
	/// The job already reached a terminal status; the message is a duplicate.
	AlreadyTerminal(JobRecord),
}

/// Durable, conditionally-updated job/region store.
#[async_trait]
pub trait Ledger: Send + Sync {
	/// Creates the job record unless one exists under the same key.
	async fn create_job_if_absent(&self, record: JobRecord) -> Result<JobCreate>;

	/// Reads a job record.
	async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>>;

	/// Applies `mutation` iff `predicate` holds, atomically per key.
	async fn update_job_if(&self, job_id: &str, predicate: JobPredicate, mutation: JobMutation) -> Result<JobUpdate>;

	/// Conditional-put of a region claim: succeeds for a fresh region or an
	/// expired/abandoned claim, is rejected while another worker's claim is
	/// live, and is a no-op for resolved regions.
	async fn claim_region(&self, record: RegionRecord) -> Result<RegionClaim>;

	/// Reads a region record.
	async fn get_region(&self, job_id: &str, region_id: &str) -> Result<Option<RegionRecord>>;

	/// Resolves a region to DONE or ERROR and counts it into the job record
	/// exactly once, regardless of redeliveries.
	async fn resolve_region(
		&self,
		job_id: &str,
		region_id: &str,
		status: RegionStatus,
		feature_count: u64,
	) -> Result<RegionResolution>;

	/// Creates the job as NEW and transitions it to IN_PROGRESS, enforcing a
	/// single such transition per image.
	async fn start_job(&self, record: JobRecord) -> Result<JobStart> {
		let existing = match self.create_job_if_absent(record).await? {
			JobCreate::Created(record) => {
				let update = self
					.update_job_if(
						&record.job_id,
						Box::new(|job| job.status == JobStatus::New),
						Box::new(|job| job.status = JobStatus::InProgress),
					)
					.await?;
				if let JobUpdate::Updated(record) = update {
					return Ok(JobStart::Started(record));
				}
				// Someone else moved it first; fall through to the duplicate path.
				self.get_job(&record.job_id).await?.unwrap_or(record)
			}
			JobCreate::Exists(record) => record,
		};

		if existing.status.is_terminal() {
			Ok(JobStart::AlreadyTerminal(existing))
		} else {
			Ok(JobStart::Resumed(existing))
		}
	}

	/// Records the planned region count, tolerating idempotent re-planning
	/// with the same count.
	async fn set_region_count(&self, job_id: &str, region_count: u64) -> Result<JobUpdate> {
		self
			.update_job_if(
				job_id,
				Box::new(move |job| job.region_count == 0 || job.region_count == region_count),
				Box::new(move |job| job.region_count = region_count),
			)
			.await
	}

	/// Marks a job FAILED unless it already reached a terminal status.
	async fn mark_job_failed(&self, job_id: &str) -> Result<JobUpdate> {
		self
			.update_job_if(
				job_id,
				Box::new(|job| !job.status.is_terminal()),
				Box::new(|job| {
					job.status = JobStatus::Failed;
					job.end_time = Some(now_epoch_ms());
				}),
			)
			.await
	}

	/// Records the sink pointers produced at finalization.
	async fn record_output_locations(&self, job_id: &str, locations: Vec<String>) -> Result<JobUpdate> {
		self
			.update_job_if(
				job_id,
				Box::new(|_| true),
				Box::new(move |job| job.output_locations = locations),
			)
			.await
	}
}
