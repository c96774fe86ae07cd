//! In-memory [`Ledger`] used by tests and single-host deployments.
//!
//! Conditional semantics match a remote conditional-write store: every
//! operation is atomic per key, predicates are evaluated under the store
//! lock, and versions bump on every successful write.

use super::{
	JobCreate, JobMutation, JobPredicate, JobRecord, JobUpdate, Ledger, RegionClaim, RegionRecord, RegionResolution,
	RegionStatus,
};
use crate::clock::now_epoch_ms;
use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
	jobs: HashMap<String, JobRecord>,
	regions: HashMap<(String, String), RegionRecord>,
}

/// A [`Ledger`] backed by process memory.
#[derive(Default)]
pub struct MemoryLedger {
	inner: Mutex<Inner>,
}

impl MemoryLedger {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// All region records of a job, for assertions in tests.
	#[must_use]
	pub fn regions_of_job(&self, job_id: &str) -> Vec<RegionRecord> {
		let inner = self.inner.lock();
		let mut records: Vec<RegionRecord> = inner
			.regions
			.values()
			.filter(|record| record.job_id == job_id)
			.cloned()
			.collect();
		records.sort_by(|a, b| a.region_id.cmp(&b.region_id));
		records
	}
}

#[async_trait]
impl Ledger for MemoryLedger {
	async fn create_job_if_absent(&self, record: JobRecord) -> Result<JobCreate> {
		let mut inner = self.inner.lock();
		if let Some(existing) = inner.jobs.get(&record.job_id) {
			return Ok(JobCreate::Exists(existing.clone()));
		}
		inner.jobs.insert(record.job_id.clone(), record.clone());
		Ok(JobCreate::Created(record))
	}

	async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
		Ok(self.inner.lock().jobs.get(job_id).cloned())
	}

	async fn update_job_if(&self, job_id: &str, predicate: JobPredicate, mutation: JobMutation) -> Result<JobUpdate> {
		let mut inner = self.inner.lock();
		let Some(record) = inner.jobs.get_mut(job_id) else {
			return Ok(JobUpdate::Missing);
		};
		if !predicate(record) {
			return Ok(JobUpdate::Unchanged(record.clone()));
		}
		mutation(record);
		record.version += 1;
		Ok(JobUpdate::Updated(record.clone()))
	}

	async fn claim_region(&self, record: RegionRecord) -> Result<RegionClaim> {
		let mut inner = self.inner.lock();
		let key = (record.job_id.clone(), record.region_id.clone());

		match inner.regions.get_mut(&key) {
			None => {
				inner.regions.insert(key, record.clone());
				Ok(RegionClaim::Claimed(record))
			}
			Some(existing) if existing.status.is_resolved() => Ok(RegionClaim::AlreadyResolved(existing.clone())),
			Some(existing) if existing.claim_is_live(now_epoch_ms()) => {
				Ok(RegionClaim::HeldByLiveWorker(existing.clone()))
			}
			Some(existing) => {
				// Expired claim: take it over.
				existing.status = RegionStatus::Claimed;
				existing.worker_id = record.worker_id;
				existing.claim_expires = record.claim_expires;
				existing.attempts += 1;
				existing.version += 1;
				Ok(RegionClaim::Claimed(existing.clone()))
			}
		}
	}

	async fn get_region(&self, job_id: &str, region_id: &str) -> Result<Option<RegionRecord>> {
		Ok(
			self
				.inner
				.lock()
				.regions
				.get(&(job_id.to_string(), region_id.to_string()))
				.cloned(),
		)
	}

	async fn resolve_region(
		&self,
		job_id: &str,
		region_id: &str,
		status: RegionStatus,
		feature_count: u64,
	) -> Result<RegionResolution> {
		let mut inner = self.inner.lock();
		let key = (job_id.to_string(), region_id.to_string());

		// Refuse before touching the region, so a missing job leaves the
		// region claim intact for redelivery.
		if !inner.jobs.contains_key(job_id) {
			bail!("job '{job_id}' is missing from the ledger");
		}

		let already_resolved = match inner.regions.get_mut(&key) {
			Some(region) if region.status.is_resolved() => true,
			Some(region) => {
				region.status = status;
				region.feature_count = feature_count;
				region.version += 1;
				false
			}
			None => {
				// Dead-letter path: the region may never have been claimed.
				let mut region = RegionRecord::new_claim(job_id, region_id, "unclaimed", 0);
				region.status = status;
				region.feature_count = feature_count;
				inner.regions.insert(key, region);
				false
			}
		};

		let Some(job) = inner.jobs.get_mut(job_id) else {
			bail!("job '{job_id}' is missing from the ledger");
		};

		if already_resolved {
			return Ok(RegionResolution::AlreadyResolved(job.clone()));
		}

		// The counted transition: increment, and close the job when this
		// increment resolves the last outstanding region.
		if !job.status.is_terminal() && job.regions_resolved() < job.region_count {
			match status {
				RegionStatus::Done => job.region_success += 1,
				_ => job.region_error += 1,
			}
			if job.regions_resolved() == job.region_count {
				job.status = job.terminal_status();
				job.end_time = Some(now_epoch_ms());
			}
			job.version += 1;
		}
		Ok(RegionResolution::Counted(job.clone()))
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{JobStart, JobStatus, request::tests::test_request};
	use pretty_assertions::assert_eq;

	fn new_job() -> JobRecord {
		JobRecord::new(test_request())
	}

	#[tokio::test]
	async fn start_job_transitions_new_to_in_progress_once() -> Result<()> {
		let ledger = MemoryLedger::new();

		let JobStart::Started(record) = ledger.start_job(new_job()).await? else {
			panic!("expected fresh start");
		};
		assert_eq!(record.status, JobStatus::InProgress);

		// A duplicate delivery of an in-flight job resumes it.
		let JobStart::Resumed(record) = ledger.start_job(new_job()).await? else {
			panic!("expected resume");
		};
		assert_eq!(record.status, JobStatus::InProgress);
		Ok(())
	}

	#[tokio::test]
	async fn start_job_skips_terminal_jobs() -> Result<()> {
		let ledger = MemoryLedger::new();
		ledger.start_job(new_job()).await?;
		ledger.mark_job_failed("job-0001").await?;

		let JobStart::AlreadyTerminal(record) = ledger.start_job(new_job()).await? else {
			panic!("expected terminal skip");
		};
		assert_eq!(record.status, JobStatus::Failed);
		Ok(())
	}

	#[tokio::test]
	async fn update_job_if_respects_predicate() -> Result<()> {
		let ledger = MemoryLedger::new();
		ledger.start_job(new_job()).await?;

		let update = ledger.set_region_count("job-0001", 9).await?;
		assert!(matches!(update, JobUpdate::Updated(ref job) if job.region_count == 9));

		// Re-planning with the same count is idempotent.
		let update = ledger.set_region_count("job-0001", 9).await?;
		assert!(matches!(update, JobUpdate::Updated(ref job) if job.region_count == 9));

		// A conflicting count is rejected.
		let update = ledger.set_region_count("job-0001", 4).await?;
		assert!(matches!(update, JobUpdate::Unchanged(ref job) if job.region_count == 9));

		assert_eq!(ledger.set_region_count("missing", 1).await?, JobUpdate::Missing);
		Ok(())
	}

	#[tokio::test]
	async fn claim_region_is_conditional() -> Result<()> {
		let ledger = MemoryLedger::new();

		let claim = RegionRecord::new_claim("job", "region-a", "worker-1", 60_000);
		assert!(matches!(ledger.claim_region(claim.clone()).await?, RegionClaim::Claimed(_)));

		// A second worker is refused while the claim is live.
		let other = RegionRecord::new_claim("job", "region-a", "worker-2", 60_000);
		assert!(matches!(
			ledger.claim_region(other.clone()).await?,
			RegionClaim::HeldByLiveWorker(ref held) if held.worker_id == "worker-1"
		));

		// An expired claim is taken over with an incremented attempt count.
		let expired = RegionRecord::new_claim("job", "region-b", "worker-1", 0);
		ledger.claim_region(expired).await?;
		let takeover = RegionRecord::new_claim("job", "region-b", "worker-2", 60_000);
		let RegionClaim::Claimed(record) = ledger.claim_region(takeover).await? else {
			panic!("expected takeover of expired claim");
		};
		assert_eq!(record.worker_id, "worker-2");
		assert_eq!(record.attempts, 2);
		Ok(())
	}

	#[tokio::test]
	async fn resolve_region_counts_exactly_once() -> Result<()> {
		let ledger = MemoryLedger::new();
		ledger.start_job(new_job()).await?;
		ledger.set_region_count("job-0001", 2).await?;

		for region_id in ["region-a", "region-b"] {
			let claim = RegionRecord::new_claim("job-0001", region_id, "worker-1", 60_000);
			ledger.claim_region(claim).await?;
		}

		let RegionResolution::Counted(job) = ledger
			.resolve_region("job-0001", "region-a", RegionStatus::Done, 3)
			.await?
		else {
			panic!("expected counted resolution");
		};
		assert_eq!(job.region_success, 1);
		assert!(!job.status.is_terminal());

		// Redelivered completion does not double count.
		let RegionResolution::AlreadyResolved(job) = ledger
			.resolve_region("job-0001", "region-a", RegionStatus::Done, 3)
			.await?
		else {
			panic!("expected already-resolved");
		};
		assert_eq!(job.region_success, 1);

		// A resolved region cannot be re-claimed.
		let reclaim = RegionRecord::new_claim("job-0001", "region-a", "worker-2", 60_000);
		assert!(matches!(
			ledger.claim_region(reclaim).await?,
			RegionClaim::AlreadyResolved(_)
		));

		// The last region closes the job; this call observes the transition.
		let RegionResolution::Counted(job) = ledger
			.resolve_region("job-0001", "region-b", RegionStatus::Error, 0)
			.await?
		else {
			panic!("expected counted resolution");
		};
		assert_eq!(job.status, JobStatus::Partial);
		assert_eq!(job.regions_resolved(), job.region_count);
		assert!(job.end_time.is_some());
		Ok(())
	}

	#[tokio::test]
	async fn counters_never_exceed_region_count() -> Result<()> {
		let ledger = MemoryLedger::new();
		ledger.start_job(new_job()).await?;
		ledger.set_region_count("job-0001", 1).await?;

		ledger
			.resolve_region("job-0001", "region-a", RegionStatus::Done, 1)
			.await?;
		// A stray extra region cannot push the counters past the total.
		ledger
			.resolve_region("job-0001", "region-zz", RegionStatus::Done, 1)
			.await?;

		let job = ledger.get_job("job-0001").await?.unwrap();
		assert_eq!(job.regions_resolved(), 1);
		assert_eq!(job.status, JobStatus::Success);
		Ok(())
	}
}
