//! The image workflow: validate, create the job, plan regions, fan out.
//!
//! The worker that dequeues an image request owns planning only: it splits
//! the image into regions, records the region count, enqueues the peer
//! regions and processes region 0 locally. It does **not** wait for peers —
//! whichever worker resolves the last region finalizes the job.

use crate::{
	ImageRequest, JobRecord, JobStart, JobUpdate, RegionOutcome, RunnerContext, process_region, region_id,
};
use anyhow::{Result, bail};
use futures::{StreamExt, TryStreamExt, stream};
use log::{debug, info};
use std::time::Instant;
use tilesense_core::{ConcurrencyLimits, Operation, PixelRect};
use tilesense_derive::context;

/// Result of processing one image request.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageOutcome {
	/// Planning succeeded; region 0 was processed locally.
	Planned {
		job: JobRecord,
		regions_planned: u64,
		regions_enqueued: u64,
		local: RegionOutcome,
	},
	/// Duplicate delivery of a finished job; a no-op.
	AlreadyTerminal(JobRecord),
}

/// Processes one image request end to end (validation through fan-out).
#[context("processing image request '{}'", request.job_id)]
pub async fn process_image(ctx: &RunnerContext, request: &ImageRequest) -> Result<ImageOutcome> {
	let scope = ctx.metrics.scope(
		Operation::ImageProcessing,
		&request.image_processor.name,
		&request.image_processor_tile_format.to_string(),
	);
	let started = Instant::now();

	// 1. Validate. Violations are permanent; the caller marks the job FAILED
	// and acks the message.
	request.validate()?;

	// 2. Create the job record (NEW → IN_PROGRESS, exactly once).
	let job = match ctx.ledger.start_job(JobRecord::new(request.clone())).await? {
		JobStart::Started(job) => job,
		JobStart::Resumed(job) => {
			// Redelivery of an in-flight job: planning below is idempotent
			// (same region list, claims prevent double processing).
			debug!("resuming planning of job '{}'", job.job_id);
			job
		}
		JobStart::AlreadyTerminal(job) => {
			info!("job '{}' already finished as {}, skipping", job.job_id, job.status);
			return Ok(ImageOutcome::AlreadyTerminal(job));
		}
	};
	scope.inc_invocations();

	// 3. Open the image.
	let source = ctx.reader.open(request.primary_image_url()).await?;
	let metadata = source.metadata().clone();
	drop(source);

	// 4. Plan regions and record the count.
	let region_size = request.region_size.unwrap_or(ctx.config.region_size);
	let full_rect = metadata
		.full_rect()
		.map_err(|e| crate::ClassifiedError::wrap(crate::ErrorClass::Decode, e))?;
	let regions = full_rect.split_grid(region_size);
	let regions_planned = regions.len() as u64;

	match ctx.ledger.set_region_count(&request.job_id, regions_planned).await? {
		JobUpdate::Updated(_) => {}
		JobUpdate::Unchanged(job) => bail!(
			"job '{}' already has {} planned regions, conflicting with {regions_planned}",
			job.job_id,
			job.region_count
		),
		JobUpdate::Missing => bail!("job '{}' vanished from the ledger", request.job_id),
	}
	info!(
		"planned {} regions of at most {region_size}px for job '{}' ({}x{})",
		regions_planned, request.job_id, metadata.width, metadata.height
	);

	// 5. Enqueue peer regions first, so other workers start while region 0
	// runs locally.
	let peers: Vec<PixelRect> = regions[1..].to_vec();
	let regions_enqueued = peers.len() as u64;
	let limits = ConcurrencyLimits::default();
	stream::iter(peers)
		.map(|region| {
			let message = serde_json::to_string(&request.region_request(region))?;
			Ok::<_, anyhow::Error>((region, message))
		})
		.try_for_each_concurrent(limits.io_bound, |(region, message)| async move {
			debug!("enqueueing region '{}'", region_id(&region));
			ctx.region_queue.send(message).await
		})
		.await?;

	// 6. Process region 0 locally; do not wait for peers.
	let local = process_region(ctx, &request.region_request(regions[0])).await?;

	scope.observe_duration(started.elapsed());
	let job = ctx.ledger.get_job(&job.job_id).await?.unwrap_or(job);
	Ok(ImageOutcome::Planned {
		job,
		regions_planned,
		regions_enqueued,
		local,
	})
}

/// Records a permanent image failure: ensures a job record exists and marks
/// it FAILED, without disturbing an already-terminal record.
#[context("marking job '{}' as failed", request.job_id)]
pub async fn mark_image_failed(ctx: &RunnerContext, request: &ImageRequest) -> Result<()> {
	let mut record = JobRecord::new(request.clone());
	record.status = crate::JobStatus::InProgress;
	ctx.ledger.create_job_if_absent(record).await?;
	ctx.ledger.mark_job_failed(&request.job_id).await?;
	ctx
		.metrics
		.scope(
			Operation::ImageProcessing,
			&request.image_processor.name,
			&request.image_processor_tile_format.to_string(),
		)
		.inc_errors();
	Ok(())
}
