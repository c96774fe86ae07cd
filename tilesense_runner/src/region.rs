//! The region workflow: CLAIMED → TILING → DISPATCHING → AGGREGATING →
//! {DONE, ERROR}.
//!
//! A region is processed entirely within one worker: claim it in the ledger,
//! enumerate its tiles, dispatch them to the model with bounded parallelism,
//! lift and buffer the detections, distill the aggregate, persist it, and
//! count the region into the job record. The worker whose count closes the
//! job performs finalization.

use crate::{
	FeatureLifter, JobRecord, RegionClaim, RegionRecord, RegionRequest, RegionResolution, RegionStatus, RunnerContext,
	sensor_from_metadata,
};
use anyhow::Result;
use futures::{StreamExt, stream};
use log::{info, warn};
use std::time::Instant;
use tilesense_core::{Operation, TileGrid};
use tilesense_derive::context;
use tilesense_geometry::{Feature, distill_features};

/// Result of processing one region request.
#[derive(Clone, Debug, PartialEq)]
pub enum RegionOutcome {
	/// This worker resolved the region.
	Processed {
		status: RegionStatus,
		features_emitted: u64,
		/// Job record after the counting update.
		job: JobRecord,
	},
	/// The region was already resolved or is held by a live worker.
	Skipped,
}

/// Processes one region request end to end.
#[context("processing region '{}' of job '{}'", request.region_id(), request.job_id)]
pub async fn process_region(ctx: &RunnerContext, request: &RegionRequest) -> Result<RegionOutcome> {
	let region_id = request.region_id();
	let scope = ctx.metrics.scope(
		Operation::RegionProcessing,
		&request.image_processor.name,
		&request.tile_format.to_string(),
	);
	let started = Instant::now();

	// Claim. Conditional-put: resolved regions and live claims are skipped.
	let claim = RegionRecord::new_claim(
		&request.job_id,
		&region_id,
		&ctx.worker_id,
		ctx.config.visibility_timeout.as_millis() as u64,
	);
	match ctx.ledger.claim_region(claim).await? {
		RegionClaim::Claimed(_) => {}
		RegionClaim::AlreadyResolved(record) => {
			info!("region '{region_id}' already resolved as {}, skipping", record.status);
			return Ok(RegionOutcome::Skipped);
		}
		RegionClaim::HeldByLiveWorker(record) => {
			info!("region '{region_id}' is held by '{}', skipping", record.worker_id);
			return Ok(RegionOutcome::Skipped);
		}
	}
	scope.inc_invocations();

	// Open the image; any worker can, the request is self-contained.
	let source = ctx.reader.open(&request.image_url).await?;
	let metadata = source.metadata().clone();
	let sensor = sensor_from_metadata(&metadata);
	let lifter = FeatureLifter::new(
		&request.job_id,
		&request.image_url,
		request.tile_format,
		&metadata,
		sensor,
	);

	// Tile.
	let tiling_started = Instant::now();
	let grid = TileGrid::new(request.region, request.tile_size, request.tile_overlap)?;
	let descriptors: Vec<_> = grid
		.iter_descriptors(request.tile_format, request.tile_compression)
		.collect();
	let tile_count = descriptors.len() as u64;
	let tile_scope = ctx.metrics.scope(
		Operation::TileGeneration,
		&request.image_processor.name,
		&request.tile_format.to_string(),
	);
	tile_scope.inc_invocations();
	tile_scope.observe_duration(tiling_started.elapsed());

	// Dispatch: bounded fan-out; response order does not matter.
	let source_ref = source.as_ref();
	let lifter_ref = &lifter;
	let results: Vec<Result<Vec<Feature>>> = stream::iter(descriptors)
		.map(|tile| async move {
			let processing = ctx.metrics.scope(
				Operation::TileProcessing,
				&request.image_processor.name,
				&tile.format.to_string(),
			);
			processing.inc_invocations();
			let tile_started = Instant::now();

			let pixels = source_ref.read_region(&tile.rect).await?;
			let response = ctx.model.invoke(&request.image_processor, &tile, &pixels).await?;
			let lifted = lifter_ref.lift_tile_features(response.features, &tile.rect);

			processing.observe_duration(tile_started.elapsed());
			Ok(lifted)
		})
		.buffer_unordered(ctx.config.tile_workers)
		.collect()
		.await;

	let mut buffered: Vec<Feature> = Vec::new();
	let mut tile_errors = 0u64;
	for result in results {
		match result {
			Ok(features) => buffered.extend(features),
			Err(error) => {
				// Tile errors never fail the region on their own.
				tile_errors += 1;
				ctx
					.metrics
					.scope(
						Operation::TileProcessing,
						&request.image_processor.name,
						&request.tile_format.to_string(),
					)
					.inc_errors();
				warn!("dropping tile of region '{region_id}': {error:#}");
			}
		}
	}

	// Aggregate.
	let mode = request.distillation_mode(&ctx.config.default_distillation)?;
	let features = distill_features(buffered, &mode);

	let error_rate = if tile_count == 0 {
		0.0
	} else {
		tile_errors as f64 / tile_count as f64
	};
	let status = if error_rate > ctx.config.region_error_threshold {
		RegionStatus::Error
	} else {
		RegionStatus::Done
	};

	// Persist features before counting the region, so a crash in between
	// redelivers the region rather than losing output.
	let sinks = ctx.sinks.open_sinks(&request.outputs)?;
	if status == RegionStatus::Done {
		for sink in &sinks {
			sink.append(&request.job_id, &region_id, &features).await?;
		}
	}

	let features_emitted = if status == RegionStatus::Done {
		features.len() as u64
	} else {
		0
	};
	if status == RegionStatus::Error {
		scope.inc_errors();
		warn!(
			"region '{region_id}' failed: {tile_errors}/{tile_count} tiles dropped (threshold {})",
			ctx.config.region_error_threshold
		);
	}

	let resolution = ctx
		.ledger
		.resolve_region(&request.job_id, &region_id, status, features_emitted)
		.await?;
	scope.observe_duration(started.elapsed());

	let job = match resolution {
		RegionResolution::Counted(job) => {
			if job.status.is_terminal() {
				// This increment closed the job: flush the sinks and emit the
				// per-job completion log exactly once.
				finalize_job(ctx, &job).await?;
			}
			job
		}
		RegionResolution::AlreadyResolved(job) => job,
	};

	Ok(RegionOutcome::Processed {
		status,
		features_emitted,
		job,
	})
}

/// Sink flushes and the user-visible completion log, run by the worker that
/// performed the terminal ledger transition.
#[context("finalizing job '{}'", job.job_id)]
async fn finalize_job(ctx: &RunnerContext, job: &JobRecord) -> Result<()> {
	let sinks = ctx.sinks.open_sinks(&job.request.outputs)?;
	let mut locations = Vec::new();
	for sink in &sinks {
		if let Some(location) = sink.finalize(&job.job_id).await? {
			locations.push(location);
		}
	}
	ctx.ledger.record_output_locations(&job.job_id, locations).await?;

	info!(
		"job complete: job_id={} image_url={} model_name={} status={} region_success={}/{} region_error={} start_time={} end_time={}",
		job.job_id,
		job.image_url(),
		job.model_name(),
		job.status,
		job.region_success,
		job.region_count,
		job.region_error,
		job.start_time,
		job.end_time.unwrap_or(0),
	);
	Ok(())
}
