//! The work-queue coordinator.
//!
//! Long-polls the image and region queues with configurable weights and
//! dispatches to the image/region workflows. While a message is in flight a
//! heartbeat task extends its visibility; losing the heartbeat abandons the
//! work so another worker can reclaim it. Permanent failures mark the record
//! FAILED and ack the message; transient ones are redelivered until the
//! max receive count dead-letters them.

use crate::{
	ClassifiedError, ErrorClass, ImageRequest, QueueMessage, RegionRequest, RegionStatus, RunnerContext, WorkQueue,
	classify, mark_image_failed, process_image, process_region,
};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::sync::Notify;

/// How long a single queue poll waits for a message.
const POLL_WAIT: Duration = Duration::from_millis(100);

/// Which queue a message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueKind {
	Image,
	Region,
}

/// A worker process: one poll loop over both queues.
pub struct Worker {
	ctx: Arc<RunnerContext>,
}

impl Worker {
	#[must_use]
	pub fn new(ctx: Arc<RunnerContext>) -> Self {
		Self { ctx }
	}

	/// Polls and processes messages forever.
	pub async fn run(&self) -> Result<()> {
		let mut iteration = 0u64;
		loop {
			self.poll_once(iteration).await?;
			iteration += 1;
		}
	}

	/// Polls and processes messages until both queues stay empty, returning
	/// the number of messages handled. Used by tests and batch runs.
	pub async fn run_until_drained(&self) -> Result<u64> {
		let mut handled = 0u64;
		let mut idle_polls = 0u32;
		let mut iteration = 0u64;
		while idle_polls < 3 {
			if self.poll_once(iteration).await? {
				handled += 1;
				idle_polls = 0;
			} else {
				idle_polls += 1;
			}
			iteration += 1;
		}
		Ok(handled)
	}

	/// One weighted poll across both queues. Returns whether a message was
	/// handled.
	async fn poll_once(&self, iteration: u64) -> Result<bool> {
		// The region queue is polled `region_poll_weight` times as often as
		// the image queue, so fan-out work drains ahead of new intake.
		let weight = u64::from(self.ctx.config.region_poll_weight.max(1));
		let order = if iteration % (weight + 1) == 0 {
			[QueueKind::Image, QueueKind::Region]
		} else {
			[QueueKind::Region, QueueKind::Image]
		};

		for kind in order {
			let queue = self.queue(kind);
			if let Some(message) = queue.receive(POLL_WAIT).await? {
				self.handle_message(kind, &message).await;
				return Ok(true);
			}
		}
		Ok(false)
	}

	fn queue(&self, kind: QueueKind) -> Arc<dyn WorkQueue> {
		match kind {
			QueueKind::Image => self.ctx.image_queue.clone(),
			QueueKind::Region => self.ctx.region_queue.clone(),
		}
	}

	/// Runs one message through its workflow under a visibility heartbeat and
	/// applies the ack/redeliver/dead-letter policy.
	async fn handle_message(&self, kind: QueueKind, message: &QueueMessage) {
		let queue = self.queue(kind);

		// Heartbeat: extend visibility at half the timeout while in flight.
		let lost = Arc::new(Notify::new());
		let heartbeat = {
			let queue = queue.clone();
			let receipt = message.receipt.clone();
			let interval = self.ctx.config.heartbeat_interval();
			let timeout = self.ctx.config.visibility_timeout;
			let lost = lost.clone();
			tokio::spawn(async move {
				loop {
					tokio::time::sleep(interval).await;
					if let Err(error) = queue.extend_visibility(&receipt, timeout).await {
						warn!("heartbeat lost: {error:#}");
						lost.notify_one();
						return;
					}
				}
			})
		};

		let result = tokio::select! {
			result = self.dispatch(kind, &message.body) => result,
			() = lost.notified() => Err(ClassifiedError::new(
				ErrorClass::TransientIo,
				"message visibility lost, abandoning work for reclaim",
			)),
		};
		heartbeat.abort();

		match result {
			Ok(()) => {
				if let Err(error) = queue.ack(&message.receipt).await {
					warn!("failed to ack message '{}': {error:#}", message.id);
				}
			}
			Err(ref failure) if classify(failure).is_permanent() => {
				// Permanent data errors don't benefit from retry: record the
				// failure and take the message out of rotation.
				error!("permanent failure for message '{}': {failure:#}", message.id);
				self.record_failure(kind, &message.body).await;
				if let Err(error) = queue.ack(&message.receipt).await {
					warn!("failed to ack message '{}': {error:#}", message.id);
				}
			}
			Err(failure) if message.receive_count >= self.ctx.config.max_receive_count => {
				error!(
					"dead-lettering message '{}' after {} deliveries: {failure:#}",
					message.id, message.receive_count
				);
				self.record_failure(kind, &message.body).await;
				if let Err(error) = queue.dead_letter(&message.receipt).await {
					warn!("failed to dead-letter message '{}': {error:#}", message.id);
				}
			}
			Err(failure) => {
				// Transient: leave the message to become visible again.
				warn!(
					"transient failure for message '{}' (delivery {}), leaving for redelivery: {failure:#}",
					message.id, message.receive_count
				);
			}
		}
	}

	async fn dispatch(&self, kind: QueueKind, body: &str) -> Result<()> {
		match kind {
			QueueKind::Image => {
				let request =
					ImageRequest::from_json_str(body).map_err(|e| ClassifiedError::wrap(ErrorClass::Validation, e))?;
				let outcome = process_image(&self.ctx, &request).await?;
				debug!("image request done: {outcome:?}");
			}
			QueueKind::Region => {
				let request =
					RegionRequest::from_json_str(body).map_err(|e| ClassifiedError::wrap(ErrorClass::Validation, e))?;
				let outcome = process_region(&self.ctx, &request).await?;
				debug!("region request done: {outcome:?}");
			}
		}
		Ok(())
	}

	/// Marks the ledger record behind a failed message, where the body still
	/// parses well enough to identify it.
	async fn record_failure(&self, kind: QueueKind, body: &str) {
		let result = match kind {
			QueueKind::Image => match ImageRequest::from_json_str(body) {
				Ok(request) => mark_image_failed(&self.ctx, &request).await,
				Err(error) => Err(error),
			},
			QueueKind::Region => match RegionRequest::from_json_str(body) {
				Ok(request) => self
					.ctx
					.ledger
					.resolve_region(&request.job_id, &request.region_id(), RegionStatus::Error, 0)
					.await
					.map(|resolution| {
						if let crate::RegionResolution::Counted(job) = &resolution {
							info!(
								"region of job '{}' marked ERROR after dead-letter ({}/{} resolved)",
								job.job_id,
								job.regions_resolved(),
								job.region_count
							);
						}
					}),
				Err(error) => Err(error),
			},
		};
		if let Err(error) = result {
			warn!("failed to record failure: {error:#}");
		}
	}
}
