//! The work-queue contract.
//!
//! The transport itself (SQS or similar) is an external collaborator; the
//! engine only relies on this narrow contract: long-poll receive, per-message
//! visibility with a single owner at a time, acknowledge, visibility
//! extension (heartbeat) and a dead-letter escape hatch.

mod memory;
pub use memory::*;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// One received queue message. The `receipt` identifies this delivery and is
/// required for ack/extend/dead-letter calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
	/// Stable message id, identical across redeliveries.
	pub id: String,
	/// Delivery handle, unique per receive.
	pub receipt: String,
	/// Message payload.
	pub body: String,
	/// How many times the message has been delivered, this delivery included.
	pub receive_count: u32,
}

/// A queue holding work for the fleet.
#[async_trait]
pub trait WorkQueue: Send + Sync {
	/// Enqueues a message.
	async fn send(&self, body: String) -> Result<()>;

	/// Long-polls for one message, waiting up to `wait`. A received message
	/// becomes invisible to other consumers until acked, dead-lettered, or
	/// its visibility timeout expires.
	async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>>;

	/// Deletes a message after successful processing.
	async fn ack(&self, receipt: &str) -> Result<()>;

	/// Extends the visibility timeout of an in-flight message (heartbeat).
	async fn extend_visibility(&self, receipt: &str, timeout: Duration) -> Result<()>;

	/// Removes a message from rotation after repeated failures.
	async fn dead_letter(&self, receipt: &str) -> Result<()>;
}
