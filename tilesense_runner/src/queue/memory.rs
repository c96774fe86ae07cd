//! In-memory [`WorkQueue`] with real visibility-timeout semantics, used by
//! tests and single-host deployments.

use super::{QueueMessage, WorkQueue};
use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct StoredMessage {
	id: String,
	body: String,
	receive_count: u32,
	/// The message is deliverable once this instant has passed.
	visible_at: Instant,
	/// Receipt of the delivery currently holding the message, if any.
	receipt: Option<String>,
}

#[derive(Default)]
struct Inner {
	messages: Vec<StoredMessage>,
	dead_letters: Vec<QueueMessage>,
}

/// A [`WorkQueue`] backed by process memory.
///
/// Receiving hides a message for the configured visibility timeout; an
/// unacked message becomes deliverable again afterwards with an incremented
/// receive count, mirroring the redelivery behavior of a remote queue.
pub struct MemoryQueue {
	visibility_timeout: Duration,
	inner: Mutex<Inner>,
}

impl MemoryQueue {
	#[must_use]
	pub fn new(visibility_timeout: Duration) -> Self {
		Self {
			visibility_timeout,
			inner: Mutex::new(Inner::default()),
		}
	}

	/// Number of messages currently in the queue (visible or in flight).
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().messages.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.lock().messages.is_empty()
	}

	/// Messages that have been dead-lettered, for assertions in tests.
	#[must_use]
	pub fn dead_letters(&self) -> Vec<QueueMessage> {
		self.inner.lock().dead_letters.clone()
	}

	fn try_receive(&self) -> Option<QueueMessage> {
		let now = Instant::now();
		let mut inner = self.inner.lock();
		let message = inner.messages.iter_mut().find(|m| m.visible_at <= now)?;

		message.receive_count += 1;
		message.visible_at = now + self.visibility_timeout;
		let receipt = Uuid::new_v4().to_string();
		message.receipt = Some(receipt.clone());

		Some(QueueMessage {
			id: message.id.clone(),
			receipt,
			body: message.body.clone(),
			receive_count: message.receive_count,
		})
	}

	fn find_by_receipt(inner: &mut Inner, receipt: &str) -> Result<usize> {
		match inner
			.messages
			.iter()
			.position(|m| m.receipt.as_deref() == Some(receipt))
		{
			Some(index) => Ok(index),
			None => bail!("unknown or expired receipt '{receipt}'"),
		}
	}
}

#[async_trait]
impl WorkQueue for MemoryQueue {
	async fn send(&self, body: String) -> Result<()> {
		self.inner.lock().messages.push(StoredMessage {
			id: Uuid::new_v4().to_string(),
			body,
			receive_count: 0,
			visible_at: Instant::now(),
			receipt: None,
		});
		Ok(())
	}

	async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>> {
		let deadline = Instant::now() + wait;
		loop {
			if let Some(message) = self.try_receive() {
				return Ok(Some(message));
			}
			if Instant::now() >= deadline {
				return Ok(None);
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}

	async fn ack(&self, receipt: &str) -> Result<()> {
		let mut inner = self.inner.lock();
		let index = Self::find_by_receipt(&mut inner, receipt)?;
		inner.messages.remove(index);
		Ok(())
	}

	async fn extend_visibility(&self, receipt: &str, timeout: Duration) -> Result<()> {
		let mut inner = self.inner.lock();
		let index = Self::find_by_receipt(&mut inner, receipt)?;
		inner.messages[index].visible_at = Instant::now() + timeout;
		Ok(())
	}

	async fn dead_letter(&self, receipt: &str) -> Result<()> {
		let mut inner = self.inner.lock();
		let index = Self::find_by_receipt(&mut inner, receipt)?;
		let message = inner.messages.remove(index);
		inner.dead_letters.push(QueueMessage {
			id: message.id,
			receipt: receipt.to_string(),
			body: message.body,
			receive_count: message.receive_count,
		});
		Ok(())
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn send_receive_ack() -> Result<()> {
		let queue = MemoryQueue::new(Duration::from_secs(30));
		queue.send("one".to_string()).await?;
		queue.send("two".to_string()).await?;
		assert_eq!(queue.len(), 2);

		let message = queue.receive(Duration::from_millis(10)).await?.unwrap();
		assert_eq!(message.body, "one");
		assert_eq!(message.receive_count, 1);

		// In-flight messages are invisible to other consumers.
		let next = queue.receive(Duration::from_millis(10)).await?.unwrap();
		assert_eq!(next.body, "two");
		assert!(queue.receive(Duration::from_millis(10)).await?.is_none());

		queue.ack(&message.receipt).await?;
		queue.ack(&next.receipt).await?;
		assert!(queue.is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn unacked_messages_are_redelivered() -> Result<()> {
		let queue = MemoryQueue::new(Duration::from_millis(20));
		queue.send("work".to_string()).await?;

		let first = queue.receive(Duration::from_millis(10)).await?.unwrap();
		assert_eq!(first.receive_count, 1);

		// After the visibility timeout the message comes back with a new
		// receipt and bumped receive count.
		let second = queue.receive(Duration::from_millis(200)).await?.unwrap();
		assert_eq!(second.receive_count, 2);
		assert_ne!(first.receipt, second.receipt);

		// The old receipt is no longer valid.
		assert!(queue.ack(&first.receipt).await.is_err());
		queue.ack(&second.receipt).await?;
		Ok(())
	}

	#[tokio::test]
	async fn heartbeat_extends_visibility() -> Result<()> {
		let queue = MemoryQueue::new(Duration::from_millis(30));
		queue.send("slow".to_string()).await?;

		let message = queue.receive(Duration::from_millis(10)).await?.unwrap();
		for _ in 0..3 {
			tokio::time::sleep(Duration::from_millis(15)).await;
			queue.extend_visibility(&message.receipt, Duration::from_millis(50)).await?;
		}
		// Still invisible thanks to the heartbeat.
		assert!(queue.receive(Duration::from_millis(10)).await?.is_none());
		queue.ack(&message.receipt).await?;
		Ok(())
	}

	#[tokio::test]
	async fn dead_letter_removes_from_rotation() -> Result<()> {
		let queue = MemoryQueue::new(Duration::from_millis(10));
		queue.send("poison".to_string()).await?;

		let message = queue.receive(Duration::from_millis(10)).await?.unwrap();
		queue.dead_letter(&message.receipt).await?;

		assert!(queue.is_empty());
		let dead = queue.dead_letters();
		assert_eq!(dead.len(), 1);
		assert_eq!(dead[0].body, "poison");
		Ok(())
	}
}
