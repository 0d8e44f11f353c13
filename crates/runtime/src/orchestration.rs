//! Batched message session for orchestration instances.
//!
//! The dispatch layer appends whole batches of envelopes (one per poll cycle)
//! while a single orchestration executor pulls them out one batch at a time.
//! The session ends itself when the executor observes no new batch within the
//! idle timeout.
//!
//! # State machine
//!
//! ```text
//! Active --(fetch times out)--> ShuttingDown --(dispose)--> Released
//!   |                                                          ^
//!   +----------------------------(dispose)---------------------+
//! ```
//!
//! * `Active`: appends are accepted, fetches wait up to the idle timeout.
//! * `ShuttingDown`: appends are rejected (`Ok(false)`) so the caller reroutes the
//!   batch to a fresh session; fetches hand out whatever is still pending and
//!   then report end-of-session without waiting.
//! * `Released`: the wake signal is closed; every call returns [`Error::Released`].
//!
//! # Handoff
//!
//! Pending batches, the current batch and the shutdown flag live behind one
//! lock. A counting semaphore carries one permit per accepted batch and is the
//! only thing a fetch suspends on. When the wait times out the fetch sets the
//! shutdown flag and re-reads the queue inside the same critical section that
//! appends use, so a batch appended between the timer firing and the flag
//! being set is still delivered instead of being lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dtq_protocol::{MessageData, TaskMessage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::scope::SessionScope;
use crate::session::NEVER_EXPIRES;

/// An accepted, immutable batch of envelopes.
pub type MessageBatch = Arc<[MessageData]>;

/// Observable lifecycle state of an [`OrchestrationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Active,
	ShuttingDown,
	Released,
}

#[derive(Debug, Default)]
struct Buffer {
	pending: VecDeque<MessageBatch>,
	/// Batch most recently appended or handed to the consumer.
	current: Option<MessageBatch>,
	shutting_down: bool,
	/// The consumer has been handed end-of-session.
	ended: bool,
}

/// Session that buffers batches for one orchestration instance.
///
/// Many producers may append concurrently; exactly one consumer is expected to
/// call [`fetch_next_batch`](Self::fetch_next_batch) at a time.
#[derive(Debug)]
pub struct OrchestrationSession {
	scope: SessionScope,
	idle_timeout: Duration,
	buffer: Mutex<Buffer>,
	signal: Semaphore,
	released: AtomicBool,
}

impl OrchestrationSession {
	pub fn new(scope: SessionScope, idle_timeout: Duration) -> Self {
		Self {
			scope,
			idle_timeout,
			buffer: Mutex::new(Buffer::default()),
			signal: Semaphore::new(0),
			released: AtomicBool::new(false),
		}
	}

	pub fn scope(&self) -> &SessionScope {
		&self.scope
	}

	pub fn idle_timeout(&self) -> Duration {
		self.idle_timeout
	}

	/// Offers a freshly received batch to the session.
	///
	/// Returns `Ok(false)` when the session has started shutting down; the batch
	/// was not accepted and must be handed to a new session. Pass an
	/// `Arc<[MessageData]>` to keep a handle for rerouting.
	///
	/// # Errors
	///
	/// * [`Error::EmptyBatch`] / [`Error::MissingVisibility`] for malformed batches
	///   (the session is left untouched)
	/// * [`Error::Released`] after [`dispose`](Self::dispose)
	pub fn try_append(&self, batch: impl Into<MessageBatch>) -> Result<bool> {
		let batch = batch.into();
		validate_batch(&batch)?;

		let mut buffer = self.buffer.lock();
		self.ensure_not_released()?;
		if buffer.shutting_down {
			debug!(
				target = "dtq.session",
				instance_id = self.scope.instance_id(),
				size = batch.len(),
				"session shutting down; batch rejected"
			);
			return Ok(false);
		}

		buffer.current = Some(Arc::clone(&batch));
		buffer.pending.push_back(batch);
		self.signal.add_permits(1);
		Ok(true)
	}

	/// Waits for the next batch and returns its task messages in order.
	///
	/// Returns `Ok(None)` once the session has gone idle for longer than the idle
	/// timeout and nothing is left to drain. After that every call returns
	/// `Ok(None)` immediately.
	pub async fn fetch_next_batch(&self) -> Result<Option<Vec<TaskMessage>>> {
		self.ensure_not_released()?;

		if self.buffer.lock().shutting_down {
			return Ok(self.take_pending());
		}

		match tokio::time::timeout(self.idle_timeout, self.signal.acquire()).await {
			Ok(Ok(permit)) => {
				permit.forget();
				let mut buffer = self.buffer.lock();
				match buffer.pending.pop_front() {
					Some(batch) => {
						buffer.current = Some(Arc::clone(&batch));
						drop(buffer);
						Ok(Some(self.unwrap_batch(&batch)))
					}
					None if buffer.shutting_down => {
						buffer.ended = true;
						Ok(None)
					}
					None => {
						error!(
							target = "dtq.session",
							instance_id = self.scope.instance_id(),
							"wake signal without a pending batch while active"
						);
						Err(Error::InvariantViolated(
							"pending queue empty while the session is active".to_string(),
						))
					}
				}
			}
			Ok(Err(_closed)) => Err(self.released_error()),
			Err(_elapsed) => {
				let mut buffer = self.buffer.lock();
				buffer.shutting_down = true;
				match buffer.pending.pop_front() {
					Some(batch) => {
						buffer.current = Some(Arc::clone(&batch));
						drop(buffer);
						debug!(
							target = "dtq.session",
							instance_id = self.scope.instance_id(),
							"batch arrived as the idle timeout fired"
						);
						Ok(Some(self.unwrap_batch(&batch)))
					}
					None => {
						buffer.ended = true;
						drop(buffer);
						debug!(
							target = "dtq.session",
							instance_id = self.scope.instance_id(),
							idle_ms = u64::try_from(self.idle_timeout.as_millis()).unwrap_or(u64::MAX),
							"session idle; shutting down"
						);
						Ok(None)
					}
				}
			}
		}
	}

	/// Earliest visibility deadline of the current batch, or [`NEVER_EXPIRES`]
	/// when no batch has been associated with the session yet.
	pub fn next_expiration_utc(&self) -> DateTime<Utc> {
		let buffer = self.buffer.lock();
		buffer
			.current
			.as_deref()
			.and_then(|batch| batch.iter().filter_map(MessageData::next_visible_time).min())
			.unwrap_or(NEVER_EXPIRES)
	}

	/// The batch expiration is computed against.
	pub fn current_batch(&self) -> Option<MessageBatch> {
		self.buffer.lock().current.clone()
	}

	/// Number of accepted batches not yet handed to the consumer.
	pub fn pending_batches(&self) -> usize {
		self.buffer.lock().pending.len()
	}

	pub fn state(&self) -> SessionState {
		if self.is_released() {
			SessionState::Released
		} else if self.buffer.lock().shutting_down {
			SessionState::ShuttingDown
		} else {
			SessionState::Active
		}
	}

	/// `true` once the session stops accepting batches, including after it has
	/// been released.
	pub fn is_shutting_down(&self) -> bool {
		self.state() != SessionState::Active
	}

	/// `true` once a fetch has returned `Ok(None)`; the consumer is done with the
	/// session and it can be released.
	pub fn has_ended(&self) -> bool {
		self.buffer.lock().ended
	}

	pub fn is_released(&self) -> bool {
		self.released.load(Ordering::Acquire)
	}

	/// Closes the wake signal and marks the session released.
	///
	/// A fetch still waiting on the signal returns [`Error::Released`]. Calling
	/// this more than once has no further effect.
	pub fn dispose(&self) {
		let mut buffer = self.buffer.lock();
		if self.released.swap(true, Ordering::AcqRel) {
			return;
		}
		buffer.shutting_down = true;
		self.signal.close();
		let undelivered = buffer.pending.len();
		drop(buffer);

		if undelivered > 0 {
			warn!(
				target = "dtq.session",
				instance_id = self.scope.instance_id(),
				undelivered,
				"session released with undelivered batches; they will be redelivered by the queue"
			);
		} else {
			debug!(target = "dtq.session", instance_id = self.scope.instance_id(), "session released");
		}
	}

	fn take_pending(&self) -> Option<Vec<TaskMessage>> {
		let mut buffer = self.buffer.lock();
		let Some(batch) = buffer.pending.pop_front() else {
			buffer.ended = true;
			return None;
		};
		buffer.current = Some(Arc::clone(&batch));
		drop(buffer);
		Some(self.unwrap_batch(&batch))
	}

	fn unwrap_batch(&self, batch: &[MessageData]) -> Vec<TaskMessage> {
		batch
			.iter()
			.map(|message| {
				debug!(
					target = "dtq.session",
					instance_id = self.scope.instance_id(),
					message_id = message.message_id(),
					queue = message.queue_name(),
					dequeue_count = message.queue_message().dequeue_count,
					event = message.task_message().event_name().unwrap_or("unknown"),
					"message received"
				);
				message.task_message().clone()
			})
			.collect()
	}

	fn ensure_not_released(&self) -> Result<()> {
		if self.is_released() {
			return Err(self.released_error());
		}
		Ok(())
	}

	fn released_error(&self) -> Error {
		Error::Released {
			instance_id: self.scope.instance_id().to_string(),
		}
	}

	/// Queues a batch without its wake permit, the way an append racing the idle
	/// timer lands: present in the queue but not yet observed by the consumer.
	#[cfg(test)]
	pub(crate) fn push_without_signal(&self, messages: Vec<MessageData>) {
		self.buffer.lock().pending.push_back(messages.into());
	}
}

/// Rejects batches that would break expiration or ordering guarantees.
pub(crate) fn validate_batch(batch: &[MessageData]) -> Result<()> {
	if batch.is_empty() {
		return Err(Error::EmptyBatch);
	}
	if let Some(message) = batch.iter().find(|m| m.next_visible_time().is_none()) {
		return Err(Error::MissingVisibility {
			message_id: message.message_id().to_string(),
		});
	}
	Ok(())
}
