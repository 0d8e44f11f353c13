//! Task messages and the transport envelope that wraps them.
//!
//! Envelope format as handed over by the queue transport:
//! ```json
//! {
//!   "taskMessage": {
//!     "instance": { "instanceId": "order-42" },
//!     "event": { "type": "TaskCompleted", "taskScheduledId": 3 },
//!     "sequenceNumber": 7
//!   },
//!   "queueMessage": {
//!     "id": "5c1e...",
//!     "popReceipt": "AgAAAAMAAAAAAAAA",
//!     "dequeueCount": 1,
//!     "nextVisibleTime": "2024-01-01T00:00:05Z"
//!   },
//!   "queueName": "hub-control-00"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::instance::OrchestrationInstance;

/// Domain-level message consumed by the orchestration executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
	pub instance: OrchestrationInstance,
	/// History event payload; opaque to the session layer.
	pub event: Value,
	#[serde(default)]
	pub sequence_number: u64,
}

impl TaskMessage {
	pub fn new(instance: OrchestrationInstance, event: Value) -> Self {
		Self {
			instance,
			event,
			sequence_number: 0,
		}
	}

	/// Returns the event's `type` discriminator when present.
	pub fn event_name(&self) -> Option<&str> {
		self.event.get("type").and_then(Value::as_str)
	}
}

/// Metadata of the underlying queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
	pub id: String,
	#[serde(default)]
	pub pop_receipt: String,
	#[serde(default)]
	pub dequeue_count: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inserted_at: Option<DateTime<Utc>>,
	/// Point after which the entry becomes redeliverable unless renewed or deleted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_visible_time: Option<DateTime<Utc>>,
}

impl QueueMessage {
	pub fn new(id: impl Into<String>, next_visible_time: DateTime<Utc>) -> Self {
		Self {
			id: id.into(),
			pop_receipt: String::new(),
			dequeue_count: 1,
			inserted_at: None,
			next_visible_time: Some(next_visible_time),
		}
	}
}

/// A received task message together with its transport metadata.
///
/// Envelopes are produced by the transport and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
	task_message: TaskMessage,
	queue_message: QueueMessage,
	#[serde(default)]
	queue_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	episode: Option<u64>,
	#[serde(default)]
	total_size_bytes: u64,
}

impl MessageData {
	pub fn new(task_message: TaskMessage, queue_message: QueueMessage, queue_name: impl Into<String>) -> Self {
		Self {
			task_message,
			queue_message,
			queue_name: queue_name.into(),
			episode: None,
			total_size_bytes: 0,
		}
	}

	pub fn with_episode(mut self, episode: u64) -> Self {
		self.episode = Some(episode);
		self
	}

	pub fn with_total_size_bytes(mut self, size: u64) -> Self {
		self.total_size_bytes = size;
		self
	}

	pub fn task_message(&self) -> &TaskMessage {
		&self.task_message
	}

	pub fn queue_message(&self) -> &QueueMessage {
		&self.queue_message
	}

	pub fn queue_name(&self) -> &str {
		&self.queue_name
	}

	pub fn episode(&self) -> Option<u64> {
		self.episode
	}

	pub fn total_size_bytes(&self) -> u64 {
		self.total_size_bytes
	}

	pub fn message_id(&self) -> &str {
		&self.queue_message.id
	}

	pub fn instance(&self) -> &OrchestrationInstance {
		&self.task_message.instance
	}

	/// Visibility deadline of the underlying queue entry.
	pub fn next_visible_time(&self) -> Option<DateTime<Utc>> {
		self.queue_message.next_visible_time
	}
}
