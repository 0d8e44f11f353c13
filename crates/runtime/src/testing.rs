//! Test doubles for the session layer.
//!
//! Provides an in-memory [`MessageTransport`] that records renewals, plus a
//! compact envelope builder. Compiled for unit tests and behind the `testing`
//! feature.
//!
//! # Example
//!
//! ```ignore
//! let transport = FakeTransport::new();
//! let renewer = VisibilityRenewer::new(Arc::new(transport.clone()), settings);
//! renewer.renew_if_due(&session, Utc::now()).await?;
//! assert_eq!(transport.take_renewed().len(), 1);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dtq_protocol::{MessageData, OrchestrationInstance, QueueMessage, TaskMessage};
use parking_lot::Mutex;
use serde_json::json;

use crate::error::{Error, Result};
use crate::transport::MessageTransport;

/// Builds an envelope whose event carries `message_id` under `"id"`.
pub fn envelope(instance_id: &str, message_id: &str, next_visible_time: DateTime<Utc>) -> MessageData {
	let task = TaskMessage::new(
		OrchestrationInstance::new(instance_id),
		json!({ "type": "EventRaised", "id": message_id }),
	);
	MessageData::new(task, QueueMessage::new(message_id, next_visible_time), "test-control-00")
}

/// A renewal recorded by [`FakeTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRenewal {
	pub message_id: String,
	pub visibility: Duration,
}

#[derive(Debug, Default)]
struct Recorded {
	renewed: Vec<RecordedRenewal>,
	fail_with: Option<String>,
}

/// In-memory transport capturing every call.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
	recorded: Arc<Mutex<Recorded>>,
}

impl FakeTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every later call fail with `message`.
	pub fn fail_with(&self, message: &str) {
		self.recorded.lock().fail_with = Some(message.to_string());
	}

	/// Take all recorded renewals, clearing the buffer.
	pub fn take_renewed(&self) -> Vec<RecordedRenewal> {
		std::mem::take(&mut self.recorded.lock().renewed)
	}

	fn check(&self) -> Result<()> {
		match &self.recorded.lock().fail_with {
			Some(message) => Err(Error::Transport(message.clone())),
			None => Ok(()),
		}
	}
}

impl MessageTransport for FakeTransport {
	fn renew_visibility<'a>(&'a self, message: &'a MessageData, visibility: Duration) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
		Box::pin(async move {
			self.check()?;
			self.recorded.lock().renewed.push(RecordedRenewal {
				message_id: message.message_id().to_string(),
				visibility,
			});
			Ok(())
		})
	}
}
