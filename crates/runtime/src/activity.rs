//! Session wrapping the single message of an activity invocation.

use chrono::{DateTime, Utc};
use dtq_protocol::MessageData;

use crate::error::{Error, Result};
use crate::scope::SessionScope;

/// Activity work item session. Holds exactly one envelope and never buffers.
#[derive(Debug, Clone)]
pub struct ActivitySession {
	scope: SessionScope,
	message: MessageData,
	expires_at: DateTime<Utc>,
}

impl ActivitySession {
	/// Binds a session to the instance named by `message`.
	pub fn new(storage_account: impl Into<String>, task_hub: impl Into<String>, message: MessageData) -> Result<Self> {
		let expires_at = message.next_visible_time().ok_or_else(|| Error::MissingVisibility {
			message_id: message.message_id().to_string(),
		})?;
		let scope = SessionScope::new(storage_account, task_hub, message.instance().clone())?;
		Ok(Self { scope, message, expires_at })
	}

	pub fn scope(&self) -> &SessionScope {
		&self.scope
	}

	pub fn message(&self) -> &MessageData {
		&self.message
	}

	/// Visibility deadline of the wrapped message.
	pub fn next_expiration_utc(&self) -> DateTime<Utc> {
		self.expires_at
	}
}
