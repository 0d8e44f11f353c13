//! Binding of a session to one instance inside a task hub.

use dtq_protocol::OrchestrationInstance;

use crate::error::{Error, Result};

/// Immutable (storage account, task hub, instance) triple a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
	storage_account: String,
	task_hub: String,
	instance: OrchestrationInstance,
}

impl SessionScope {
	pub fn new(storage_account: impl Into<String>, task_hub: impl Into<String>, instance: OrchestrationInstance) -> Result<Self> {
		if instance.instance_id.is_empty() {
			return Err(Error::MissingInstanceId);
		}
		Ok(Self {
			storage_account: storage_account.into(),
			task_hub: task_hub.into(),
			instance,
		})
	}

	pub fn storage_account(&self) -> &str {
		&self.storage_account
	}

	pub fn task_hub(&self) -> &str {
		&self.task_hub
	}

	pub fn instance(&self) -> &OrchestrationInstance {
		&self.instance
	}

	pub fn instance_id(&self) -> &str {
		&self.instance.instance_id
	}
}
