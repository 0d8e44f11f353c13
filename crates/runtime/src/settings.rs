//! Session layer settings loaded from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_VISIBILITY_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_RENEWAL_LEAD_MS: u64 = 30_000;

/// Scope names, idle timeout and visibility renewal policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
	pub storage_account_name: String,
	pub task_hub_name: String,
	/// How long an orchestration session waits for a new batch before shutting down.
	pub extended_session_idle_timeout_ms: u64,
	pub control_queue_visibility_timeout_ms: u64,
	pub work_item_queue_visibility_timeout_ms: u64,
	/// Renew visibility once a session is this close to its expiration.
	pub renewal_lead_ms: u64,
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self {
			storage_account_name: "devstoreaccount1".to_string(),
			task_hub_name: "DefaultTaskHub".to_string(),
			extended_session_idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
			control_queue_visibility_timeout_ms: DEFAULT_VISIBILITY_TIMEOUT_MS,
			work_item_queue_visibility_timeout_ms: DEFAULT_VISIBILITY_TIMEOUT_MS,
			renewal_lead_ms: DEFAULT_RENEWAL_LEAD_MS,
		}
	}
}

impl SessionSettings {
	/// Parses and validates settings from a JSON document.
	pub fn from_json_str(json: &str) -> Result<Self> {
		let settings: Self = serde_json::from_str(json)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads settings from a JSON file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json_str(&content)
	}

	pub fn validate(&self) -> Result<()> {
		if self.task_hub_name.trim().is_empty() {
			return Err(Error::Config("taskHubName must not be empty".to_string()));
		}
		if self.extended_session_idle_timeout_ms == 0 {
			return Err(Error::Config("extendedSessionIdleTimeoutMs must be greater than zero".to_string()));
		}
		let shortest_visibility = self.control_queue_visibility_timeout_ms.min(self.work_item_queue_visibility_timeout_ms);
		if self.renewal_lead_ms >= shortest_visibility {
			return Err(Error::Config(format!(
				"renewalLeadMs ({}) must be shorter than every visibility timeout ({})",
				self.renewal_lead_ms, shortest_visibility
			)));
		}
		Ok(())
	}

	pub fn idle_timeout(&self) -> Duration {
		Duration::from_millis(self.extended_session_idle_timeout_ms)
	}

	pub fn control_queue_visibility_timeout(&self) -> Duration {
		Duration::from_millis(self.control_queue_visibility_timeout_ms)
	}

	pub fn work_item_queue_visibility_timeout(&self) -> Duration {
		Duration::from_millis(self.work_item_queue_visibility_timeout_ms)
	}

	pub fn renewal_lead(&self) -> Duration {
		Duration::from_millis(self.renewal_lead_ms)
	}
}
