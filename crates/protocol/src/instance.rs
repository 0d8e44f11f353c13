//! Orchestration instance identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one orchestration (or the orchestration an activity belongs to).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationInstance {
	pub instance_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub execution_id: Option<String>,
}

impl OrchestrationInstance {
	pub fn new(instance_id: impl Into<String>) -> Self {
		Self {
			instance_id: instance_id.into(),
			execution_id: None,
		}
	}

	pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
		self.execution_id = Some(execution_id.into());
		self
	}
}

impl fmt::Display for OrchestrationInstance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.execution_id {
			Some(execution_id) => write!(f, "{}:{}", self.instance_id, execution_id),
			None => f.write_str(&self.instance_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_execution_when_present() {
		let instance = OrchestrationInstance::new("order-42");
		assert_eq!(instance.to_string(), "order-42");
		assert_eq!(instance.with_execution_id("e1").to_string(), "order-42:e1");
	}

	#[test]
	fn execution_id_is_optional_on_the_wire() {
		let instance: OrchestrationInstance = serde_json::from_str(r#"{"instanceId":"abc"}"#).unwrap();
		assert_eq!(instance.instance_id, "abc");
		assert!(instance.execution_id.is_none());
		assert_eq!(serde_json::to_string(&instance).unwrap(), r#"{"instanceId":"abc"}"#);
	}
}
