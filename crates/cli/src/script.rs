//! NDJSON simulation scripts.
//!
//! One line per polled batch:
//! ```json
//! {"delayMs": 20, "instanceId": "order-1", "messages": [{"id": "m1", "visibleInMs": 5000, "event": {"type": "EventRaised"}}]}
//! ```

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use dtq_protocol::{MessageData, OrchestrationInstance, QueueMessage, TaskMessage};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

const DEFAULT_VISIBLE_IN_MS: u64 = 30_000;
const SCRIPT_QUEUE_NAME: &str = "dtq-control-00";

#[derive(Debug, Error)]
pub enum ScriptError {
	#[error("failed to read script: {0}")]
	Io(#[from] std::io::Error),

	#[error("line {line}: {source}")]
	Parse { line: usize, source: serde_json::Error },

	#[error("line {line}: {message}")]
	Invalid { line: usize, message: String },
}

/// One polled batch for one instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStep {
	/// Wait before the batch is handed to the session manager.
	#[serde(default)]
	pub delay_ms: u64,
	pub instance_id: String,
	pub messages: Vec<ScriptMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMessage {
	pub id: String,
	#[serde(default = "default_visible_in_ms")]
	pub visible_in_ms: u64,
	#[serde(default)]
	pub event: Option<Value>,
}

fn default_visible_in_ms() -> u64 {
	DEFAULT_VISIBLE_IN_MS
}

impl ScriptStep {
	pub fn instance(&self) -> OrchestrationInstance {
		OrchestrationInstance::new(self.instance_id.as_str())
	}

	/// Builds the envelopes of this step as the transport would deliver them.
	///
	/// Each event is tagged with `messageId` so consumers can report what they received.
	pub fn envelopes(&self, received_at: DateTime<Utc>, first_sequence: u64) -> Vec<MessageData> {
		self.messages
			.iter()
			.zip(first_sequence..)
			.map(|(message, sequence_number)| {
				let mut event = message.event.clone().unwrap_or_else(|| json!({ "type": "EventRaised" }));
				if let Value::Object(fields) = &mut event {
					fields.insert("messageId".to_string(), Value::String(message.id.clone()));
				}

				let mut task = TaskMessage::new(self.instance(), event);
				task.sequence_number = sequence_number;

				let visible_in = TimeDelta::milliseconds(i64::try_from(message.visible_in_ms).unwrap_or(i64::MAX));
				let mut queue_message = QueueMessage::new(message.id.as_str(), received_at + visible_in);
				queue_message.inserted_at = Some(received_at);

				MessageData::new(task, queue_message, SCRIPT_QUEUE_NAME)
			})
			.collect()
	}
}

/// Parses NDJSON script content, skipping blank lines and `#` comments.
pub fn parse(content: &str) -> Result<Vec<ScriptStep>, ScriptError> {
	let mut steps = Vec::new();
	for (index, raw) in content.lines().enumerate() {
		let line = index + 1;
		let trimmed = raw.trim();
		if trimmed.is_empty() || trimmed.starts_with('#') {
			continue;
		}

		let step: ScriptStep = serde_json::from_str(trimmed).map_err(|source| ScriptError::Parse { line, source })?;
		if step.instance_id.is_empty() {
			return Err(ScriptError::Invalid {
				line,
				message: "instanceId must not be empty".to_string(),
			});
		}
		if step.messages.is_empty() {
			return Err(ScriptError::Invalid {
				line,
				message: "a step needs at least one message".to_string(),
			});
		}
		steps.push(step);
	}
	Ok(steps)
}

pub fn load(path: &Path) -> Result<Vec<ScriptStep>, ScriptError> {
	parse(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;

	use super::*;

	#[test]
	fn parses_steps_and_skips_comments() {
		let steps = parse(
			"# warm-up\n{\"instanceId\":\"o-1\",\"messages\":[{\"id\":\"m1\"}]}\n\n{\"delayMs\":40,\"instanceId\":\"o-1\",\"messages\":[{\"id\":\"m2\",\"visibleInMs\":500}]}\n",
		)
		.unwrap();

		assert_eq!(steps.len(), 2);
		assert_eq!(steps[0].delay_ms, 0);
		assert_eq!(steps[0].messages[0].visible_in_ms, DEFAULT_VISIBLE_IN_MS);
		assert_eq!(steps[1].delay_ms, 40);
	}

	#[test]
	fn reports_line_of_bad_json() {
		let err = parse("{\"instanceId\":\"o-1\",\"messages\":[{\"id\":\"m1\"}]}\n{not json}").unwrap_err();
		assert!(matches!(err, ScriptError::Parse { line: 2, .. }));
	}

	#[test]
	fn rejects_empty_message_list() {
		let err = parse("{\"instanceId\":\"o-1\",\"messages\":[]}").unwrap_err();
		assert!(matches!(err, ScriptError::Invalid { line: 1, .. }));
	}

	#[test]
	fn envelopes_carry_deadline_sequence_and_tag() {
		let step = parse("{\"instanceId\":\"o-1\",\"messages\":[{\"id\":\"m1\",\"visibleInMs\":5000,\"event\":{\"type\":\"TimerFired\"}},{\"id\":\"m2\"}]}")
			.unwrap()
			.remove(0);
		let received_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

		let envelopes = step.envelopes(received_at, 10);
		assert_eq!(envelopes.len(), 2);
		assert_eq!(envelopes[0].next_visible_time(), Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap()));
		assert_eq!(envelopes[0].task_message().event_name(), Some("TimerFired"));
		assert_eq!(envelopes[0].task_message().event["messageId"], "m1");
		assert_eq!(envelopes[1].task_message().sequence_number, 11);
		assert_eq!(envelopes[1].task_message().event_name(), Some("EventRaised"));
	}
}
