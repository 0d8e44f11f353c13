//! Scripted producer/consumer run against the session layer.
//!
//! The producer replays script steps through a [`SessionManager`]; every new
//! session gets its own consumer task that fetches until end-of-session and
//! then releases the session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dtq_protocol::TaskMessage;
use dtq_runtime::{OrchestrationSession, Routed, SessionManager, SessionSettings};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::script::ScriptStep;

/// One line of simulation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Record {
	Appended {
		instance_id: String,
		message_ids: Vec<String>,
		new_session: bool,
	},
	Fetched {
		instance_id: String,
		message_ids: Vec<String>,
		next_expiration: DateTime<Utc>,
	},
	Ended {
		instance_id: String,
	},
}

/// Replays `steps` and returns every record in the order it was produced.
pub async fn run(steps: Vec<ScriptStep>, settings: SessionSettings) -> anyhow::Result<Vec<Record>> {
	let manager = Arc::new(SessionManager::new(settings));
	let (records_tx, mut records_rx) = mpsc::unbounded_channel();
	let mut consumers: Vec<JoinHandle<anyhow::Result<()>>> = Vec::new();
	let mut sequence = 0;

	for step in steps {
		if step.delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
		}

		let envelopes = step.envelopes(Utc::now(), sequence);
		sequence += envelopes.len() as u64;
		let message_ids: Vec<String> = envelopes.iter().map(|m| m.message_id().to_string()).collect();

		let routed = manager.add_orchestration_batch(&step.instance(), envelopes)?;
		let _ = records_tx.send(Record::Appended {
			instance_id: step.instance_id.clone(),
			message_ids,
			new_session: routed.is_new(),
		});

		if let Routed::NewSession(session) = routed {
			consumers.push(tokio::spawn(consume(Arc::clone(&manager), session, records_tx.clone())));
		}
	}
	drop(records_tx);

	info!(target = "dtq.simulate", consumers = consumers.len(), "script replayed; waiting for sessions to go idle");
	for consumer in consumers {
		consumer.await??;
	}

	let mut records = Vec::new();
	while let Some(record) = records_rx.recv().await {
		records.push(record);
	}
	Ok(records)
}

async fn consume(manager: Arc<SessionManager>, session: Arc<OrchestrationSession>, records: mpsc::UnboundedSender<Record>) -> anyhow::Result<()> {
	let instance_id = session.scope().instance_id().to_string();

	loop {
		let messages = match session.fetch_next_batch().await {
			Ok(Some(messages)) => messages,
			Ok(None) => break,
			Err(err) => {
				manager.release(&session);
				return Err(err.into());
			}
		};
		debug!(target = "dtq.simulate", instance_id = %instance_id, count = messages.len(), "executing batch");
		let _ = records.send(Record::Fetched {
			instance_id: instance_id.clone(),
			message_ids: messages.iter().filter_map(message_id).collect(),
			next_expiration: session.next_expiration_utc(),
		});
	}

	manager.release(&session);
	let _ = records.send(Record::Ended { instance_id });
	Ok(())
}

fn message_id(message: &TaskMessage) -> Option<String> {
	message.event.get("messageId").and_then(|id| id.as_str()).map(str::to_string)
}
