//! Routing of polled batches to per-instance sessions.
//!
//! The dispatch layer groups freshly received messages by instance and hands
//! each group to [`SessionManager::add_orchestration_batch`]. A batch that a
//! shutting-down session rejects is moved to a brand new session; a session is
//! never brought back once it has started shutting down.

use std::collections::HashMap;
use std::sync::Arc;

use dtq_protocol::{MessageData, OrchestrationInstance};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::activity::ActivitySession;
use crate::error::{Error, Result};
use crate::orchestration::{MessageBatch, OrchestrationSession, validate_batch};
use crate::scope::SessionScope;
use crate::settings::SessionSettings;

/// Where a batch ended up.
#[derive(Debug, Clone)]
pub enum Routed {
	/// Appended to a session that already has a consumer.
	Existing(Arc<OrchestrationSession>),
	/// A new session was created for the batch; the caller must start a consumer for it.
	NewSession(Arc<OrchestrationSession>),
}

impl Routed {
	pub fn session(&self) -> &Arc<OrchestrationSession> {
		match self {
			Routed::Existing(session) | Routed::NewSession(session) => session,
		}
	}

	pub fn is_new(&self) -> bool {
		matches!(self, Routed::NewSession(_))
	}
}

/// Registry of live orchestration sessions keyed by instance id.
#[derive(Debug)]
pub struct SessionManager {
	settings: SessionSettings,
	sessions: Mutex<HashMap<String, Arc<OrchestrationSession>>>,
}

impl SessionManager {
	pub fn new(settings: SessionSettings) -> Self {
		Self {
			settings,
			sessions: Mutex::new(HashMap::new()),
		}
	}

	pub fn settings(&self) -> &SessionSettings {
		&self.settings
	}

	/// Appends `batch` to the instance's live session, creating one when there
	/// is none or the current one is shutting down.
	pub fn add_orchestration_batch(&self, instance: &OrchestrationInstance, batch: impl Into<MessageBatch>) -> Result<Routed> {
		let batch = batch.into();
		validate_batch(&batch)?;

		let mut sessions = self.sessions.lock();
		if let Some(existing) = sessions.get(&instance.instance_id) {
			match existing.try_append(Arc::clone(&batch)) {
				Ok(true) => return Ok(Routed::Existing(Arc::clone(existing))),
				Ok(false) | Err(Error::Released { .. }) => {}
				Err(err) => return Err(err),
			}
			debug!(
				target = "dtq.manager",
				instance_id = %instance.instance_id,
				size = batch.len(),
				"session no longer accepting batches; rerouting to a new session"
			);
		}

		let scope = SessionScope::new(
			self.settings.storage_account_name.as_str(),
			self.settings.task_hub_name.as_str(),
			instance.clone(),
		)?;
		let session = Arc::new(OrchestrationSession::new(scope, self.settings.idle_timeout()));
		if !session.try_append(batch)? {
			return Err(Error::InvariantViolated("new session rejected its first batch".to_string()));
		}

		sessions.insert(instance.instance_id.clone(), Arc::clone(&session));
		info!(
			target = "dtq.manager",
			instance_id = %instance.instance_id,
			active = sessions.len(),
			"orchestration session started"
		);
		Ok(Routed::NewSession(session))
	}

	/// Creates the single-message session for an activity work item.
	pub fn activity_session(&self, message: MessageData) -> Result<ActivitySession> {
		ActivitySession::new(
			self.settings.storage_account_name.as_str(),
			self.settings.task_hub_name.as_str(),
			message,
		)
	}

	/// Live session registered for `instance_id`, if any.
	pub fn get(&self, instance_id: &str) -> Option<Arc<OrchestrationSession>> {
		self.sessions.lock().get(instance_id).cloned()
	}

	pub fn active_sessions(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Disposes `session` and unregisters it unless it has already been replaced.
	///
	/// Returns `true` when the registry entry was removed.
	pub fn release(&self, session: &Arc<OrchestrationSession>) -> bool {
		session.dispose();
		let mut sessions = self.sessions.lock();
		let instance_id = session.scope().instance_id();
		let registered = sessions.get(instance_id).is_some_and(|current| Arc::ptr_eq(current, session));
		if registered {
			sessions.remove(instance_id);
		}
		registered
	}

	/// Disposes and unregisters whatever session serves `instance_id`.
	pub fn remove(&self, instance_id: &str) -> Option<Arc<OrchestrationSession>> {
		let session = self.sessions.lock().remove(instance_id)?;
		session.dispose();
		Some(session)
	}

	/// Disposes sessions whose consumer has already been told end-of-session.
	///
	/// A session that is shutting down but whose consumer still holds the last
	/// batch stays registered so its messages keep being renewed.
	pub fn release_idle(&self) -> usize {
		let mut sessions = self.sessions.lock();
		let before = sessions.len();
		sessions.retain(|_, session| {
			let ended = session.has_ended();
			if ended {
				session.dispose();
			}
			!ended
		});
		before - sessions.len()
	}
}

#[cfg(test)]
mod tests {
	use chrono::{TimeDelta, Utc};

	use super::*;
	use crate::orchestration::SessionState;
	use crate::testing::envelope;

	fn manager(idle_ms: u64) -> SessionManager {
		SessionManager::new(SessionSettings {
			storage_account_name: "acct".to_string(),
			task_hub_name: "hub".to_string(),
			extended_session_idle_timeout_ms: idle_ms,
			..SessionSettings::default()
		})
	}

	fn batch(instance_id: &str, message_id: &str) -> Vec<MessageData> {
		vec![envelope(instance_id, message_id, Utc::now() + TimeDelta::seconds(30))]
	}

	#[test]
	fn first_batch_creates_session_then_reuses_it() {
		let manager = manager(1_000);
		let instance = OrchestrationInstance::new("o-1");

		let first = manager.add_orchestration_batch(&instance, batch("o-1", "m1")).unwrap();
		assert!(first.is_new());
		assert_eq!(first.session().scope().task_hub(), "hub");

		let second = manager.add_orchestration_batch(&instance, batch("o-1", "m2")).unwrap();
		assert!(!second.is_new());
		assert!(Arc::ptr_eq(first.session(), second.session()));
		assert_eq!(second.session().pending_batches(), 2);
		assert_eq!(manager.active_sessions(), 1);
	}

	#[test]
	fn invalid_batch_creates_nothing() {
		let manager = manager(1_000);
		let err = manager
			.add_orchestration_batch(&OrchestrationInstance::new("o-1"), Vec::<MessageData>::new())
			.unwrap_err();
		assert!(matches!(err, Error::EmptyBatch));
		assert_eq!(manager.active_sessions(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn rejected_batch_moves_to_fresh_session() {
		let manager = manager(50);
		let instance = OrchestrationInstance::new("o-1");
		let old = manager.add_orchestration_batch(&instance, batch("o-1", "m1")).unwrap().session().clone();

		old.fetch_next_batch().await.unwrap().unwrap();
		assert!(old.fetch_next_batch().await.unwrap().is_none());

		let routed = manager.add_orchestration_batch(&instance, batch("o-1", "m2")).unwrap();
		assert!(routed.is_new());
		assert!(!Arc::ptr_eq(&old, routed.session()));
		assert_eq!(routed.session().pending_batches(), 1);

		// The retiring consumer must not unregister its replacement.
		assert!(!manager.release(&old));
		assert!(old.is_released());
		assert!(Arc::ptr_eq(&manager.get("o-1").unwrap(), routed.session()));

		assert!(manager.release(routed.session()));
		assert_eq!(manager.active_sessions(), 0);
	}

	#[test]
	fn released_session_is_replaced() {
		let manager = manager(1_000);
		let instance = OrchestrationInstance::new("o-1");
		let first = manager.add_orchestration_batch(&instance, batch("o-1", "m1")).unwrap();
		first.session().dispose();

		let second = manager.add_orchestration_batch(&instance, batch("o-1", "m2")).unwrap();
		assert!(second.is_new());
	}

	#[tokio::test(start_paused = true)]
	async fn release_idle_reaps_drained_sessions_only() {
		let manager = manager(10);
		let idle = manager.add_orchestration_batch(&OrchestrationInstance::new("idle"), batch("idle", "m1")).unwrap();
		manager.add_orchestration_batch(&OrchestrationInstance::new("busy"), batch("busy", "m2")).unwrap();

		idle.session().fetch_next_batch().await.unwrap().unwrap();
		assert!(idle.session().fetch_next_batch().await.unwrap().is_none());

		assert_eq!(manager.release_idle(), 1);
		assert!(idle.session().is_released());
		assert!(manager.get("idle").is_none());
		assert!(manager.get("busy").is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn release_idle_waits_for_consumer_to_see_end() {
		let manager = manager(50);
		let routed = manager.add_orchestration_batch(&OrchestrationInstance::new("o-1"), batch("o-1", "m1")).unwrap();
		let session = Arc::clone(routed.session());
		session.fetch_next_batch().await.unwrap().unwrap();

		session.push_without_signal(batch("o-1", "raced"));
		let raced = session.fetch_next_batch().await.unwrap().unwrap();
		assert_eq!(raced[0].event["id"], "raced");
		assert_eq!(session.state(), SessionState::ShuttingDown);
		assert_eq!(session.pending_batches(), 0);

		assert_eq!(manager.release_idle(), 0);
		assert!(!session.is_released());
		assert!(manager.get("o-1").is_some());

		assert!(session.fetch_next_batch().await.unwrap().is_none());
		assert_eq!(manager.release_idle(), 1);
		assert!(session.is_released());
		assert!(manager.get("o-1").is_none());
	}

	#[test]
	fn remove_disposes_current_session() {
		let manager = manager(1_000);
		let routed = manager.add_orchestration_batch(&OrchestrationInstance::new("o-1"), batch("o-1", "m1")).unwrap();

		let removed = manager.remove("o-1").unwrap();
		assert!(removed.is_released());
		assert!(Arc::ptr_eq(&removed, routed.session()));
		assert!(manager.remove("o-1").is_none());
	}

	#[test]
	fn activity_session_uses_configured_scope() {
		let manager = manager(1_000);
		let deadline = Utc::now();
		let session = manager.activity_session(envelope("a-1", "w1", deadline)).unwrap();
		assert_eq!(session.scope().storage_account(), "acct");
		assert_eq!(session.next_expiration_utc(), deadline);
	}
}
