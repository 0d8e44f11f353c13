//! Visibility renewal driven by session expiration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dtq_protocol::MessageData;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::{NEVER_EXPIRES, Session};
use crate::settings::SessionSettings;
use crate::transport::MessageTransport;

/// Renews the queue messages behind a session before they become redeliverable.
pub struct VisibilityRenewer {
	transport: Arc<dyn MessageTransport>,
	settings: SessionSettings,
}

impl VisibilityRenewer {
	pub fn new(transport: Arc<dyn MessageTransport>, settings: SessionSettings) -> Self {
		Self { transport, settings }
	}

	/// Returns `true` when the session expires within the renewal lead of `now`.
	pub fn is_due(&self, session: &Session, now: DateTime<Utc>) -> bool {
		let expiration = session.next_expiration_utc();
		if expiration == NEVER_EXPIRES {
			return false;
		}
		let lead = TimeDelta::from_std(self.settings.renewal_lead()).unwrap_or(TimeDelta::MAX);
		expiration.checked_sub_signed(lead).is_none_or(|renew_at| renew_at <= now)
	}

	/// Renews every message the session is currently accountable for, if due.
	///
	/// Returns the number of renewed messages.
	pub async fn renew_if_due(&self, session: &Session, now: DateTime<Utc>) -> Result<usize> {
		if session.is_released() || !self.is_due(session, now) {
			return Ok(0);
		}

		let (messages, visibility): (Vec<MessageData>, Duration) = match session {
			Session::Activity(activity) => (vec![activity.message().clone()], self.settings.work_item_queue_visibility_timeout()),
			Session::Orchestration(orchestration) => match orchestration.current_batch() {
				Some(batch) => (batch.to_vec(), self.settings.control_queue_visibility_timeout()),
				None => return Ok(0),
			},
		};

		for message in &messages {
			if let Err(err) = self.transport.renew_visibility(message, visibility).await {
				warn!(
					target = "dtq.renewal",
					instance_id = session.scope().instance_id(),
					message_id = message.message_id(),
					error = %err,
					"visibility renewal failed"
				);
				return Err(match err {
					Error::Transport(message) => Error::Transport(message),
					other => Error::Transport(other.to_string()),
				});
			}
		}

		debug!(
			target = "dtq.renewal",
			instance_id = session.scope().instance_id(),
			renewed = messages.len(),
			visibility_ms = u64::try_from(visibility.as_millis()).unwrap_or(u64::MAX),
			"renewed message visibility"
		);
		Ok(messages.len())
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use dtq_protocol::OrchestrationInstance;

	use super::*;
	use crate::activity::ActivitySession;
	use crate::orchestration::OrchestrationSession;
	use crate::scope::SessionScope;
	use crate::testing::{FakeTransport, RecordedRenewal, envelope};

	fn at(secs: i64) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
	}

	fn renewer(transport: &FakeTransport) -> VisibilityRenewer {
		let settings = SessionSettings {
			renewal_lead_ms: 10_000,
			control_queue_visibility_timeout_ms: 60_000,
			work_item_queue_visibility_timeout_ms: 120_000,
			..SessionSettings::default()
		};
		VisibilityRenewer::new(Arc::new(transport.clone()), settings)
	}

	fn orchestration() -> Arc<OrchestrationSession> {
		let scope = SessionScope::new("acct", "hub", OrchestrationInstance::new("o-1")).unwrap();
		Arc::new(OrchestrationSession::new(scope, Duration::from_secs(1)))
	}

	#[test]
	fn empty_session_is_never_due() {
		let transport = FakeTransport::new();
		let session = Session::from(orchestration());
		assert!(!renewer(&transport).is_due(&session, at(0)));
	}

	#[test]
	fn due_once_inside_renewal_lead() {
		let transport = FakeTransport::new();
		let session: Session = ActivitySession::new("acct", "hub", envelope("a-1", "m1", at(30))).unwrap().into();
		let renewer = renewer(&transport);

		assert!(!renewer.is_due(&session, at(19)));
		assert!(renewer.is_due(&session, at(20)));
		assert!(renewer.is_due(&session, at(45)));
	}

	#[tokio::test]
	async fn renews_whole_current_batch_with_control_visibility() {
		let transport = FakeTransport::new();
		let orchestration = orchestration();
		orchestration
			.try_append(vec![envelope("o-1", "m1", at(15)), envelope("o-1", "m2", at(40))])
			.unwrap();

		let renewed = renewer(&transport).renew_if_due(&Session::from(orchestration), at(6)).await.unwrap();
		assert_eq!(renewed, 2);
		let calls = transport.take_renewed();
		assert_eq!(calls.iter().map(|c| c.message_id.as_str()).collect::<Vec<_>>(), ["m1", "m2"]);
		assert!(calls.iter().all(|c| c.visibility == Duration::from_secs(60)));
	}

	#[tokio::test]
	async fn activity_uses_work_item_visibility() {
		let transport = FakeTransport::new();
		let session: Session = ActivitySession::new("acct", "hub", envelope("a-1", "m1", at(5))).unwrap().into();

		assert_eq!(renewer(&transport).renew_if_due(&session, at(0)).await.unwrap(), 1);
		assert_eq!(
			transport.take_renewed(),
			[RecordedRenewal {
				message_id: "m1".to_string(),
				visibility: Duration::from_secs(120),
			}]
		);
	}

	#[tokio::test]
	async fn not_due_renews_nothing() {
		let transport = FakeTransport::new();
		let session: Session = ActivitySession::new("acct", "hub", envelope("a-1", "m1", at(300))).unwrap().into();

		assert_eq!(renewer(&transport).renew_if_due(&session, at(0)).await.unwrap(), 0);
		assert!(transport.take_renewed().is_empty());
	}

	#[tokio::test]
	async fn transport_failure_is_reported() {
		let transport = FakeTransport::new();
		transport.fail_with("throttled");
		let session: Session = ActivitySession::new("acct", "hub", envelope("a-1", "m1", at(5))).unwrap().into();

		let err = renewer(&transport).renew_if_due(&session, at(0)).await.unwrap_err();
		assert!(matches!(err, Error::Transport(ref m) if m == "throttled"));
	}

	#[tokio::test]
	async fn released_session_is_skipped() {
		let transport = FakeTransport::new();
		let orchestration = orchestration();
		orchestration.try_append(vec![envelope("o-1", "m1", at(1))]).unwrap();
		orchestration.dispose();

		assert_eq!(renewer(&transport).renew_if_due(&Session::from(orchestration), at(0)).await.unwrap(), 0);
		assert!(transport.take_renewed().is_empty());
	}
}
