//! Closed set of session kinds sharing the expiration contract.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::activity::ActivitySession;
use crate::orchestration::OrchestrationSession;
use crate::scope::SessionScope;

/// Expiration reported by a session with nothing to keep alive yet.
pub const NEVER_EXPIRES: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// A session bound to one instance, whatever its buffering strategy.
#[derive(Debug, Clone)]
pub enum Session {
	Activity(ActivitySession),
	Orchestration(Arc<OrchestrationSession>),
}

impl Session {
	pub fn scope(&self) -> &SessionScope {
		match self {
			Session::Activity(session) => session.scope(),
			Session::Orchestration(session) => session.scope(),
		}
	}

	/// Point in time at which the underlying queue messages must have been
	/// renewed, or [`NEVER_EXPIRES`].
	pub fn next_expiration_utc(&self) -> DateTime<Utc> {
		match self {
			Session::Activity(session) => session.next_expiration_utc(),
			Session::Orchestration(session) => session.next_expiration_utc(),
		}
	}

	pub fn is_released(&self) -> bool {
		match self {
			Session::Activity(_) => false,
			Session::Orchestration(session) => session.is_released(),
		}
	}
}

impl From<ActivitySession> for Session {
	fn from(session: ActivitySession) -> Self {
		Session::Activity(session)
	}
}

impl From<Arc<OrchestrationSession>> for Session {
	fn from(session: Arc<OrchestrationSession>) -> Self {
		Session::Orchestration(session)
	}
}
