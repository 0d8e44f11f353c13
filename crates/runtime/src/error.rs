//! Error types for the session layer.

use thiserror::Error;

/// Failures surfaced by sessions, the session manager and visibility renewal.
///
/// A rejected append and an idle shutdown are not errors; they are reported
/// as `Ok(false)` and `Ok(None)` respectively.
#[derive(Debug, Error)]
pub enum Error {
	/// A batch handed to a session contained no messages.
	#[error("message batch must not be empty")]
	EmptyBatch,

	/// A session scope was built without an instance id.
	#[error("session requires a non-empty instance id")]
	MissingInstanceId,

	/// An envelope arrived without a visibility deadline.
	#[error("message {message_id} has no visibility deadline")]
	MissingVisibility { message_id: String },

	/// The session was disposed before the call.
	#[error("session for instance {instance_id} has been released")]
	Released { instance_id: String },

	/// The state lock discipline was broken; the session state can no longer be trusted.
	#[error("session invariant violated: {0}")]
	InvariantViolated(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	/// Failure reported by the queue transport collaborator.
	#[error("transport error: {0}")]
	Transport(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns `true` for caller errors that never changed session state.
	pub fn is_precondition(&self) -> bool {
		matches!(self, Error::EmptyBatch | Error::MissingInstanceId | Error::MissingVisibility { .. })
	}
}

pub type Result<T> = std::result::Result<T, Error>;
