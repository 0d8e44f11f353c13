//! Queue transport collaborator seen from the session layer.
//!
//! The transport itself (polling, persistence, deletion, wire format) lives
//! outside this crate. Sessions only need the call that keeps their in-flight
//! messages invisible to other workers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use dtq_protocol::MessageData;

use crate::error::Result;

/// Visibility renewal on the durable message queue.
pub trait MessageTransport: Send + Sync {
	/// Pushes the message's visibility deadline `visibility` into the future.
	fn renew_visibility<'a>(&'a self, message: &'a MessageData, visibility: Duration) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
