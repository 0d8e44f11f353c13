//! Session layer of a durable task-orchestration engine.
//!
//! Turns batches of queue messages into ordered units of work bound to a
//! single orchestration or activity instance, and reports when the underlying
//! queue messages must have their visibility renewed.
//!
//! * [`OrchestrationSession`] buffers batches from the dispatch layer and hands
//!   them to one executor, shutting itself down after an idle timeout.
//! * [`ActivitySession`] wraps the single message of an activity invocation.
//! * [`SessionManager`] routes polled batches to per-instance sessions.
//! * [`VisibilityRenewer`] keeps in-flight messages invisible to other workers.

pub mod activity;
pub mod error;
pub mod manager;
pub mod orchestration;
pub mod renewal;
pub mod scope;
pub mod session;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use activity::ActivitySession;
pub use error::{Error, Result};
pub use manager::{Routed, SessionManager};
pub use orchestration::{MessageBatch, OrchestrationSession, SessionState};
pub use renewal::VisibilityRenewer;
pub use scope::SessionScope;
pub use session::{NEVER_EXPIRES, Session};
pub use settings::SessionSettings;
pub use transport::MessageTransport;
