//! Message types for the dtq session layer.
//!
//! This crate contains the serde-serializable types that flow from the queue
//! transport into sessions. They represent the "data layer" only - the
//! shapes of messages as the transport hands them over.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small accessors
//! * Immutable once received: sessions only read envelopes
//! * Transport-agnostic: queue metadata is carried, never interpreted
//!
//! Buffering, expiration and lifecycle live on top of these types in `dtq-runtime`.

pub mod instance;
pub mod message;

pub use instance::*;
pub use message::*;
