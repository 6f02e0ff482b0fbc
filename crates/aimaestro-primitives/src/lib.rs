//! Shared identifiers, timestamps, and error types.
//!
//! This crate has no async runtime dependency and no I/O: every other crate
//! in the workspace depends on it, so it stays small and stable.

pub mod error;
pub mod ids;

pub use error::{AimaestroError, ConflictKind, Result};
pub use ids::{AgentId, HostId, MemoryId, PropagationId, RunId, SessionIndex};

/// Millisecond-precision UTC timestamp, the unit used throughout the data
/// model (`createdAt`, `lastActive`, `queued_at`, ...).
pub type TimestampMs = i64;

/// Returns the current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> TimestampMs {
	chrono::Utc::now().timestamp_millis()
}
