//! Discriminated error kinds shared by every component.
//!
//! Mirrors the taxonomy in the error handling design: validation, conflict,
//! not-found, transient remote, integrity, and resource exhaustion each get a
//! distinct variant so callers can branch on `kind()` instead of parsing
//! messages. `schema-not-ready` deliberately has no variant here: it is
//! collapsed to an empty/default result inside the agent database before it
//! ever reaches a component boundary, and must never propagate to a caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The specific kind of conflict encountered by a mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
	/// A host id, URL, or alias collided with an existing non-self host.
	HostAlreadyKnown,
	/// Two hosts' organizations are both set and differ.
	OrganizationMismatch,
	/// An agent with the requested name already exists on this host.
	AgentNameTaken,
	/// An import target already has a non-matching directory/repo.
	ArchiveTargetExists,
}

impl std::fmt::Display for ConflictKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Self::HostAlreadyKnown => "host already known",
			Self::OrganizationMismatch => "organization mismatch",
			Self::AgentNameTaken => "agent name already taken",
			Self::ArchiveTargetExists => "archive target already exists",
		};
		f.write_str(s)
	}
}

/// The unified error type returned by every fallible public operation.
#[derive(Debug, Error)]
pub enum AimaestroError {
	/// Missing or malformed input; not locally recoverable.
	#[error("validation: {0}")]
	Validation(String),
	/// A collision the caller can retry with different inputs.
	#[error("conflict: {0}")]
	Conflict(ConflictKind),
	/// The referenced agent, session, peer, or memory does not exist.
	#[error("not found: {0}")]
	NotFound(String),
	/// A remote call (peer, provider) failed transiently; safe to retry.
	#[error("transient remote failure: {0}")]
	TransientRemote(String),
	/// Signature verification or fingerprint check failed.
	#[error("integrity violation: {0}")]
	Integrity(String),
	/// A bounded resource (PTY slots, queue depth) is exhausted.
	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),
	/// Underlying I/O failure.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// Underlying JSON (de)serialization failure.
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl AimaestroError {
	/// Shorthand for a [`AimaestroError::Validation`].
	pub fn validation(msg: impl Into<String>) -> Self {
		Self::Validation(msg.into())
	}

	/// Shorthand for a [`AimaestroError::NotFound`].
	pub fn not_found(msg: impl Into<String>) -> Self {
		Self::NotFound(msg.into())
	}

	/// True for error kinds that are safe for a background loop to retry on
	/// the next cycle without surfacing to the user.
	#[must_use]
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::TransientRemote(_))
	}
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, AimaestroError>;
