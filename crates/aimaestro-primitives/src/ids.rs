//! Newtype identifiers shared across the daemon's services.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical lowercase hostname, dot-local suffix stripped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(pub String);

impl HostId {
	/// Builds a `HostId` from a raw hostname, applying the canonicalization
	/// rule from the Host data model: lowercase, `.local` suffix stripped.
	pub fn canonicalize(raw: &str) -> Self {
		let lower = raw.trim().to_ascii_lowercase();
		let stripped = lower.strip_suffix(".local").unwrap_or(&lower);
		Self(stripped.to_string())
	}
}

impl fmt::Display for HostId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Unique identifier for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
	/// Allocates a fresh random agent id.
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for AgentId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for AgentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

/// Zero-based multiplexer session index for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionIndex(pub u32);

/// Opaque propagation id attached to one peer-sync wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropagationId(pub Uuid);

impl PropagationId {
	/// Allocates a fresh propagation id for a newly originated sync wave.
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for PropagationId {
	fn default() -> Self {
		Self::new()
	}
}

/// Identifier for a memory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
	/// Allocates a fresh memory id.
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for MemoryId {
	fn default() -> Self {
		Self::new()
	}
}

/// Identifier for one consolidation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
	/// Allocates a fresh run id.
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for RunId {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn canonicalize_strips_dot_local_and_lowercases() {
		assert_eq!(HostId::canonicalize("Forge.local").0, "forge");
		assert_eq!(HostId::canonicalize("FORGE").0, "forge");
		assert_eq!(HostId::canonicalize("forge.example.com").0, "forge.example.com");
	}
}
