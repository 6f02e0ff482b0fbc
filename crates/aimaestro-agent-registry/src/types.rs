//! Agent metadata and session data model.

use aimaestro_primitives::{AgentId, HostId, SessionIndex, TimestampMs};
use serde::{Deserialize, Serialize};

/// Whether a multiplexer session is reachable right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
	Online,
	Offline,
}

/// One multiplexer session belonging to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
	pub index: SessionIndex,
	pub tmux_session_name: String,
	pub working_directory: String,
	pub status: SessionStatus,
	pub last_active: TimestampMs,
}

/// Aggregate lifecycle state. An agent is `Active` iff at least one of its
/// sessions is `online`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
	Active,
	Offline,
}

/// AMP identity derived from the agent's keypair, mirrored here so callers
/// don't need to touch `aimaestro-identity` just to read an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmpIdentity {
	pub fingerprint: String,
	pub address: String,
}

/// One entry in the Agent Registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
	pub id: AgentId,
	/// Unique per host, `[A-Za-z0-9_-]+`.
	pub name: String,
	pub label: String,
	/// Legacy mirror of `name`, kept for external references created before
	/// `name` became the canonical handle.
	pub alias: String,
	pub host_id: HostId,
	pub working_directory: String,
	pub deployment: serde_json::Value,
	#[serde(default)]
	pub sessions: Vec<SessionInfo>,
	pub tools: serde_json::Value,
	pub preferences: serde_json::Value,
	pub status: AgentStatus,
	pub amp_identity: AmpIdentity,
	pub created_at: TimestampMs,
	pub last_active: TimestampMs,
	pub metadata: serde_json::Value,
}

impl Agent {
	/// True if any session is online; used to keep `status` consistent after
	/// a hibernate/wake changes one session's state.
	#[must_use]
	pub fn recompute_status(&self) -> AgentStatus {
		if self.sessions.iter().any(|s| s.status == SessionStatus::Online) {
			AgentStatus::Active
		} else {
			AgentStatus::Offline
		}
	}
}

/// On-disk shape of `agents/registry.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
	#[serde(default)]
	pub agents: Vec<Agent>,
}

/// Validates an agent name: non-empty, `[A-Za-z0-9_-]+`.
#[must_use]
pub fn is_valid_agent_name(name: &str) -> bool {
	!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn agent_name_validation() {
		assert!(is_valid_agent_name("lola"));
		assert!(is_valid_agent_name("lola-2"));
		assert!(!is_valid_agent_name("lola 2"));
		assert!(!is_valid_agent_name(""));
	}

	#[test]
	fn status_follows_any_online_session() {
		let mut agent = sample_agent();
		assert_eq!(agent.recompute_status(), AgentStatus::Offline);
		agent.sessions.push(SessionInfo {
			index: SessionIndex(0),
			tmux_session_name: "lola".into(),
			working_directory: "/tmp".into(),
			status: SessionStatus::Online,
			last_active: 0,
		});
		assert_eq!(agent.recompute_status(), AgentStatus::Active);
	}

	fn sample_agent() -> Agent {
		Agent {
			id: AgentId::new(),
			name: "lola".into(),
			label: "Lola".into(),
			alias: "lola".into(),
			host_id: HostId("forge".into()),
			working_directory: "/tmp".into(),
			deployment: serde_json::Value::Null,
			sessions: Vec::new(),
			tools: serde_json::Value::Null,
			preferences: serde_json::Value::Null,
			status: AgentStatus::Offline,
			amp_identity: AmpIdentity {
				fingerprint: "SHA256:abc".into(),
				address: "lola@forge.aimaestro.local".into(),
			},
			created_at: 0,
			last_active: 0,
			metadata: serde_json::Value::Null,
		}
	}
}
