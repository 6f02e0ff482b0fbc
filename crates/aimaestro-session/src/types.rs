//! Session data model and the normative session-name derivation rule.

use std::path::PathBuf;

use aimaestro_primitives::TimestampMs;
use serde::{Deserialize, Serialize};

/// Recorded intent for one multiplexer session: `{id, workingDirectory,
/// createdAt}`. `id` is the derived `tmuxSessionName`, not the raw
/// `SessionIndex` — it is what ground truth (the multiplexer's live session
/// list) is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
	pub id: String,
	pub working_directory: PathBuf,
	pub created_at: TimestampMs,
}

/// On-disk shape of `sessions.json`, one per agent directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsFile {
	#[serde(default)]
	pub sessions: Vec<SessionRecord>,
}

/// Enforces `[A-Za-z0-9_-]` on an agent name for use in a session name,
/// dropping any other character.
#[must_use]
pub fn sanitize(agent_name: &str) -> String {
	agent_name.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-').collect()
}

/// `sessionName = sanitize(agentName) + (index>0 ? "-"+index : "")`.
#[must_use]
pub fn derive_session_name(agent_name: &str, index: u32) -> String {
	let base = sanitize(agent_name);
	if index > 0 {
		format!("{base}-{index}")
	} else {
		base
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn index_zero_has_no_suffix() {
		assert_eq!(derive_session_name("lola", 0), "lola");
	}

	#[test]
	fn nonzero_index_is_suffixed() {
		assert_eq!(derive_session_name("lola", 1), "lola-1");
		assert_eq!(derive_session_name("lola", 12), "lola-12");
	}

	#[test]
	fn sanitize_strips_disallowed_characters() {
		assert_eq!(sanitize("lo la!"), "lola");
		assert_eq!(sanitize("agent.name@host"), "agentnamehost");
	}
}
