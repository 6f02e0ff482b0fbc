//! Transcript discovery: deciding which files under the external agent
//! tool's projects directory belong to a given agent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use aimaestro_agent_registry::Agent;
use aimaestro_primitives::AgentId;
use walkdir::WalkDir;

/// One transcript file discovered on disk, with the header fields used to
/// decide ownership and the parsed turns used for delta indexing.
#[derive(Debug, Clone)]
pub struct Transcript {
	pub path: PathBuf,
	pub session_id: String,
	pub cwd: String,
}

/// One role-labeled turn parsed out of a transcript line.
#[derive(Debug, Clone)]
pub struct TranscriptTurn {
	pub message_id: String,
	pub role: String,
	pub content: String,
	pub model: String,
	pub timestamp: i64,
}

/// Walks `projects_dir` for `.jsonl` transcripts and decides which belong to
/// `agent`, per the discovery rule: session-id in the agent's session set,
/// cwd in the agent's known working directories, or the agent id appearing
/// in the transcript's path or cwd.
pub fn discover_for_agent(projects_dir: &Path, agent: &Agent) -> Vec<Transcript> {
	let known_sessions: HashSet<&str> = agent.sessions.iter().map(|s| s.tmux_session_name.as_str()).collect();
	let mut known_dirs: HashSet<&str> = agent.sessions.iter().map(|s| s.working_directory.as_str()).collect();
	known_dirs.insert(agent.working_directory.as_str());
	let agent_id_str = agent.id.to_string();

	let mut found = Vec::new();
	for entry in WalkDir::new(projects_dir).into_iter().filter_map(Result::ok) {
		if !entry.file_type().is_file() {
			continue;
		}
		if entry.path().extension().and_then(|e| e.to_str()) != Some("jsonl") {
			continue;
		}
		let Some(header) = read_header(entry.path()) else { continue };
		let path_str = entry.path().to_string_lossy();

		let belongs = known_sessions.contains(header.session_id.as_str())
			|| known_dirs.contains(header.cwd.as_str())
			|| path_str.contains(&agent_id_str)
			|| header.cwd.contains(&agent_id_str);

		if belongs {
			found.push(Transcript {
				path: entry.path().to_path_buf(),
				session_id: header.session_id,
				cwd: header.cwd,
			});
		}
	}
	found
}

struct Header {
	session_id: String,
	cwd: String,
}

/// Reads just enough of the transcript's first line to decide ownership,
/// without parsing the whole file.
fn read_header(path: &Path) -> Option<Header> {
	let content = std::fs::read_to_string(path).ok()?;
	let first_line = content.lines().find(|l| !l.trim().is_empty())?;
	let value: serde_json::Value = serde_json::from_str(first_line).ok()?;
	Some(Header {
		session_id: value.get("sessionId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
		cwd: value.get("cwd").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
	})
}

/// Parses lines `[start, end)` of a transcript's nonempty lines into turns.
/// `start`/`end` are 1-based counts of nonempty lines, matching
/// `last_indexed_message_count`/`currentLines` semantics.
pub fn parse_turn_range(path: &Path, start: usize, end: usize) -> Vec<TranscriptTurn> {
	let Ok(content) = std::fs::read_to_string(path) else { return Vec::new() };
	content
		.lines()
		.filter(|l| !l.trim().is_empty())
		.enumerate()
		.skip(start)
		.take(end.saturating_sub(start))
		.filter_map(|(idx, line)| parse_turn(line, idx))
		.collect()
}

/// Total count of nonempty lines in a transcript, i.e. `currentLines`.
#[must_use]
pub fn count_nonempty_lines(path: &Path) -> usize {
	std::fs::read_to_string(path).map(|c| c.lines().filter(|l| !l.trim().is_empty()).count()).unwrap_or(0)
}

fn parse_turn(line: &str, index: usize) -> Option<TranscriptTurn> {
	let value: serde_json::Value = serde_json::from_str(line).ok()?;
	let role = value.get("role").and_then(|v| v.as_str())?.to_string();
	let content = value.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
	let model = value.get("model").and_then(|v| v.as_str()).unwrap_or_default().to_string();
	let timestamp = value.get("timestamp").and_then(serde_json::Value::as_i64).unwrap_or(0);
	let message_id = value
		.get("messageId")
		.and_then(|v| v.as_str())
		.map(str::to_string)
		.unwrap_or_else(|| format!("line-{index}"));
	Some(TranscriptTurn { message_id, role, content, model, timestamp })
}

/// Derives the stable message id used for upsert-by-id, combining a
/// transcript's session id with its in-file id so the same line always
/// produces the same id across re-runs.
#[must_use]
pub fn stable_message_id(agent_id: AgentId, session_id: &str, turn: &TranscriptTurn) -> String {
	format!("{agent_id}:{session_id}:{}", turn.message_id)
}

#[cfg(test)]
mod tests {
	use super::*;
	use aimaestro_agent_registry::{AgentStatus, AmpIdentity};
	use aimaestro_primitives::HostId;

	fn sample_agent(id: AgentId, working_directory: &str) -> Agent {
		Agent {
			id,
			name: "lola".into(),
			label: "Lola".into(),
			alias: "lola".into(),
			host_id: HostId("forge".into()),
			working_directory: working_directory.into(),
			deployment: serde_json::Value::Null,
			sessions: Vec::new(),
			tools: serde_json::Value::Null,
			preferences: serde_json::Value::Null,
			status: AgentStatus::Active,
			amp_identity: AmpIdentity {
				fingerprint: "SHA256:abc".into(),
				address: "lola@forge.aimaestro.local".into(),
			},
			created_at: 0,
			last_active: 0,
			metadata: serde_json::Value::Null,
		}
	}

	fn write_transcript(dir: &Path, name: &str, session_id: &str, cwd: &str, turns: usize) -> PathBuf {
		let path = dir.join(name);
		let mut body = String::new();
		body.push_str(&format!("{{\"sessionId\":\"{session_id}\",\"cwd\":\"{cwd}\"}}\n"));
		for i in 0..turns {
			body.push_str(&format!(
				"{{\"role\":\"user\",\"content\":\"turn {i}\",\"model\":\"claude\",\"timestamp\":{i},\"messageId\":\"m{i}\"}}\n"
			));
		}
		std::fs::write(&path, body).unwrap();
		path
	}

	#[test]
	fn discovers_transcript_by_matching_cwd() {
		let dir = tempfile::tempdir().unwrap();
		write_transcript(dir.path(), "a.jsonl", "sess-x", "/home/lola/project", 3);
		let agent = sample_agent(AgentId::new(), "/home/lola/project");

		let found = discover_for_agent(dir.path(), &agent);
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].session_id, "sess-x");
	}

	#[test]
	fn ignores_transcript_belonging_to_another_agent() {
		let dir = tempfile::tempdir().unwrap();
		write_transcript(dir.path(), "a.jsonl", "sess-x", "/home/other/project", 1);
		let agent = sample_agent(AgentId::new(), "/home/lola/project");

		assert!(discover_for_agent(dir.path(), &agent).is_empty());
	}

	#[test]
	fn parse_turn_range_respects_start_and_end() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_transcript(dir.path(), "a.jsonl", "sess-x", "/tmp", 5);

		assert_eq!(count_nonempty_lines(&path), 6); // header + 5 turns
		let turns = parse_turn_range(&path, 1, 4);
		assert_eq!(turns.len(), 3);
		assert_eq!(turns[0].content, "turn 0");
	}
}
