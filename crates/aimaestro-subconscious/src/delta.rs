//! Delta step: ingest the unindexed tail of one transcript into the
//! message store and refresh its Conversation Record.

use aimaestro_agentdb::{AgentDb, ConversationRecord, Message};
use aimaestro_primitives::{now_ms, AgentId, Result};

use crate::discovery::{self, Transcript, TranscriptTurn};

/// Default batch size for ingesting parsed turns, per the component design.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Outcome of one delta step, for logging/metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaOutcome {
	pub messages_ingested: usize,
	pub skipped: bool,
}

/// Runs the delta step for one transcript: skips if nothing new, otherwise
/// parses the unindexed tail, ingests it in batches, and updates the
/// Conversation Record's watermark.
pub fn run_delta(db: &AgentDb, agent_id: AgentId, transcript: &Transcript, batch_size: usize) -> Result<DeltaOutcome> {
	let current_lines = discovery::count_nonempty_lines(&transcript.path);
	let record = db.get_conversation(&transcript.session_id)?;
	let last_indexed = record.as_ref().map(|r| r.last_indexed_message_count).unwrap_or(0) as usize;

	if current_lines <= last_indexed {
		return Ok(DeltaOutcome { messages_ingested: 0, skipped: true });
	}

	let turns = discovery::parse_turn_range(&transcript.path, last_indexed, current_lines);
	let mut ingested = 0;
	for batch in turns.chunks(batch_size.max(1)) {
		let messages: Vec<Message> = batch
			.iter()
			.map(|turn| turn_to_message(agent_id, &transcript.session_id, turn))
			.collect();
		ingested += db.ingest_messages(&messages)?;
	}

	let now = now_ms();
	let mut updated = record.unwrap_or_else(|| ConversationRecord {
		jsonl_file: transcript.path.to_string_lossy().to_string(),
		project_path: transcript.cwd.clone(),
		session_id: transcript.session_id.clone(),
		message_count: 0,
		first_message_at: turns.first().map(|t| t.timestamp).unwrap_or(now),
		last_message_at: now,
		first_user_message: turns.iter().find(|t| t.role == "user").map(|t| t.content.clone()).unwrap_or_default(),
		model_names: turns.first().map(|t| t.model.clone()).unwrap_or_default(),
		git_branch: String::new(),
		last_indexed_at: 0,
		last_indexed_message_count: 0,
	});
	updated.message_count = current_lines as u64;
	updated.last_message_at = turns.last().map(|t| t.timestamp).unwrap_or(updated.last_message_at);
	updated.last_indexed_at = now;
	updated.last_indexed_message_count = current_lines as u64;
	db.upsert_conversation(&updated)?;

	Ok(DeltaOutcome { messages_ingested: ingested, skipped: false })
}

fn turn_to_message(agent_id: AgentId, session_id: &str, turn: &TranscriptTurn) -> Message {
	Message {
		message_id: discovery::stable_message_id(agent_id, session_id, turn),
		session_id: session_id.to_string(),
		role: turn.role.clone(),
		content: turn.content.clone(),
		model: turn.model.clone(),
		timestamp: turn.timestamp,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	fn write_transcript(dir: &std::path::Path, turns: usize) -> PathBuf {
		let path = dir.join("a.jsonl");
		let mut body = String::from("{\"sessionId\":\"sess-1\",\"cwd\":\"/tmp\"}\n");
		for i in 0..turns {
			body.push_str(&format!(
				"{{\"role\":\"user\",\"content\":\"turn {i}\",\"model\":\"claude\",\"timestamp\":{i},\"messageId\":\"m{i}\"}}\n"
			));
		}
		std::fs::write(&path, body).unwrap();
		path
	}

	#[test]
	fn first_delta_ingests_every_turn_and_sets_watermark() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_transcript(dir.path(), 3);
		let db_dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&db_dir.path().join("agent.db")).unwrap();

		let transcript = Transcript { path, session_id: "sess-1".into(), cwd: "/tmp".into() };
		let agent_id = AgentId::new();
		let outcome = run_delta(&db, agent_id, &transcript, DEFAULT_BATCH_SIZE).unwrap();

		assert!(!outcome.skipped);
		assert_eq!(outcome.messages_ingested, 3);
		let record = db.get_conversation("sess-1").unwrap().unwrap();
		assert_eq!(record.last_indexed_message_count, 4); // header + 3 turns
	}

	#[test]
	fn second_delta_with_no_new_lines_is_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_transcript(dir.path(), 3);
		let db_dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&db_dir.path().join("agent.db")).unwrap();
		let transcript = Transcript { path, session_id: "sess-1".into(), cwd: "/tmp".into() };
		let agent_id = AgentId::new();

		run_delta(&db, agent_id, &transcript, DEFAULT_BATCH_SIZE).unwrap();
		let second = run_delta(&db, agent_id, &transcript, DEFAULT_BATCH_SIZE).unwrap();
		assert!(second.skipped);
	}

	#[test]
	fn rerunning_same_range_is_idempotent_via_upsert() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_transcript(dir.path(), 3);
		let db_dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&db_dir.path().join("agent.db")).unwrap();
		let transcript = Transcript { path, session_id: "sess-1".into(), cwd: "/tmp".into() };
		let agent_id = AgentId::new();

		run_delta(&db, agent_id, &transcript, DEFAULT_BATCH_SIZE).unwrap();
		let messages_first = db.messages_for_session("sess-1").unwrap();

		// Force a re-run of the same range by resetting the watermark.
		let mut record = db.get_conversation("sess-1").unwrap().unwrap();
		record.last_indexed_message_count = 0;
		db.upsert_conversation(&record).unwrap();
		run_delta(&db, agent_id, &transcript, DEFAULT_BATCH_SIZE).unwrap();

		let messages_second = db.messages_for_session("sess-1").unwrap();
		assert_eq!(messages_first.len(), messages_second.len());
	}
}
