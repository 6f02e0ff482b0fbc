//! Conversation Record: one row per discovered transcript file.

use bumpalo::Bump;
use helix_db::helix_engine::traversal_core::ops::g::G;
use helix_db::helix_engine::traversal_core::ops::source::n_from_index::NFromIndexAdapter;
use helix_db::helix_engine::traversal_core::ops::util::upsert::UpsertAdapter;
use helix_db::helix_engine::traversal_core::traversal_value::TraversalValue;
use helix_db::helix_engine::types::EngineError;
use helix_db::protocol::value::Value;

use crate::error::SchemaError;
use crate::store::{AgentDb, INDEX_SESSION_ID, LABEL_CONVERSATION};

/// Mirrors the `Conversation Record` entry in the data model.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRecord {
	pub jsonl_file: String,
	pub project_path: String,
	pub session_id: String,
	pub message_count: u64,
	pub first_message_at: i64,
	pub last_message_at: i64,
	pub first_user_message: String,
	pub model_names: String,
	pub git_branch: String,
	pub last_indexed_at: i64,
	pub last_indexed_message_count: u64,
}

fn node_to_record(node: &helix_db::utils::items::Node<'_>) -> ConversationRecord {
	fn s(node: &helix_db::utils::items::Node<'_>, key: &str) -> String {
		match node.get_property(key) {
			Some(Value::String(v)) => v.clone(),
			_ => String::new(),
		}
	}
	fn u(node: &helix_db::utils::items::Node<'_>, key: &str) -> u64 {
		match node.get_property(key) {
			Some(Value::U64(v)) => *v,
			_ => 0,
		}
	}
	fn i(node: &helix_db::utils::items::Node<'_>, key: &str) -> i64 {
		match node.get_property(key) {
			Some(Value::I64(v)) => *v,
			_ => 0,
		}
	}
	ConversationRecord {
		jsonl_file: s(node, "jsonl_file"),
		project_path: s(node, "project_path"),
		session_id: s(node, "session_id"),
		message_count: u(node, "message_count"),
		first_message_at: i(node, "first_message_at"),
		last_message_at: i(node, "last_message_at"),
		first_user_message: s(node, "first_user_message"),
		model_names: s(node, "model_names"),
		git_branch: s(node, "git_branch"),
		last_indexed_at: i(node, "last_indexed_at"),
		last_indexed_message_count: u(node, "last_indexed_message_count"),
	}
}

impl ConversationRecord {
	fn props(&self) -> Vec<(&'static str, Value)> {
		vec![
			("jsonl_file", Value::String(self.jsonl_file.clone())),
			("project_path", Value::String(self.project_path.clone())),
			("session_id", Value::String(self.session_id.clone())),
			("message_count", Value::U64(self.message_count)),
			("first_message_at", Value::I64(self.first_message_at)),
			("last_message_at", Value::I64(self.last_message_at)),
			("first_user_message", Value::String(self.first_user_message.clone())),
			("model_names", Value::String(self.model_names.clone())),
			("git_branch", Value::String(self.git_branch.clone())),
			("last_indexed_at", Value::I64(self.last_indexed_at)),
			("last_indexed_message_count", Value::U64(self.last_indexed_message_count)),
		]
	}
}

impl AgentDb {
	/// Reads the conversation record keyed by `session_id`, or `None` if it
	/// has never been discovered.
	pub fn get_conversation(&self, session_id: &str) -> Result<Option<ConversationRecord>, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;

		let result: Result<Option<ConversationRecord>, EngineError> = (|| {
			let mut found = None;
			for entry in
				G::new(storage, &txn, &arena).n_from_index(LABEL_CONVERSATION, INDEX_SESSION_ID, &session_id)
			{
				if let TraversalValue::Node(node) = entry? {
					found = Some(node_to_record(&node));
					break;
				}
			}
			Ok(found)
		})();

		match result {
			Ok(v) => Ok(v),
			Err(e) => crate::error::tolerate_missing(Err(SchemaError::from(e)), None),
		}
	}

	/// Upserts the conversation record for `record.session_id`. Idempotent:
	/// re-running with identical fields leaves the row unchanged.
	pub fn upsert_conversation(&self, record: &ConversationRecord) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let existing: Vec<TraversalValue<'_>> = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_CONVERSATION, INDEX_SESSION_ID, &record.session_id)
			.filter_map(|e| e.ok())
			.collect();

		let props = record.props();
		if existing.is_empty() {
			G::new_mut_from_iter(storage, &mut txn, std::iter::empty::<TraversalValue>(), &arena)
				.upsert_n(LABEL_CONVERSATION, &props)
				.collect::<Result<Vec<_>, _>>()
				.map_err(EngineError::from)?;
		} else {
			G::new_mut_from_iter(storage, &mut txn, existing.into_iter().map(Ok), &arena)
				.upsert_n(LABEL_CONVERSATION, &props)
				.collect::<Result<Vec<_>, _>>()
				.map_err(EngineError::from)?;
		}

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(session_id: &str, count: u64) -> ConversationRecord {
		ConversationRecord {
			jsonl_file: "/tmp/t.jsonl".into(),
			project_path: "/tmp/proj".into(),
			session_id: session_id.into(),
			message_count: count,
			first_message_at: 1,
			last_message_at: 2,
			first_user_message: "hi".into(),
			model_names: "claude".into(),
			git_branch: "main".into(),
			last_indexed_at: 0,
			last_indexed_message_count: 0,
		}
	}

	#[test]
	fn upsert_then_get_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();

		db.upsert_conversation(&sample("sess-1", 5)).unwrap();
		let got = db.get_conversation("sess-1").unwrap().unwrap();
		assert_eq!(got.message_count, 5);

		db.upsert_conversation(&sample("sess-1", 9)).unwrap();
		let got = db.get_conversation("sess-1").unwrap().unwrap();
		assert_eq!(got.message_count, 9);
	}

	#[test]
	fn missing_conversation_is_none_not_error() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		assert!(db.get_conversation("nope").unwrap().is_none());
	}
}
