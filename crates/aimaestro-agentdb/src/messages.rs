//! Transcript messages ingested by the Subconscious's delta step.

use bumpalo::Bump;
use helix_db::helix_engine::traversal_core::ops::g::G;
use helix_db::helix_engine::traversal_core::ops::source::n_from_index::NFromIndexAdapter;
use helix_db::helix_engine::traversal_core::ops::source::n_from_type::NFromTypeAdapter;
use helix_db::helix_engine::traversal_core::ops::util::upsert::UpsertAdapter;
use helix_db::helix_engine::traversal_core::traversal_value::TraversalValue;
use helix_db::helix_engine::types::EngineError;
use helix_db::protocol::value::Value;

use crate::error::SchemaError;
use crate::store::{AgentDb, INDEX_MESSAGE_ID, LABEL_MESSAGE};

fn node_to_message(node: &helix_db::utils::items::Node<'_>) -> Message {
	fn s(node: &helix_db::utils::items::Node<'_>, key: &str) -> String {
		match node.get_property(key) {
			Some(Value::String(v)) => v.clone(),
			_ => String::new(),
		}
	}
	fn i(node: &helix_db::utils::items::Node<'_>, key: &str) -> i64 {
		match node.get_property(key) {
			Some(Value::I64(v)) => *v,
			_ => 0,
		}
	}
	Message {
		message_id: s(node, "message_id"),
		session_id: s(node, "session_id"),
		role: s(node, "role"),
		content: s(node, "content"),
		model: s(node, "model"),
		timestamp: i(node, "timestamp"),
	}
}

/// One role-labeled turn parsed out of a transcript line.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
	pub message_id: String,
	pub session_id: String,
	pub role: String,
	pub content: String,
	pub model: String,
	pub timestamp: i64,
}

impl Message {
	fn props(&self) -> Vec<(&'static str, Value)> {
		vec![
			("message_id", Value::String(self.message_id.clone())),
			("session_id", Value::String(self.session_id.clone())),
			("role", Value::String(self.role.clone())),
			("content", Value::String(self.content.clone())),
			("model", Value::String(self.model.clone())),
			("timestamp", Value::I64(self.timestamp)),
		]
	}
}

impl AgentDb {
	/// Upserts one message by `message_id`. Running the same delta batch
	/// twice (e.g. a retried ingest) is therefore a no-op the second time:
	/// the insert is keyed on the id, never appended blindly.
	pub fn upsert_message(&self, message: &Message) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let existing: Vec<TraversalValue<'_>> = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_MESSAGE, INDEX_MESSAGE_ID, &message.message_id)
			.filter_map(|e| e.ok())
			.collect();

		let props = message.props();
		if existing.is_empty() {
			G::new_mut_from_iter(storage, &mut txn, std::iter::empty::<TraversalValue>(), &arena)
				.upsert_n(LABEL_MESSAGE, &props)
				.collect::<Result<Vec<_>, _>>()
				.map_err(EngineError::from)?;
		} else {
			G::new_mut_from_iter(storage, &mut txn, existing.into_iter().map(Ok), &arena)
				.upsert_n(LABEL_MESSAGE, &props)
				.collect::<Result<Vec<_>, _>>()
				.map_err(EngineError::from)?;
		}

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}

	/// Ingests `messages` in insertion order, one upsert per message. The
	/// Subconscious calls this with batches of `batchSize` (default 10).
	pub fn ingest_messages(&self, messages: &[Message]) -> Result<usize, SchemaError> {
		let mut ingested = 0;
		for message in messages {
			self.upsert_message(message)?;
			ingested += 1;
		}
		Ok(ingested)
	}

	/// All messages belonging to `session_id`, ordered oldest-first. Used by
	/// the Memory Consolidator to assemble the conversation's compact text
	/// form; tolerates a conversation with no ingested messages yet.
	pub fn messages_for_session(&self, session_id: &str) -> Result<Vec<Message>, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;

		let result: Result<Vec<Message>, EngineError> = (|| {
			let mut messages: Vec<Message> = G::new(storage, &txn, &arena)
				.n_from_type(LABEL_MESSAGE)
				.filter_map(|e| e.ok())
				.filter_map(|tv| match tv {
					TraversalValue::Node(node) => Some(node_to_message(&node)),
					_ => None,
				})
				.filter(|m| m.session_id == session_id)
				.collect();
			messages.sort_by_key(|m| m.timestamp);
			Ok(messages)
		})();

		match result {
			Ok(v) => Ok(v),
			Err(e) => crate::error::tolerate_missing(Err(SchemaError::from(e)), Vec::new()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(id: &str) -> Message {
		Message {
			message_id: id.into(),
			session_id: "sess-1".into(),
			role: "user".into(),
			content: "hello".into(),
			model: "claude".into(),
			timestamp: 1,
		}
	}

	#[test]
	fn upserting_same_message_id_twice_does_not_duplicate() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();

		db.upsert_message(&sample("msg-1")).unwrap();
		let mut repeated = sample("msg-1");
		repeated.content = "hello again".into();
		db.upsert_message(&repeated).unwrap();

		let storage = db.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().unwrap();
		let count = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_MESSAGE, INDEX_MESSAGE_ID, &"msg-1")
			.filter_map(|e| e.ok())
			.count();
		assert_eq!(count, 1);
	}

	#[test]
	fn ingest_messages_reports_count() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		let batch = vec![sample("a"), sample("b"), sample("c")];
		assert_eq!(db.ingest_messages(&batch).unwrap(), 3);
	}

	#[test]
	fn messages_for_session_are_ordered_oldest_first() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();

		let mut first = sample("a");
		first.timestamp = 2;
		let mut second = sample("b");
		second.timestamp = 1;
		db.ingest_messages(&[first, second]).unwrap();

		let messages = db.messages_for_session("sess-1").unwrap();
		assert_eq!(messages.len(), 2);
		assert_eq!(messages[0].message_id, "b");
		assert_eq!(messages[1].message_id, "a");
	}

	#[test]
	fn messages_for_unknown_session_is_empty_not_error() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		assert!(db.messages_for_session("nope").unwrap().is_empty());
	}
}
