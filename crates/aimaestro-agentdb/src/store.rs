//! `AgentDb`: the thin typed handle every other component holds for the
//! lifetime of an active agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bumpalo::Bump;
use helix_db::helix_engine::storage_core::version_info::VersionInfo;
use helix_db::helix_engine::storage_core::HelixGraphStorage;
use helix_db::helix_engine::traversal_core::ops::source::n_from_type::NFromTypeAdapter;
use helix_db::helix_engine::traversal_core::ops::g::G;

use crate::config::SCHEMA_CONFIG;
use crate::error::SchemaError;

/// Node and edge labels used by this schema. Kept as constants rather than
/// re-derived from `schema.hql` at runtime so callers get compile-time typos
/// instead of a `relation_not_found` at query time.
pub const LABEL_CONVERSATION: &str = "Conversation";
pub const LABEL_MESSAGE: &str = "Message";
pub const LABEL_MEMORY: &str = "Memory";
pub const LABEL_CODE_FILE: &str = "CodeFile";
pub const LABEL_CODE_FUNCTION: &str = "CodeFunction";
pub const LABEL_CODE_COMPONENT: &str = "CodeComponent";

pub const INDEX_SESSION_ID: &str = "session_id";
pub const INDEX_MESSAGE_ID: &str = "message_id";
pub const INDEX_MEMORY_ID: &str = "memory_id";
pub const INDEX_URI: &str = "uri";

/// Secondary indices the schema is opened with. Every `n_from_index` lookup
/// in this crate addresses one of these.
pub const SECONDARY_INDICES: &[&str] = &[INDEX_SESSION_ID, INDEX_MESSAGE_ID, INDEX_MEMORY_ID, INDEX_URI];

/// Thin typed wrapper around one agent's embedded graph database.
///
/// Opened once per agent and held for its entire active lifetime (the
/// broker, subconscious loop, and indexing pipeline all share the same
/// handle); callers must not close it early.
pub struct AgentDb {
	storage: Arc<HelixGraphStorage>,
	path: PathBuf,
}

impl AgentDb {
	/// Opens (creating if absent) the agent database at `path`.
	///
	/// Schema installation is a property of [`HelixGraphStorage::new`]
	/// itself: calling `open` again against the same path with the same
	/// compiled schema is a no-op, which is what satisfies the
	/// "`initializeSchema` is idempotent" requirement.
	pub fn open(path: &Path) -> Result<Self, SchemaError> {
		std::fs::create_dir_all(path)?;
		let path_str = path.to_str().unwrap_or("agent.db");
		let storage = HelixGraphStorage::new(path_str, SCHEMA_CONFIG.clone(), VersionInfo::default())?;
		Ok(Self {
			storage: Arc::new(storage),
			path: path.to_path_buf(),
		})
	}

	/// Explicit, callable-many-times schema check. A no-op beyond the first
	/// call: existence of the database at `self.path` already implies the
	/// schema from [`open`](Self::open) is installed.
	pub fn initialize_schema(&self) -> Result<(), SchemaError> {
		let arena = Bump::new();
		let txn = self.storage.graph_env.read_txn().map_err(helix_db::helix_engine::types::EngineError::from)?;
		let _ = G::new(&self.storage, &txn, &arena)
			.n_from_type(LABEL_CONVERSATION)
			.collect::<Result<Vec<_>, _>>();
		Ok(())
	}

	#[must_use]
	pub fn storage(&self) -> &Arc<HelixGraphStorage> {
		&self.storage
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// Builds an [`ImmutablePropertiesMap`] from key-value entries, mirroring
/// the teacher's workspace-index `build_props` helper.
pub(crate) fn build_props<'arena>(
	arena: &'arena Bump,
	entries: Vec<(&'static str, helix_db::protocol::value::Value)>,
) -> helix_db::utils::properties::ImmutablePropertiesMap<'arena> {
	let prop_count = entries.len();
	helix_db::utils::properties::ImmutablePropertiesMap::new(
		prop_count,
		entries.into_iter().map(|(k, v)| {
			let k: &str = arena.alloc_str(k);
			(k, v)
		}),
		arena,
	)
}

/// Escapes a string for safe embedding in a datalog string literal:
/// backslashes and double quotes are escaped, and embedded newlines are
/// stripped since no legitimate property value needs one.
#[must_use]
pub fn escape_literal(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	for ch in raw.chars() {
		match ch {
			'\\' => out.push_str("\\\\"),
			'"' => out.push_str("\\\""),
			'\n' | '\r' => out.push(' '),
			other => out.push(other),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn open_twice_at_same_path_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let db_path = dir.path().join("agent.db");
		let first = AgentDb::open(&db_path).unwrap();
		first.initialize_schema().unwrap();
		drop(first);

		let second = AgentDb::open(&db_path).unwrap();
		second.initialize_schema().unwrap();
		second.initialize_schema().unwrap();
	}

	#[test]
	fn escape_literal_neutralizes_quotes_and_backslashes() {
		assert_eq!(escape_literal(r#"he said "hi"\now"#), r#"he said \"hi\"\\now"#);
		assert_eq!(escape_literal("line1\nline2"), "line1 line2");
	}
}
