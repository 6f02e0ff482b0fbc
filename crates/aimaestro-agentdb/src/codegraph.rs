//! Code-graph nodes and edges populated by the Indexing Pipeline.
//!
//! Every edge table here is optional at query time: a fresh agent database
//! has no `Imports`/`Calls`/... edges until the first full index runs, and
//! callers must see an empty result rather than an error for that case.

use bumpalo::Bump;
use helix_db::helix_engine::traversal_core::ops::g::G;
use helix_db::helix_engine::traversal_core::ops::source::add_e::AddEAdapter;
use helix_db::helix_engine::traversal_core::ops::source::e_from_type::EFromTypeAdapter;
use helix_db::helix_engine::traversal_core::ops::source::n_from_index::NFromIndexAdapter;
use helix_db::helix_engine::traversal_core::ops::util::upsert::UpsertAdapter;
use helix_db::helix_engine::traversal_core::traversal_value::TraversalValue;
use helix_db::helix_engine::types::EngineError;
use helix_db::protocol::value::Value;

use crate::error::SchemaError;
use crate::store::{AgentDb, INDEX_URI, LABEL_CODE_FILE, LABEL_CODE_FUNCTION};

/// The code-graph edge kinds named in the data model. Each is its own Helix
/// label, matching `schema.hql`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeEdgeKind {
	Imports,
	Calls,
	Extends,
	Includes,
	Associations,
	Serializes,
	Declares,
}

impl CodeEdgeKind {
	fn label(self) -> &'static str {
		match self {
			Self::Imports => "Imports",
			Self::Calls => "Calls",
			Self::Extends => "Extends",
			Self::Includes => "Includes",
			Self::Associations => "Associations",
			Self::Serializes => "Serializes",
			Self::Declares => "Declares",
		}
	}
}

/// A discovered source file, tracked so delta indexing can tell whether its
/// content changed since the last full or delta pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeFile {
	pub uri: String,
	pub hash: String,
	pub mtime: u64,
}

impl AgentDb {
	/// Upserts a `CodeFile` node keyed by `uri`.
	pub fn upsert_code_file(&self, file: &CodeFile) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let existing: Vec<TraversalValue<'_>> = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_CODE_FILE, INDEX_URI, &file.uri)
			.filter_map(|e| e.ok())
			.collect();

		let props = vec![
			("uri", Value::String(file.uri.clone())),
			("hash", Value::String(file.hash.clone())),
			("mtime", Value::U64(file.mtime)),
		];
		G::new_mut_from_iter(storage, &mut txn, existing.into_iter().map(Ok), &arena)
			.upsert_n(LABEL_CODE_FILE, &props)
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}

	/// Whether `uri` already has file metadata recorded. `indexProjectDelta`
	/// falls back to a full index the first time this is false for a
	/// project, then relies on it afterward.
	pub fn has_file_metadata(&self, uri: &str) -> Result<bool, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;

		let result: Result<bool, EngineError> = (|| {
			Ok(G::new(storage, &txn, &arena)
				.n_from_index(LABEL_CODE_FILE, INDEX_URI, &uri)
				.next()
				.is_some())
		})();

		match result {
			Ok(v) => Ok(v),
			Err(e) => crate::error::tolerate_missing(Err(SchemaError::from(e)), false),
		}
	}

	/// Reads back the stored hash/mtime for `uri`, if any.
	pub fn code_file_metadata(&self, uri: &str) -> Result<Option<CodeFile>, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;

		let result: Result<Option<CodeFile>, EngineError> = (|| {
			for entry in G::new(storage, &txn, &arena).n_from_index(LABEL_CODE_FILE, INDEX_URI, &uri) {
				if let TraversalValue::Node(node) = entry? {
					let hash = match node.get_property("hash") {
						Some(Value::String(s)) => s.clone(),
						_ => String::new(),
					};
					let mtime = match node.get_property("mtime") {
						Some(Value::U64(v)) => *v,
						_ => 0,
					};
					return Ok(Some(CodeFile {
						uri: uri.to_string(),
						hash,
						mtime,
					}));
				}
			}
			Ok(None)
		})();

		match result {
			Ok(v) => Ok(v),
			Err(e) => crate::error::tolerate_missing(Err(SchemaError::from(e)), None),
		}
	}

	/// Upserts a `CodeFunction` node identified by `(uri, name)`.
	pub fn upsert_code_function(&self, uri: &str, name: &str, signature: &str) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let existing: Vec<TraversalValue<'_>> = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_CODE_FUNCTION, INDEX_URI, &uri)
			.filter_map(|e| e.ok())
			.collect();

		let props = vec![
			("uri", Value::String(uri.to_string())),
			("name", Value::String(name.to_string())),
			("signature", Value::String(signature.to_string())),
		];
		G::new_mut_from_iter(storage, &mut txn, existing.into_iter().map(Ok), &arena)
			.upsert_n(LABEL_CODE_FUNCTION, &props)
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}

	/// Inserts a directed code-graph edge. Both endpoints must already
	/// exist as `CodeFile` nodes addressed by `from_uri`/`to_uri`; a missing
	/// endpoint is a silent no-op rather than an error, since the two ends
	/// of an edge may be discovered in either order during a crawl.
	pub fn add_code_edge(&self, kind: CodeEdgeKind, from_uri: &str, to_uri: &str) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let from_node = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_CODE_FILE, INDEX_URI, &from_uri)
			.filter_map(|e| e.ok())
			.next();
		let to_node = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_CODE_FILE, INDEX_URI, &to_uri)
			.filter_map(|e| e.ok())
			.next();

		let (Some(TraversalValue::Node(from_node)), Some(TraversalValue::Node(to_node))) = (from_node, to_node) else {
			return Ok(());
		};

		G::new_mut(storage, &arena, &mut txn)
			.add_edge(kind.label(), None, from_node.id(), to_node.id(), false, false)
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}

	/// Counts edges of `kind`. A project that has never had that edge kind
	/// populated (e.g. a language with no `Extends` relation) yields `0`,
	/// not an error.
	pub fn count_code_edges(&self, kind: CodeEdgeKind) -> Result<usize, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;

		let result: Result<usize, EngineError> =
			(|| Ok(G::new(storage, &txn, &arena).e_from_type(kind.label()).filter_map(|e| e.ok()).count()))();

		match result {
			Ok(v) => Ok(v),
			Err(e) => crate::error::tolerate_missing(Err(SchemaError::from(e)), 0),
		}
	}
}
