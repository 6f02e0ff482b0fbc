//! Error types for the agent database.
//!
//! `relation_not_found` (a secondary index or node label that hasn't been
//! populated yet, typically during first-run migration) is represented here
//! so callers *inside* this crate can match on it, but it is never let past
//! the crate boundary: every public query collapses it to an empty/default
//! result before returning, per the tolerance rule in the component design.

use aimaestro_primitives::AimaestroError;
use helix_db::helix_engine::types::{EngineError, StorageError};

/// Errors returned by the agent database's internal operations.
#[derive(Debug)]
pub enum SchemaError {
	/// Generic I/O failure opening or writing the database file.
	Io(std::io::Error),
	/// Database engine failure.
	Engine(EngineError),
	/// A query addressed a relation (label or secondary index) that does
	/// not exist yet. Tolerated everywhere it can occur; never surfaced.
	RelationNotFound,
}

impl std::fmt::Display for SchemaError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Io(err) => write!(f, "{err}"),
			Self::Engine(err) => write!(f, "{err}"),
			Self::RelationNotFound => write!(f, "relation not found"),
		}
	}
}

impl std::error::Error for SchemaError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(err) => Some(err),
			Self::Engine(err) => Some(err),
			Self::RelationNotFound => None,
		}
	}
}

impl From<std::io::Error> for SchemaError {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

/// Callers above this crate (Subconscious, Indexing Pipeline, Memory
/// Consolidator) never see a bare `SchemaError`; anything that escapes
/// `tolerate_missing` becomes an integrity violation rather than its own
/// error kind, since by definition it's not a `RelationNotFound` the schema
/// is expected to recover from on its own.
impl From<SchemaError> for AimaestroError {
	fn from(err: SchemaError) -> Self {
		match err {
			SchemaError::Io(e) => AimaestroError::Io(e),
			other => AimaestroError::Integrity(other.to_string()),
		}
	}
}

impl From<EngineError> for SchemaError {
	fn from(err: EngineError) -> Self {
		if is_relation_not_found(&err) {
			Self::RelationNotFound
		} else {
			Self::Engine(err)
		}
	}
}

/// The engine has no typed "no such index/label" variant, so detection is
/// necessarily a substring match on the backend's error text. Covers both
/// "this secondary index was never created" (first run, before any document
/// of that kind has been indexed) and "this label has no nodes yet".
fn is_relation_not_found(err: &EngineError) -> bool {
	let EngineError::Storage(StorageError::Backend(msg)) = err else {
		return false;
	};
	let lower = msg.to_ascii_lowercase();
	lower.contains("index") && (lower.contains("not found") || lower.contains("no such") || lower.contains("unknown"))
}

/// Runs `f` and collapses a [`SchemaError::RelationNotFound`] to `default`.
///
/// Every C4 operation that queries a relation the code-graph or memory
/// pipeline may not have populated yet routes through this, so
/// `schema-not-ready` never escapes this crate.
pub fn tolerate_missing<T>(result: Result<T, SchemaError>, default: T) -> Result<T, SchemaError> {
	match result {
		Err(SchemaError::RelationNotFound) => Ok(default),
		other => other,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tolerate_missing_substitutes_default() {
		let result: Result<Vec<u32>, SchemaError> = Err(SchemaError::RelationNotFound);
		assert_eq!(tolerate_missing(result, Vec::new()).unwrap(), Vec::<u32>::new());
	}

	#[test]
	fn tolerate_missing_passes_through_other_errors() {
		let result: Result<Vec<u32>, SchemaError> = Err(SchemaError::Io(std::io::Error::other("disk")));
		assert!(tolerate_missing(result, Vec::new()).is_err());
	}
}
