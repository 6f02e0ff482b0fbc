//! Long-term memories: the Memory Consolidator's storage surface.
//!
//! Each memory row has an associated embedding stored in the same database
//! as an `HVector` under the `MemoryEmbedding` label, keyed back to the
//! owning memory by the `memory_id` property so a nearest-neighbor search
//! can be joined back to its row.

use bumpalo::Bump;
use helix_db::helix_engine::traversal_core::ops::g::G;
use helix_db::helix_engine::traversal_core::ops::source::add_e::AddEAdapter;
use helix_db::helix_engine::traversal_core::ops::source::n_from_index::NFromIndexAdapter;
use helix_db::helix_engine::traversal_core::ops::util::upsert::UpsertAdapter;
use helix_db::helix_engine::traversal_core::ops::vectors::insert::InsertVAdapter;
use helix_db::helix_engine::traversal_core::ops::vectors::search::SearchVAdapter;
use helix_db::helix_engine::traversal_core::traversal_value::TraversalValue;
use helix_db::helix_engine::types::EngineError;
use helix_db::helix_engine::vector_core::vector::HVector;
use helix_db::protocol::value::Value;

use crate::error::SchemaError;
use crate::store::{AgentDb, INDEX_MEMORY_ID, LABEL_MEMORY};

const LABEL_MEMORY_EMBEDDING: &str = "MemoryEmbedding";

/// Memory tier, promoted monotonically short -> warm -> long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
	Short,
	Warm,
	Long,
}

impl Tier {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Short => "short",
			Self::Warm => "warm",
			Self::Long => "long",
		}
	}

	fn parse(s: &str) -> Self {
		match s {
			"warm" => Self::Warm,
			"long" => Self::Long,
			_ => Self::Short,
		}
	}
}

/// `system=1` categories per the data model; everything else is system 2.
#[must_use]
pub fn system_for_category(category: &str) -> u32 {
	matches!(category, "fact" | "decision" | "preference") as u32 + 1
}

#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
	pub memory_id: String,
	pub tier: Tier,
	pub system: u32,
	pub category: String,
	pub content: String,
	pub context: String,
	pub confidence: f64,
	pub reinforcement_count: u32,
	pub access_count: u32,
	pub created_at: i64,
	pub last_reinforced_at: i64,
	pub promoted_at: i64,
}

impl Memory {
	fn props(&self) -> Vec<(&'static str, Value)> {
		vec![
			("memory_id", Value::String(self.memory_id.clone())),
			("tier", Value::String(self.tier.as_str().to_string())),
			("system", Value::U32(self.system)),
			("category", Value::String(self.category.clone())),
			("content", Value::String(self.content.clone())),
			("context", Value::String(self.context.clone())),
			("confidence", Value::F64(self.confidence)),
			("reinforcement_count", Value::U32(self.reinforcement_count)),
			("access_count", Value::U32(self.access_count)),
			("created_at", Value::I64(self.created_at)),
			("last_reinforced_at", Value::I64(self.last_reinforced_at)),
			("promoted_at", Value::I64(self.promoted_at)),
		]
	}
}

fn node_to_memory(node: &helix_db::utils::items::Node<'_>) -> Memory {
	fn s(node: &helix_db::utils::items::Node<'_>, key: &str) -> String {
		match node.get_property(key) {
			Some(Value::String(v)) => v.clone(),
			_ => String::new(),
		}
	}
	fn u32v(node: &helix_db::utils::items::Node<'_>, key: &str) -> u32 {
		match node.get_property(key) {
			Some(Value::U32(v)) => *v,
			_ => 0,
		}
	}
	fn i(node: &helix_db::utils::items::Node<'_>, key: &str) -> i64 {
		match node.get_property(key) {
			Some(Value::I64(v)) => *v,
			_ => 0,
		}
	}
	fn f(node: &helix_db::utils::items::Node<'_>, key: &str) -> f64 {
		match node.get_property(key) {
			Some(Value::F64(v)) => *v,
			_ => 0.0,
		}
	}
	Memory {
		memory_id: s(node, "memory_id"),
		tier: Tier::parse(&s(node, "tier")),
		system: u32v(node, "system"),
		category: s(node, "category"),
		content: s(node, "content"),
		context: s(node, "context"),
		confidence: f(node, "confidence"),
		reinforcement_count: u32v(node, "reinforcement_count"),
		access_count: u32v(node, "access_count"),
		created_at: i(node, "created_at"),
		last_reinforced_at: i(node, "last_reinforced_at"),
		promoted_at: i(node, "promoted_at"),
	}
}

/// A candidate neighbor surfaced by [`AgentDb::nearest_memories`], in
/// nearest-first order.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryNeighbor {
	pub memory_id: String,
	pub rank: usize,
	/// Raw HVector distance to the query embedding (smaller is closer).
	pub distance: f64,
}

impl AgentDb {
	/// Inserts a brand-new short-tier memory plus its embedding.
	pub fn create_memory(&self, memory: &Memory, embedding: &[f64]) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		G::new_mut_from_iter(storage, &mut txn, std::iter::empty::<TraversalValue>(), &arena)
			.upsert_n(LABEL_MEMORY, &memory.props())
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		let query: &[f64] = arena.alloc_slice_copy(embedding);
		let props = crate::store::build_props(&arena, vec![("memory_id", Value::String(memory.memory_id.clone()))]);
		G::new_mut(storage, &arena, &mut txn)
			.insert_v::<fn(&HVector<'_>, &heed3::RoTxn<'_>) -> bool>(query, LABEL_MEMORY_EMBEDDING, Some(props))
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}

	/// Finds the `k` nearest memory embeddings to `embedding`. Tolerates a
	/// store with no embeddings yet (first memory ever created). Results are
	/// nearest-first; `distance` is the raw `HVector` metric so callers can
	/// compare it against a dedupe threshold rather than trusting rank alone.
	pub fn nearest_memories(&self, embedding: &[f64], k: usize) -> Result<Vec<MemoryNeighbor>, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;
		let query: &[f64] = arena.alloc_slice_copy(embedding);

		let result: Result<Vec<MemoryNeighbor>, EngineError> = G::new(storage, &txn, &arena)
			.search_v::<fn(&HVector<'_>, &heed3::RoTxn<'_>) -> bool, usize>(query, k, LABEL_MEMORY_EMBEDDING, None)
			.enumerate()
			.map(|(rank, entry)| {
				entry.map(|tv| match tv {
					TraversalValue::Vector(v) => MemoryNeighbor {
						memory_id: match v.get_property("memory_id") {
							Some(Value::String(s)) => s.clone(),
							_ => String::new(),
						},
						rank,
						distance: v.distance,
					},
					_ => MemoryNeighbor {
						memory_id: String::new(),
						rank,
						distance: f64::MAX,
					},
				})
			})
			.collect();

		match result {
			Ok(v) => Ok(v),
			Err(e) => crate::error::tolerate_missing(Err(SchemaError::from(e)), Vec::new()),
		}
	}

	/// Looks up a single memory row by id. Returns `None` rather than an
	/// error when the id is unknown.
	pub fn get_memory(&self, memory_id: &str) -> Result<Option<Memory>, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let txn = storage.graph_env.read_txn().map_err(EngineError::from)?;

		for entry in G::new(storage, &txn, &arena).n_from_index(LABEL_MEMORY, INDEX_MEMORY_ID, &memory_id) {
			if let TraversalValue::Node(node) = entry.map_err(EngineError::from)? {
				return Ok(Some(node_to_memory(&node)));
			}
		}
		Ok(None)
	}

	/// Reinforces an existing memory: bumps `reinforcement_count`, refreshes
	/// `last_reinforced_at`, and raises confidence by a bounded amount.
	pub fn reinforce_memory(&self, memory_id: &str, now: i64, confidence_bump: f64) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let mut memory = None;
		for entry in G::new(storage, &txn, &arena).n_from_index(LABEL_MEMORY, INDEX_MEMORY_ID, &memory_id) {
			if let TraversalValue::Node(node) = entry.map_err(EngineError::from)? {
				memory = Some(node_to_memory(&node));
				break;
			}
		}
		let Some(mut memory) = memory else {
			return Ok(());
		};
		memory.reinforcement_count += 1;
		memory.last_reinforced_at = now;
		memory.confidence = (memory.confidence + confidence_bump).min(1.0);

		let target: Vec<TraversalValue<'_>> = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_MEMORY, INDEX_MEMORY_ID, &memory_id)
			.filter_map(|e| e.ok())
			.collect();
		G::new_mut_from_iter(storage, &mut txn, target.into_iter().map(Ok), &arena)
			.upsert_n(LABEL_MEMORY, &memory.props())
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}

	/// Promotes `short -> warm` (`reinforcement_count >= 2`) and
	/// `warm -> long` (`reinforcement_count >= n_promote` and
	/// `age >= d_promote_ms`). Never demotes; a memory already at `long`
	/// (or already promoted past the requested threshold) is left alone.
	pub fn promote_memories(&self, now: i64, n_promote: u32, d_promote_ms: i64) -> Result<Vec<String>, SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		use helix_db::helix_engine::traversal_core::ops::source::n_from_type::NFromTypeAdapter;
		let candidates: Vec<Memory> = G::new(storage, &txn, &arena)
			.n_from_type(LABEL_MEMORY)
			.filter_map(|e| e.ok())
			.filter_map(|tv| match tv {
				TraversalValue::Node(node) => Some(node_to_memory(&node)),
				_ => None,
			})
			.collect();

		let mut promoted = Vec::new();
		for mut memory in candidates {
			let next = match memory.tier {
				Tier::Short if memory.reinforcement_count >= 2 => Some(Tier::Warm),
				Tier::Warm if memory.reinforcement_count >= n_promote && now - memory.created_at >= d_promote_ms => {
					Some(Tier::Long)
				}
				_ => None,
			};
			let Some(next_tier) = next else { continue };

			memory.tier = next_tier;
			memory.promoted_at = now;

			let target: Vec<TraversalValue<'_>> = G::new(storage, &txn, &arena)
				.n_from_index(LABEL_MEMORY, INDEX_MEMORY_ID, &memory.memory_id)
				.filter_map(|e| e.ok())
				.collect();
			G::new_mut_from_iter(storage, &mut txn, target.into_iter().map(Ok), &arena)
				.upsert_n(LABEL_MEMORY, &memory.props())
				.collect::<Result<Vec<_>, _>>()
				.map_err(EngineError::from)?;
			promoted.push(memory.memory_id);
		}

		txn.commit().map_err(EngineError::from)?;
		Ok(promoted)
	}

	/// Inserts a `leads_to`/`contradicts`/`supports`/`supersedes` edge
	/// between two memories. Callers only insert edges with
	/// `confidence > 0.6`, per the consolidation step; this function does
	/// not itself enforce that threshold.
	pub fn link_memories(&self, from: &str, to: &str, relationship: &str, confidence: f64) -> Result<(), SchemaError> {
		let storage = self.storage();
		let arena = Bump::new();
		let mut txn = storage.graph_env.write_txn().map_err(EngineError::from)?;

		let from_node = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_MEMORY, INDEX_MEMORY_ID, &from)
			.filter_map(|e| e.ok())
			.next();
		let to_node = G::new(storage, &txn, &arena)
			.n_from_index(LABEL_MEMORY, INDEX_MEMORY_ID, &to)
			.filter_map(|e| e.ok())
			.next();

		let (Some(TraversalValue::Node(from_node)), Some(TraversalValue::Node(to_node))) = (from_node, to_node) else {
			return Ok(());
		};

		let props = crate::store::build_props(
			&arena,
			vec![
				("relationship", Value::String(relationship.to_string())),
				("confidence", Value::F64(confidence)),
			],
		);
		G::new_mut(storage, &arena, &mut txn)
			.add_edge("RelatedMemory", Some(props), from_node.id(), to_node.id(), false, false)
			.collect::<Result<Vec<_>, _>>()
			.map_err(EngineError::from)?;

		txn.commit().map_err(EngineError::from)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(id: &str, category: &str) -> Memory {
		Memory {
			memory_id: id.into(),
			tier: Tier::Short,
			system: system_for_category(category),
			category: category.into(),
			content: "prefers dark mode".into(),
			context: "settings conversation".into(),
			confidence: 0.7,
			reinforcement_count: 1,
			access_count: 0,
			created_at: 0,
			last_reinforced_at: 0,
			promoted_at: 0,
		}
	}

	#[test]
	fn system_assignment_matches_category() {
		assert_eq!(system_for_category("fact"), 1);
		assert_eq!(system_for_category("decision"), 1);
		assert_eq!(system_for_category("preference"), 1);
		assert_eq!(system_for_category("pattern"), 2);
		assert_eq!(system_for_category("insight"), 2);
	}

	#[test]
	fn reinforcement_then_promotion_is_monotonic() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		db.create_memory(&sample("m1", "preference"), &[0.1, 0.2, 0.3]).unwrap();

		db.reinforce_memory("m1", 100, 0.05).unwrap();
		let promoted = db.promote_memories(100, 4, 7 * 24 * 60 * 60 * 1000).unwrap();
		assert_eq!(promoted, vec!["m1".to_string()]);

		// Already promoted to warm; re-running immediately promotes nothing
		// further (not enough reinforcement/age yet for warm -> long).
		let promoted_again = db.promote_memories(100, 4, 7 * 24 * 60 * 60 * 1000).unwrap();
		assert!(promoted_again.is_empty());
	}
}
