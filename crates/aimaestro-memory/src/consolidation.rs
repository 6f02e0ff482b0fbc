//! Consolidation: turns a conversation's messages into long-term memories.
//!
//! One [`ConsolidationStore`] per agent tracks resumable run bookkeeping;
//! [`consolidate`] is the per-conversation pipeline (extract, filter,
//! dedup-or-create, link); [`promote`] is the periodic tier sweep.

use std::path::Path;
use std::sync::Arc;

use aimaestro_agentdb::{system_for_category, AgentDb, Memory, Message, Tier};
use aimaestro_primitives::{now_ms, AgentId, Result};
use tokio::sync::{Mutex, RwLock};

use crate::embedding::EmbeddingProvider;
use crate::persistence::ConsolidationRunsFileStore;
use crate::provider::{ExtractionOptions, LlmProvider};
use crate::types::{ConsolidationRun, ConsolidationRunsFile, RunStatus};

/// Memory reinforcement bump applied whenever a neighbor is close enough to
/// be treated as the same memory surfacing again.
const REINFORCE_CONFIDENCE_BUMP: f64 = 0.05;

/// How many existing neighbors to pull per candidate: one to decide
/// dedupe-or-create, the rest as relationship-proposal context.
const NEIGHBOR_POOL_SIZE: usize = 5;

/// Converts an `HVector` distance into a `[0, 1]` similarity score.
/// `HashEmbedder` (and any real embedder swapped in for it) produces
/// L2-normalized vectors, so Euclidean distance and cosine distance agree up
/// to a constant factor; `1 - distance` is close enough to treat as
/// similarity for dedupe purposes.
fn similarity_from_distance(distance: f64) -> f64 {
	(1.0 - distance).clamp(0.0, 1.0)
}

/// Owns `consolidation-runs.json` for one agent: the last run recorded per
/// conversation, so a crash mid-consolidation resumes from its watermark
/// rather than re-extracting the whole transcript.
pub struct ConsolidationStore {
	store: ConsolidationRunsFileStore,
	cache: RwLock<Vec<ConsolidationRun>>,
	write_lock: Mutex<()>,
}

impl ConsolidationStore {
	pub async fn open(agent_dir: &Path) -> Result<Self> {
		let store = ConsolidationRunsFileStore::new(agent_dir);
		let file = store.read().await?;
		Ok(Self {
			store,
			cache: RwLock::new(file.runs),
			write_lock: Mutex::new(()),
		})
	}

	/// The last recorded run for `session_id`, if any.
	pub async fn last_run(&self, session_id: &str) -> Option<ConsolidationRun> {
		self.cache.read().await.iter().find(|r| r.session_id == session_id).cloned()
	}

	/// Upserts `run` by `session_id`: a conversation keeps only its most
	/// recent run.
	async fn save(&self, run: ConsolidationRun) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;
		if let Some(existing) = cache.iter_mut().find(|r| r.session_id == run.session_id) {
			*existing = run;
		} else {
			cache.push(run);
		}
		let snapshot = ConsolidationRunsFile { runs: cache.clone() };
		drop(cache);
		self.store.write(&snapshot).await
	}
}

/// Summary of one [`consolidate`] call, for logging and the daemon's status
/// surface.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationOutcome {
	pub memories_created: u32,
	pub memories_reinforced: u32,
}

/// Builds the compact textual form fed to the extractor: one line per
/// message, oldest first, role-prefixed.
fn compact_transcript(messages: &[Message]) -> String {
	messages.iter().map(|m| format!("{}: {}", m.role, m.content)).collect::<Vec<_>>().join("\n")
}

/// Runs one consolidation pass over `session_id`: extracts memory
/// candidates from messages newer than the conversation's last watermark,
/// filters by confidence/category, dedups each candidate against its
/// nearest neighbors (reinforcing an existing memory when the closest one's
/// similarity meets `dedupe_threshold`, otherwise creating a new memory and
/// proposing relationships to the neighbors it was compared against).
///
/// Resumable: on success the run's watermark advances to the timestamp of
/// the last message considered, so a retried or nightly re-run only
/// processes what's new.
pub async fn consolidate(
	db: &AgentDb,
	runs: &ConsolidationStore,
	llm: &Arc<dyn LlmProvider>,
	embedder: &Arc<dyn EmbeddingProvider>,
	agent_id: AgentId,
	session_id: &str,
	opts: &ExtractionOptions,
	dedupe_threshold: f32,
) -> Result<ConsolidationOutcome> {
	let now = now_ms();
	let watermark = runs.last_run(session_id).await.map(|r| r.watermark).unwrap_or(0);

	let messages = db.messages_for_session(session_id)?;
	let fresh: Vec<_> = messages.into_iter().filter(|m| m.timestamp > watermark).collect();

	let mut run = ConsolidationRun::start(agent_id, session_id.to_string(), now, watermark);
	if fresh.is_empty() {
		run.status = RunStatus::Completed;
		run.finished_at = Some(now);
		runs.save(run).await?;
		return Ok(ConsolidationOutcome::default());
	}
	let next_watermark = fresh.iter().map(|m| m.timestamp).max().unwrap_or(watermark);

	let text = compact_transcript(&fresh);
	let outcome = match llm.extract_memories(&text, opts).await {
		Ok(outcome) => outcome,
		Err(e) => {
			run.status = RunStatus::Failed;
			run.error_count = 1;
			run.finished_at = Some(now);
			runs.save(run).await?;
			return Err(e);
		}
	};

	let mut created = 0u32;
	let mut reinforced = 0u32;

	for candidate in outcome.memories.into_iter().filter(|c| c.confidence >= opts.min_confidence && opts.categories.contains(&c.category)) {
		let embedding = embedder.embed(&candidate.content).await?;
		let neighbors = db.nearest_memories(&embedding, NEIGHBOR_POOL_SIZE)?;
		let nearest = neighbors.first().filter(|n| !n.memory_id.is_empty());
		let max_similarity = nearest.map_or(0.0, |n| similarity_from_distance(n.distance));

		if let Some(neighbor) = nearest {
			if max_similarity >= f64::from(dedupe_threshold) {
				db.reinforce_memory(&neighbor.memory_id, now, REINFORCE_CONFIDENCE_BUMP)?;
				reinforced += 1;
				continue;
			}
		}

		let memory_id = aimaestro_primitives::MemoryId::new().0.to_string();
		let memory = Memory {
			memory_id: memory_id.clone(),
			tier: Tier::Short,
			system: system_for_category(&candidate.category),
			category: candidate.category,
			content: candidate.content.clone(),
			context: candidate.context,
			confidence: f64::from(candidate.confidence),
			reinforcement_count: 1,
			access_count: 0,
			created_at: now,
			last_reinforced_at: now,
			promoted_at: 0,
		};
		db.create_memory(&memory, &embedding)?;
		created += 1;

		// Link the new memory to the existing neighbors it was just compared
		// against, per the proposals the provider is confident about.
		let existing: Vec<(String, String)> = neighbors
			.iter()
			.filter(|n| !n.memory_id.is_empty())
			.filter_map(|n| db.get_memory(&n.memory_id).ok().flatten().map(|m| (n.memory_id.clone(), m.content)))
			.collect();
		if !existing.is_empty() {
			let neighbor_contents: Vec<String> = existing.iter().map(|(_, content)| content.clone()).collect();
			if let Ok(proposals) = llm.propose_relationships(&memory.content, &neighbor_contents).await {
				for proposal in proposals.into_iter().filter(|p| p.confidence > 0.6) {
					if let Some((neighbor_id, _)) = existing.get(proposal.neighbor_index) {
						db.link_memories(&memory_id, neighbor_id, &proposal.relationship, proposal.confidence)?;
					}
				}
			}
		}
	}

	run.status = RunStatus::Completed;
	run.finished_at = Some(now);
	run.memories_created = created;
	run.memories_reinforced = reinforced;
	run.watermark = next_watermark;
	runs.save(run).await?;

	Ok(ConsolidationOutcome {
		memories_created: created,
		memories_reinforced: reinforced,
	})
}

/// Tier promotion defaults: `warm` once reinforced twice, `long` once
/// reinforced `n_promote` times and at least `d_promote` old.
pub const DEFAULT_N_PROMOTE: u32 = 4;
pub const DEFAULT_D_PROMOTE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Default dedupe threshold: a candidate must be at least this similar to
/// its nearest neighbor to be treated as the same memory resurfacing.
pub const DEFAULT_DEDUPE_THRESHOLD: f32 = 0.85;

/// Runs the periodic tier sweep across every memory in `db`.
pub fn promote(db: &AgentDb, n_promote: u32, d_promote_ms: i64) -> Result<Vec<String>> {
	Ok(db.promote_memories(now_ms(), n_promote, d_promote_ms)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::embedding::HashEmbedder;
	use crate::provider::{ExtractionOutcome, MemoryCandidate};
	use async_trait::async_trait;

	struct OneFactProvider;

	#[async_trait]
	impl LlmProvider for OneFactProvider {
		async fn extract_memories(&self, _text: &str, _opts: &ExtractionOptions) -> Result<ExtractionOutcome> {
			Ok(ExtractionOutcome {
				memories: vec![MemoryCandidate {
					category: "preference".into(),
					content: "prefers dark mode in the editor".into(),
					context: "settings chat".into(),
					confidence: 0.9,
				}],
				conversation_summary: None,
			})
		}
	}

	fn seed_messages(db: &AgentDb, session_id: &str) {
		db.upsert_message(&Message {
			message_id: "m1".into(),
			session_id: session_id.into(),
			role: "user".into(),
			content: "I prefer dark mode".into(),
			model: "claude".into(),
			timestamp: 10,
		})
		.unwrap();
	}

	#[tokio::test]
	async fn first_run_creates_a_memory_and_advances_watermark() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		seed_messages(&db, "sess-1");

		let runs_dir = tempfile::tempdir().unwrap();
		let runs = ConsolidationStore::open(runs_dir.path()).await.unwrap();
		let llm: Arc<dyn LlmProvider> = Arc::new(OneFactProvider);
		let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());

		let outcome =
			consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-1", &ExtractionOptions::default(), 0.85).await.unwrap();
		assert_eq!(outcome.memories_created, 1);
		assert_eq!(outcome.memories_reinforced, 0);

		let run = runs.last_run("sess-1").await.unwrap();
		assert_eq!(run.watermark, 10);
	}

	#[tokio::test]
	async fn rerun_with_no_new_messages_is_a_noop() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		seed_messages(&db, "sess-1");

		let runs_dir = tempfile::tempdir().unwrap();
		let runs = ConsolidationStore::open(runs_dir.path()).await.unwrap();
		let llm: Arc<dyn LlmProvider> = Arc::new(OneFactProvider);
		let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());

		consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-1", &ExtractionOptions::default(), 0.85).await.unwrap();
		let second =
			consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-1", &ExtractionOptions::default(), 0.85).await.unwrap();
		assert_eq!(second.memories_created, 0);
		assert_eq!(second.memories_reinforced, 0);
	}

	#[tokio::test]
	async fn same_fact_from_a_later_session_reinforces_not_duplicates() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		seed_messages(&db, "sess-1");
		seed_messages(&db, "sess-2");

		let runs_dir = tempfile::tempdir().unwrap();
		let runs = ConsolidationStore::open(runs_dir.path()).await.unwrap();
		let llm: Arc<dyn LlmProvider> = Arc::new(OneFactProvider);
		let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());

		let first =
			consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-1", &ExtractionOptions::default(), 0.85).await.unwrap();
		assert_eq!(first.memories_created, 1);

		// Same extracted content, same embedding, a second unrelated session:
		// with a 0.85 threshold the identical embedding is a near-exact match
		// and must reinforce instead of creating a second memory.
		let second =
			consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-2", &ExtractionOptions::default(), 0.85).await.unwrap();
		assert_eq!(second.memories_created, 0);
		assert_eq!(second.memories_reinforced, 1);
	}

	#[tokio::test]
	async fn a_threshold_above_one_never_reinforces() {
		let dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&dir.path().join("agent.db")).unwrap();
		seed_messages(&db, "sess-1");
		seed_messages(&db, "sess-2");

		let runs_dir = tempfile::tempdir().unwrap();
		let runs = ConsolidationStore::open(runs_dir.path()).await.unwrap();
		let llm: Arc<dyn LlmProvider> = Arc::new(OneFactProvider);
		let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());

		consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-1", &ExtractionOptions::default(), 1.1).await.unwrap();
		let second =
			consolidate(&db, &runs, &llm, &embedder, AgentId::new(), "sess-2", &ExtractionOptions::default(), 1.1).await.unwrap();
		assert_eq!(second.memories_created, 1);
		assert_eq!(second.memories_reinforced, 0);
	}
}
