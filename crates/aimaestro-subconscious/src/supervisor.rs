//! `Subconscious`: the per-agent background loop. One task per active
//! agent, running two independent cadences concurrently until cancelled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aimaestro_agent_registry::AgentRegistry;
use aimaestro_agentdb::AgentDb;
use aimaestro_indexing::{index_project_delta, IndexOptions, IndexingSlotAllocator};
use aimaestro_memory::{
	consolidate, promote, ConsolidationStore, EmbeddingProvider, ExtractionOptions, LlmProvider, DEFAULT_D_PROMOTE_MS, DEFAULT_DEDUPE_THRESHOLD,
	DEFAULT_N_PROMOTE,
};
use aimaestro_primitives::AgentId;
use tokio_util::sync::CancellationToken;

use crate::delta;
use crate::discovery;

/// Tunables for one Subconscious instance. `consolidation_interval` is the
/// "nightly by default" cadence; callers wanting manual-only consolidation
/// should drive [`consolidation_tick`] directly instead of spawning the
/// supervisor loop.
#[derive(Debug, Clone)]
pub struct SubconsciousConfig {
	pub projects_dir: PathBuf,
	pub message_check_interval: Duration,
	pub consolidation_interval: Duration,
	pub batch_size: usize,
	pub n_promote: u32,
	pub d_promote_ms: i64,
	pub dedupe_threshold: f32,
}

impl Default for SubconsciousConfig {
	fn default() -> Self {
		Self {
			projects_dir: PathBuf::new(),
			message_check_interval: Duration::from_secs(30),
			consolidation_interval: Duration::from_secs(24 * 60 * 60),
			batch_size: delta::DEFAULT_BATCH_SIZE,
			n_promote: DEFAULT_N_PROMOTE,
			d_promote_ms: DEFAULT_D_PROMOTE_MS,
			dedupe_threshold: DEFAULT_DEDUPE_THRESHOLD,
		}
	}
}

/// Everything one agent's Subconscious needs a handle to. Constructed once
/// by the daemon at agent-activation time and shared across both cadences.
pub struct Subconscious {
	pub agent_id: AgentId,
	pub registry: Arc<AgentRegistry>,
	pub db: Arc<AgentDb>,
	pub slots: Arc<IndexingSlotAllocator>,
	pub runs: Arc<ConsolidationStore>,
	pub llm: Arc<dyn LlmProvider>,
	pub embedder: Arc<dyn EmbeddingProvider>,
	pub config: SubconsciousConfig,
}

impl Subconscious {
	/// Spawns the supervisor task. The returned `CancellationToken` is a
	/// child of `shutdown`; dropping or cancelling either one stops both
	/// cadences at their next suspension point.
	pub fn spawn(self: Arc<Self>, shutdown: &CancellationToken) {
		let token = shutdown.child_token();
		tokio::spawn(run(self, token));
	}

	/// Runs one message/conversation delta pass over every transcript
	/// discovered for this agent, then indexes this agent's working
	/// directory's code and documentation, all gated by the global slot.
	pub async fn delta_tick(&self) {
		let Some(agent) = self.registry.find_by_id(self.agent_id).await else {
			tracing::warn!(agent_id = %self.agent_id, "subconscious tick for unknown agent");
			return;
		};

		let transcripts = discovery::discover_for_agent(&self.config.projects_dir, &agent);
		let slot = self.slots.acquire(self.agent_id).await;
		for transcript in &transcripts {
			match delta::run_delta(&self.db, self.agent_id, transcript, self.config.batch_size) {
				Ok(outcome) if !outcome.skipped => {
					tracing::debug!(session_id = %transcript.session_id, ingested = outcome.messages_ingested, "delta indexed transcript");
				}
				Ok(_) => {}
				Err(e) => tracing::warn!(session_id = %transcript.session_id, error = %e, "delta step failed"),
			}
		}

		let project_path = std::path::Path::new(&agent.working_directory);
		if project_path.is_dir() {
			if let Err(e) = index_code_and_docs(&self.db, project_path) {
				tracing::warn!(agent_id = %self.agent_id, error = %e, "code/doc indexing failed");
			}
		}
		drop(slot);
	}

	/// Runs one consolidation pass over every conversation known to this
	/// agent, then sweeps tier promotion.
	pub async fn consolidation_tick(&self) {
		let sessions: Vec<String> = {
			let Some(agent) = self.registry.find_by_id(self.agent_id).await else { return };
			agent.sessions.iter().map(|s| s.tmux_session_name.clone()).collect()
		};

		for session_id in &sessions {
			if let Err(e) = consolidate(
				&self.db,
				&self.runs,
				&self.llm,
				&self.embedder,
				self.agent_id,
				session_id,
				&ExtractionOptions::default(),
				self.config.dedupe_threshold,
			)
			.await
			{
				tracing::warn!(session_id = %session_id, error = %e, "consolidation run failed");
			}
		}

		match promote(&self.db, self.config.n_promote, self.config.d_promote_ms) {
			Ok(promoted) if !promoted.is_empty() => tracing::info!(count = promoted.len(), "promoted memories"),
			Ok(_) => {}
			Err(e) => tracing::warn!(agent_id = %self.agent_id, error = %e, "promotion sweep failed"),
		}
	}
}

/// `index_project_delta` already probes file-metadata presence itself and
/// falls back to a full index on first run; the Subconscious just calls it
/// for both the code and documentation sub-pipelines.
fn index_code_and_docs(db: &AgentDb, path: &std::path::Path) -> aimaestro_primitives::Result<()> {
	index_project_delta(db, path, &IndexOptions::default())?;
	index_project_delta(db, path, &IndexOptions::docs())?;
	Ok(())
}

async fn run(subconscious: Arc<Subconscious>, shutdown: CancellationToken) {
	let mut message_timer = tokio::time::interval(subconscious.config.message_check_interval);
	let mut consolidation_timer = tokio::time::interval(subconscious.config.consolidation_interval);

	loop {
		tokio::select! {
			() = shutdown.cancelled() => {
				tracing::info!(agent_id = %subconscious.agent_id, "subconscious loop shutting down");
				break;
			}
			_ = message_timer.tick() => {
				subconscious.delta_tick().await;
			}
			_ = consolidation_timer.tick() => {
				subconscious.consolidation_tick().await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aimaestro_memory::HashEmbedder;

	struct NoopProvider;

	#[async_trait::async_trait]
	impl LlmProvider for NoopProvider {
		async fn extract_memories(&self, _text: &str, _opts: &ExtractionOptions) -> aimaestro_primitives::Result<aimaestro_memory::ExtractionOutcome> {
			Ok(aimaestro_memory::ExtractionOutcome::default())
		}
	}

	#[tokio::test]
	async fn delta_tick_on_unknown_agent_does_not_panic() {
		let registry_dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(AgentRegistry::open(registry_dir.path()).await.unwrap());
		let db_dir = tempfile::tempdir().unwrap();
		let db = Arc::new(AgentDb::open(&db_dir.path().join("agent.db")).unwrap());
		let runs_dir = tempfile::tempdir().unwrap();
		let runs = Arc::new(ConsolidationStore::open(runs_dir.path()).await.unwrap());

		let subconscious = Arc::new(Subconscious {
			agent_id: AgentId::new(),
			registry,
			db,
			slots: Arc::new(IndexingSlotAllocator::default()),
			runs,
			llm: Arc::new(NoopProvider),
			embedder: Arc::new(HashEmbedder::default()),
			config: SubconsciousConfig::default(),
		});

		subconscious.delta_tick().await;
		subconscious.consolidation_tick().await;
	}
}
