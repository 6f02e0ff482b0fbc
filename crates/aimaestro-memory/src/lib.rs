//! Memory Consolidator: turns fresh conversation messages into long-term
//! memories, deduplicating against what's already stored and promoting
//! memories through tiers as they get reinforced.
//!
//! [`consolidate`] is the per-conversation pipeline the Subconscious calls
//! on its consolidation cadence; [`promote`] is the periodic sweep. Both
//! are plain functions over [`aimaestro_agentdb::AgentDb`] rather than an
//! actor: consolidation runs are infrequent and CPU/IO-bound, not a shared
//! mutable cache under concurrent access the way the registries are.

mod consolidation;
mod embedding;
mod persistence;
mod provider;
mod types;

pub use consolidation::{
	consolidate, promote, ConsolidationOutcome, ConsolidationStore, DEFAULT_D_PROMOTE_MS, DEFAULT_DEDUPE_THRESHOLD, DEFAULT_N_PROMOTE,
};
pub use embedding::{EmbeddingProvider, HashEmbedder};
pub use provider::{
	AutoProvider, ExtractionOptions, ExtractionOutcome, HttpJsonProvider, LlmProvider, MemoryCandidate, RelationshipCandidate,
	EXTRACTION_TIMEOUT,
};
pub use types::{ConsolidationRun, ConsolidationRunsFile, RunStatus};
