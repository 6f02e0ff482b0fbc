//! Subconscious: the per-agent background loop that discovers transcripts,
//! delta-indexes them, drives code/documentation indexing, and periodically
//! consolidates memories.
//!
//! One [`Subconscious`] per active agent, spawned by the daemon at
//! activation time (`Daemon::bootstrap` for agents already `active`, or on
//! wake). The two cadences run inside a single task selecting over two
//! interval timers, not two separate actors: unlike the registries and the
//! terminal broker, nothing here is a shared mutable cache under concurrent
//! access, so there's no cross-task state that needs message-passing
//! isolation.

mod delta;
mod discovery;
mod supervisor;

pub use delta::{run_delta, DeltaOutcome, DEFAULT_BATCH_SIZE};
pub use discovery::{count_nonempty_lines, discover_for_agent, parse_turn_range, stable_message_id, Transcript, TranscriptTurn};
pub use supervisor::{Subconscious, SubconsciousConfig};
