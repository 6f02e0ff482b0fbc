//! Typed wrapper over the embedded per-agent graph store.
//!
//! Thin on purpose: schema init (idempotent), a single shared handle for
//! the agent's lifetime, a datalog-literal escape guard, and
//! `relation_not_found` tolerance collapsed to an empty/default result
//! before any query result crosses out of this crate. Everything above
//! this layer (Subconscious, Indexing Pipeline, Memory Consolidator) talks
//! to the embedded store only through the methods here.

mod codegraph;
mod config;
mod conversations;
mod error;
mod memory;
mod messages;
mod store;

pub use codegraph::{CodeEdgeKind, CodeFile};
pub use conversations::ConversationRecord;
pub use error::SchemaError;
pub use memory::{system_for_category, Memory, MemoryNeighbor, Tier};
pub use messages::Message;
pub use store::{escape_literal, AgentDb, SECONDARY_INDICES};
