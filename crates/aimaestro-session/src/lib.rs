//! Session Persistence: durable record of multiplexer session intent.
//!
//! One [`SessionStore`] per agent, rooted at that agent's directory. The
//! Terminal Broker is the only consumer: on startup it reconciles recorded
//! intent against the multiplexer's live session list to decide which
//! sessions to re-attach versus re-create.

pub mod persistence;
pub mod registry;
pub mod types;

pub use registry::{ReconciledSession, SessionStore};
pub use types::{derive_session_name, sanitize, SessionRecord, SessionsFile};
