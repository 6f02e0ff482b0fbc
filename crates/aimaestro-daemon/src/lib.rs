//! Daemon: configuration, bootstrap, the API Key Store, and the
//! [`CoreHandle`] facade that a transport adapter calls into.

mod api_keys;
mod config;
mod daemon;
mod mailbox;
mod runtime;

pub use api_keys::{ApiKey, ApiKeyStore};
pub use config::{ApiConfig, Config, ConsolidationConfig, IndexingConfig, MeshConfig, SelfHostConfig};
pub use daemon::{CoreHandle, Daemon, WellKnownDiscovery};
pub use mailbox::MailboxEntry;
pub use runtime::{AgentRuntime, AgentRuntimes};
