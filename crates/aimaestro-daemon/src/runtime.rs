//! `AgentRuntimes`: lazily opens and caches the per-agent handles
//! (`AgentDb`, `SessionStore`) that the rest of the daemon needs for an
//! active agent.
//!
//! Mirrors `TerminalService`'s `HashMap<session_name, ...>` pattern, scaled
//! to one cache entry per agent rather than per session: opening
//! `AgentDb`/`SessionStore` is cheap but not free (schema init, a file
//! read), so every call site shares one handle per agent for its process
//! lifetime instead of reopening per request.

use std::collections::HashMap;
use std::sync::Arc;

use aimaestro_agent_registry::AgentRegistry;
use aimaestro_agentdb::AgentDb;
use aimaestro_primitives::{AgentId, AimaestroError, Result};
use aimaestro_session::SessionStore;
use tokio::sync::RwLock;

pub struct AgentRuntime {
	pub db: Arc<AgentDb>,
	pub sessions: Arc<SessionStore>,
}

pub struct AgentRuntimes {
	registry: Arc<AgentRegistry>,
	cache: RwLock<HashMap<AgentId, Arc<AgentRuntime>>>,
}

impl AgentRuntimes {
	#[must_use]
	pub fn new(registry: Arc<AgentRegistry>) -> Self {
		Self { registry, cache: RwLock::new(HashMap::new()) }
	}

	/// Returns the cached runtime for `agent_id`, opening it on first use.
	/// Fails if no such agent is registered.
	pub async fn get(&self, agent_id: AgentId) -> Result<Arc<AgentRuntime>> {
		if let Some(runtime) = self.cache.read().await.get(&agent_id) {
			return Ok(runtime.clone());
		}

		let agent = self
			.registry
			.find_by_id(agent_id)
			.await
			.ok_or_else(|| AimaestroError::not_found(format!("agent {agent_id} not found")))?;
		let dir = self.registry.agent_dir(agent.id);

		let db = Arc::new(AgentDb::open(&dir.database_path())?);
		let sessions = Arc::new(SessionStore::open(dir.root()).await?);
		let runtime = Arc::new(AgentRuntime { db, sessions });

		self.cache.write().await.insert(agent_id, runtime.clone());
		Ok(runtime)
	}

	/// Drops the cached runtime for `agent_id`, if any. Called after a
	/// delete so a stale handle into a removed directory can't linger.
	pub async fn evict(&self, agent_id: AgentId) {
		self.cache.write().await.remove(&agent_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use aimaestro_primitives::HostId;

	#[tokio::test]
	async fn get_opens_once_and_caches_on_repeat_calls() {
		let dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(AgentRegistry::open(dir.path()).await.unwrap());
		let agent = registry.create_agent("lola", "Lola", "/tmp", HostId("forge".into())).await.unwrap();
		let runtimes = AgentRuntimes::new(registry);

		let first = runtimes.get(agent.id).await.unwrap();
		let second = runtimes.get(agent.id).await.unwrap();
		assert!(Arc::ptr_eq(&first.db, &second.db));
	}

	#[tokio::test]
	async fn get_unknown_agent_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(AgentRegistry::open(dir.path()).await.unwrap());
		let runtimes = AgentRuntimes::new(registry);
		assert!(runtimes.get(AgentId::new()).await.is_err());
	}
}
