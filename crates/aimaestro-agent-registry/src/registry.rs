//! The Agent Registry service: agent metadata, name uniqueness, and the
//! per-agent directory tree.
//!
//! Mirrors `aimaestro-host-registry`'s cache/write-lock split: readers get a
//! possibly one-write-stale [`Snapshot`] for free, writers serialize through
//! `write_lock` and refresh the cache on success.

use std::path::{Path, PathBuf};

use aimaestro_amp::parse_address;
use aimaestro_primitives::{now_ms, AgentId, AimaestroError, ConflictKind, HostId, Result};
use tokio::sync::{Mutex, RwLock};

use crate::directory::AgentDir;
use crate::persistence::RegistryFileStore;
use crate::types::{is_valid_agent_name, Agent, AgentStatus, AmpIdentity, RegistryFile};

/// A consistent, versioned read of the agent registry.
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub file: RegistryFile,
	pub version: u64,
}

/// Owns `agents/registry.json` and the agents' directory tree for one host
/// daemon.
pub struct AgentRegistry {
	store: RegistryFileStore,
	agents_root: PathBuf,
	cache: RwLock<Snapshot>,
	write_lock: Mutex<()>,
}

impl AgentRegistry {
	/// Opens (or initializes) the registry rooted at `data_root/agents`.
	pub async fn open(data_root: &Path) -> Result<Self> {
		let agents_root = data_root.join("agents");
		tokio::fs::create_dir_all(&agents_root).await?;
		let store = RegistryFileStore::new(&agents_root);
		let file = store.read().await?;
		Ok(Self {
			store,
			agents_root,
			cache: RwLock::new(Snapshot { file, version: 0 }),
			write_lock: Mutex::new(()),
		})
	}

	/// A cached, possibly one-write-stale snapshot. Never touches disk.
	pub async fn snapshot(&self) -> Snapshot {
		self.cache.read().await.clone()
	}

	/// Re-reads `registry.json` from disk and refreshes the cache.
	pub async fn reload(&self) -> Result<Snapshot> {
		let file = self.store.read().await?;
		let mut cache = self.cache.write().await;
		cache.file = file;
		cache.version += 1;
		Ok(cache.clone())
	}

	/// The directory helper for `id`, valid whether or not the agent exists
	/// yet (used while constructing a brand-new agent).
	#[must_use]
	pub fn agent_dir(&self, id: AgentId) -> AgentDir {
		AgentDir::new(&self.agents_root, id)
	}

	pub async fn list(&self) -> Vec<Agent> {
		self.cache.read().await.file.agents.clone()
	}

	pub async fn find_by_id(&self, id: AgentId) -> Option<Agent> {
		self.cache.read().await.file.agents.iter().find(|a| a.id == id).cloned()
	}

	pub async fn find_by_name(&self, name: &str) -> Option<Agent> {
		self.cache.read().await.file.agents.iter().find(|a| a.name == name).cloned()
	}

	/// Reverse lookup by AMP address (`agent@tenant.provider`).
	pub async fn find_by_amp_address(&self, address: &str) -> Option<Agent> {
		self.cache
			.read()
			.await
			.file
			.agents
			.iter()
			.find(|a| a.amp_identity.address == address)
			.cloned()
	}

	/// Creates a brand-new agent: validates the name, rejects a collision,
	/// builds the directory skeleton, generates an Ed25519 identity, and
	/// persists the registry entry.
	pub async fn create_agent(&self, name: &str, label: &str, working_directory: &str, host_id: HostId) -> Result<Agent> {
		if !is_valid_agent_name(name) {
			return Err(AimaestroError::validation(format!("invalid agent name: {name}")));
		}

		let _guard = self.write_lock.lock().await;
		{
			let cache = self.cache.read().await;
			if cache.file.agents.iter().any(|a| a.name == name) {
				return Err(AimaestroError::Conflict(ConflictKind::AgentNameTaken));
			}
		}

		let id = AgentId::new();
		let dir = self.agent_dir(id);
		dir.create_skeleton().await?;

		let identity = aimaestro_identity::load_or_generate(dir.root()).await?;
		let address = parse_address(name, &host_id.0)?.to_canonical_string();

		let now = now_ms();
		let agent = Agent {
			id,
			name: name.to_string(),
			label: label.to_string(),
			alias: name.to_string(),
			host_id,
			working_directory: working_directory.to_string(),
			deployment: serde_json::Value::Null,
			sessions: Vec::new(),
			tools: serde_json::Value::Null,
			preferences: serde_json::Value::Null,
			status: AgentStatus::Offline,
			amp_identity: AmpIdentity {
				fingerprint: identity.keypair.fingerprint(),
				address,
			},
			created_at: now,
			last_active: now,
			metadata: serde_json::Value::Null,
		};

		tokio::fs::write(dir.identity_json(), serde_json::to_vec_pretty(&agent)?).await?;

		let mut cache = self.cache.write().await;
		cache.file.agents.push(agent.clone());
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await?;

		Ok(agent)
	}

	/// Inserts a fully-built agent record (directory tree already populated
	/// by the caller, e.g. the import pipeline) after re-checking name
	/// uniqueness under the write lock.
	pub async fn insert_agent(&self, agent: Agent) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;
		if cache.file.agents.iter().any(|a| a.name == agent.name) {
			return Err(AimaestroError::Conflict(ConflictKind::AgentNameTaken));
		}
		cache.file.agents.push(agent);
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await
	}

	/// Replaces the stored record for `agent.id` in full. Used for session
	/// state changes, working-directory reconciliation, and metadata edits.
	pub async fn update_agent(&self, agent: Agent) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;
		let Some(slot) = cache.file.agents.iter_mut().find(|a| a.id == agent.id) else {
			return Err(AimaestroError::not_found(format!("agent {} not found", agent.id)));
		};
		*slot = agent;
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await
	}

	/// Updates the live pane working directory for `id` if it has drifted,
	/// called by the daemon on each indexing wake-up per the reconciliation
	/// rule in the Terminal Broker's component design.
	pub async fn reconcile_working_directory(&self, id: AgentId, observed: &str) -> Result<()> {
		let Some(mut agent) = self.find_by_id(id).await else {
			return Err(AimaestroError::not_found(format!("agent {id} not found")));
		};
		if agent.working_directory == observed {
			return Ok(());
		}
		agent.working_directory = observed.to_string();
		self.update_agent(agent).await
	}

	/// Deletes `id`'s registry entry and its entire directory tree. Never
	/// called implicitly; only an explicit delete or a successful
	/// move-transfer acknowledgement destroys an agent.
	pub async fn delete_agent(&self, id: AgentId) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;
		let before = cache.file.agents.len();
		cache.file.agents.retain(|a| a.id != id);
		if cache.file.agents.len() == before {
			return Err(AimaestroError::not_found(format!("agent {id} not found")));
		}
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await?;

		let dir = self.agent_dir(id);
		match tokio::fs::remove_dir_all(dir.root()).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn create_agent_enforces_name_uniqueness() {
		let dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(dir.path()).await.unwrap();

		let first = registry.create_agent("lola", "Lola", "/tmp", HostId("forge".into())).await.unwrap();
		assert_eq!(first.name, "lola");
		assert_eq!(first.amp_identity.address, "lola@forge.aimaestro.local");

		let err = registry.create_agent("lola", "Lola 2", "/tmp", HostId("forge".into())).await.unwrap_err();
		assert!(matches!(err, AimaestroError::Conflict(ConflictKind::AgentNameTaken)));
	}

	#[tokio::test]
	async fn create_agent_rejects_invalid_name() {
		let dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(dir.path()).await.unwrap();
		assert!(registry.create_agent("lo la", "Lola", "/tmp", HostId("forge".into())).await.is_err());
	}

	#[tokio::test]
	async fn find_by_amp_address_reverse_lookup() {
		let dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(dir.path()).await.unwrap();
		let agent = registry.create_agent("lola", "Lola", "/tmp", HostId("forge".into())).await.unwrap();

		let found = registry.find_by_amp_address(&agent.amp_identity.address).await.unwrap();
		assert_eq!(found.id, agent.id);
	}

	#[tokio::test]
	async fn reconcile_working_directory_updates_on_drift() {
		let dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(dir.path()).await.unwrap();
		let agent = registry.create_agent("lola", "Lola", "/tmp", HostId("forge".into())).await.unwrap();

		registry.reconcile_working_directory(agent.id, "/new/path").await.unwrap();
		let updated = registry.find_by_id(agent.id).await.unwrap();
		assert_eq!(updated.working_directory, "/new/path");
	}

	#[tokio::test]
	async fn delete_agent_removes_entry_and_directory() {
		let dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(dir.path()).await.unwrap();
		let agent = registry.create_agent("lola", "Lola", "/tmp", HostId("forge".into())).await.unwrap();
		let agent_dir = registry.agent_dir(agent.id).root().to_path_buf();
		assert!(agent_dir.is_dir());

		registry.delete_agent(agent.id).await.unwrap();
		assert!(registry.find_by_id(agent.id).await.is_none());
		assert!(!agent_dir.exists());
	}
}
