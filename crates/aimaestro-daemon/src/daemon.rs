//! `Daemon`: owns every service for one host process's entire lifetime, and
//! `CoreHandle`: the typed facade a transport adapter calls into.
//!
//! # Mental model
//!
//! - [`Daemon::bootstrap`] constructs every service in the fixed order the
//!   component design requires (Host Registry, Identity Store root, Agent
//!   Registry, Agent Database factory, Session Persistence, Terminal
//!   Broker, global indexing slot allocator, Peer Mesh Controller), then
//!   spawns one [`Subconscious`] per agent already `Active` in the Agent
//!   Registry.
//! - [`CoreHandle`] is the only thing the rest of the process holds a
//!   reference to; every wire operation the eventual transport adapter
//!   exposes maps to exactly one `CoreHandle` method, the way
//!   `xeno-broker-bin` builds one `BrokerCore` and hands it to the IPC
//!   listener.
//! - Shutdown is cooperative: [`Daemon::shutdown`] cancels the shared
//!   [`CancellationToken`], so every Subconscious loop observes it on its
//!   next `select!` iteration and exits, then waits briefly for in-flight
//!   work to reach a suspension point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aimaestro_agent_registry::{export_agent, import_agent, Agent, AgentRegistry, AgentStatus, ImportOutcome, RepoEntry, SessionInfo, SessionStatus};
use aimaestro_agentdb::AgentDb;
use aimaestro_amp::{create_message, CreateMessageOpts, Envelope};
use aimaestro_host_registry::HostRegistry;
use aimaestro_identity::KeyPair;
use aimaestro_indexing::IndexingSlotAllocator;
use aimaestro_memory::{AutoProvider, ConsolidationStore, EmbeddingProvider, HashEmbedder, HttpJsonProvider, LlmProvider};
use aimaestro_mesh::{PeerMeshController, PeerQueryOutcome, RegisterPeerRequest, RegisterPeerResponse};
use aimaestro_primitives::{now_ms, AgentId, AimaestroError, HostId, Result, SessionIndex};
use aimaestro_session::derive_session_name;
use aimaestro_subconscious::{Subconscious, SubconsciousConfig};
use aimaestro_terminal::{AttachOutcome, AttachRequest, AttachTarget, ClientFrame, ClientId, ClientSink, TerminalHandle, TerminalService};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api_keys::ApiKeyStore;
use crate::config::Config;
use crate::mailbox;
use crate::runtime::AgentRuntimes;

/// Grace period `Daemon::shutdown` waits for in-flight PTY writes and
/// consolidation runs to reach a suspension point, mirroring the 1.5s
/// hibernate grace the Terminal Broker already applies per session.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(1500);

/// AMP well-known discovery document, `/.well-known/agent-messaging.json`.
#[derive(Debug, Clone, Serialize)]
pub struct WellKnownDiscovery {
	pub version: String,
	pub endpoint: String,
	pub provider: String,
	pub capabilities: Vec<String>,
}

/// The typed API surface a transport adapter calls into; one method per
/// wire operation.
pub struct CoreHandle {
	config: Config,
	host_registry: Arc<HostRegistry>,
	agent_registry: Arc<AgentRegistry>,
	runtimes: Arc<AgentRuntimes>,
	terminal: TerminalHandle,
	mesh: Arc<PeerMeshController>,
	slots: Arc<IndexingSlotAllocator>,
	api_keys: Arc<ApiKeyStore>,
	llm: Arc<dyn LlmProvider>,
	embedder: Arc<dyn EmbeddingProvider>,
	subconsciouses: RwLock<HashMap<AgentId, Arc<Subconscious>>>,
	shutdown: CancellationToken,
}

impl CoreHandle {
	/// Attaches `client_id` to `agent_id`'s primary session (index 0),
	/// relaying to a peer if the agent's host isn't this one.
	pub async fn attach_terminal(&self, agent_id: AgentId, client_id: ClientId, client_sink: ClientSink) -> Result<AttachOutcome> {
		let agent = self.require_agent(agent_id).await?;
		let runtime = self.runtimes.get(agent_id).await?;
		let target = self.attach_target(&agent).await?;
		let session_name = derive_session_name(&agent.name, 0);

		self.terminal
			.attach(AttachRequest {
				session_name,
				target,
				working_directory: agent.working_directory.clone().into(),
				session_store: runtime.sessions.clone(),
				client_id,
				client_sink,
			})
			.await
			.map_err(|e| AimaestroError::TransientRemote(e.to_string()))
	}

	async fn attach_target(&self, agent: &Agent) -> Result<AttachTarget> {
		if self.host_registry.is_self(&agent.host_id.0).await {
			return Ok(AttachTarget::Local);
		}
		let snapshot = self.host_registry.snapshot().await;
		let host = snapshot
			.file
			.hosts
			.iter()
			.find(|h| h.matches(&agent.host_id.0))
			.ok_or_else(|| AimaestroError::not_found(format!("host {} not known", agent.host_id)))?;
		Ok(AttachTarget::Remote { ws_url: format!("{}/terminal/ws", host.url) })
	}

	/// Forwards raw input bytes to an already-attached session, identified
	/// by the `input` sender [`Self::attach_terminal`] returned.
	pub async fn send_terminal_bytes(&self, input: &mpsc::Sender<ClientFrame>, bytes: Vec<u8>) -> Result<()> {
		input.send(ClientFrame::Input(bytes)).await.map_err(|_| AimaestroError::NotFound("attachment is gone".into()))
	}

	/// Resizes an already-attached session's PTY.
	pub async fn resize_terminal(&self, input: &mpsc::Sender<ClientFrame>, cols: u16, rows: u16) -> Result<()> {
		input.send(ClientFrame::Resize { cols, rows }).await.map_err(|_| AimaestroError::NotFound("attachment is gone".into()))
	}

	pub async fn register_peer(&self, req: RegisterPeerRequest) -> Result<RegisterPeerResponse> {
		self.mesh.register_peer(req).await
	}

	pub async fn sync_with_all_peers(&self) -> Vec<(HostId, Result<RegisterPeerResponse>)> {
		self.mesh.sync_with_all_peers().await
	}

	pub async fn federated_query(&self, path: &str, body: &serde_json::Value) -> Vec<PeerQueryOutcome> {
		self.mesh.federated_query(path, body).await
	}

	/// The AMP well-known discovery document this host advertises.
	pub async fn well_known_discovery(&self) -> Result<WellKnownDiscovery> {
		let self_host = self.host_registry.self_host().await?;
		Ok(WellKnownDiscovery {
			version: "AMP01".to_string(),
			endpoint: self_host.url,
			provider: aimaestro_amp::LOCAL_SUFFIX.to_string(),
			capabilities: vec!["registration".into(), "local-delivery".into(), "relay-queue".into(), "mesh-routing".into()],
		})
	}

	pub async fn export_agent(&self, agent_id: AgentId, repos: Vec<RepoEntry>, out_path: &std::path::Path) -> Result<()> {
		let agent = self.require_agent(agent_id).await?;
		export_agent(&self.agent_registry, &agent, repos, out_path).await
	}

	pub async fn import_agent(&self, archive_path: &std::path::Path, overwrite: bool) -> Result<ImportOutcome> {
		import_agent(&self.agent_registry, archive_path, overwrite).await
	}

	/// Builds, signs, and locally delivers an AMP message from `from_agent_id`.
	pub async fn send_message(&self, from_agent_id: AgentId, opts: CreateMessageOpts) -> Result<Envelope> {
		let sender = self.require_agent(from_agent_id).await?;
		let sender_dir = self.agent_registry.agent_dir(sender.id);
		let keypair = KeyPair::read_from_dir(sender_dir.root())
			.await?
			.ok_or_else(|| AimaestroError::Integrity(format!("agent {} has no identity keys", sender.id)))?;

		let mut envelope = create_message(&sender.amp_identity.address, opts);
		aimaestro_amp::sign(&mut envelope, &keypair)?;

		let recipient_dir = match self.agent_registry.find_by_amp_address(&envelope.to).await {
			Some(recipient) => Some(self.agent_registry.agent_dir(recipient.id).root().to_path_buf()),
			None => None,
		};
		mailbox::deliver(&envelope, sender_dir.root(), recipient_dir.as_deref()).await?;

		Ok(envelope)
	}

	pub async fn create_agent(&self, name: &str, label: &str, working_directory: &str) -> Result<Agent> {
		let self_host = self.host_registry.self_host().await?;
		self.agent_registry.create_agent(name, label, working_directory, self_host.id).await
	}

	/// Interrupt → exit → force-kill-after-1.5s every session, mark the
	/// agent offline, and stop its Subconscious loop.
	pub async fn hibernate_agent(&self, agent_id: AgentId) -> Result<()> {
		let mut agent = self.require_agent(agent_id).await?;
		for session in &agent.sessions {
			if let Err(e) = self.terminal.hibernate(&session.tmux_session_name).await {
				tracing::warn!(agent_id = %agent_id, session = %session.tmux_session_name, error = %e, "hibernate failed for session");
			}
		}
		for session in &mut agent.sessions {
			session.status = SessionStatus::Offline;
		}
		agent.status = agent.recompute_status();
		self.agent_registry.update_agent(agent).await?;
		self.stop_subconscious(agent_id).await;
		Ok(())
	}

	/// Re-creates the agent's primary session's PTY (without attaching a
	/// client) and resumes its Subconscious loop.
	pub async fn wake_agent(&self, agent_id: AgentId) -> Result<()> {
		let mut agent = self.require_agent(agent_id).await?;
		let runtime = self.runtimes.get(agent_id).await?;
		let target = self.attach_target(&agent).await?;
		let session_name = derive_session_name(&agent.name, 0);

		self.terminal
			.wake(AttachRequest {
				session_name: session_name.clone(),
				target,
				working_directory: agent.working_directory.clone().into(),
				session_store: runtime.sessions.clone(),
				client_id: ClientId::new(),
				client_sink: mpsc::channel(1).0,
			})
			.await
			.map_err(|e| AimaestroError::TransientRemote(e.to_string()))?;

		let now = now_ms();
		if let Some(existing) = agent.sessions.iter_mut().find(|s| s.tmux_session_name == session_name) {
			existing.status = SessionStatus::Online;
			existing.last_active = now;
		} else {
			agent.sessions.push(SessionInfo {
				index: SessionIndex(0),
				tmux_session_name: session_name,
				working_directory: agent.working_directory.clone(),
				status: SessionStatus::Online,
				last_active: now,
			});
		}
		agent.status = AgentStatus::Active;
		agent.last_active = now;
		self.agent_registry.update_agent(agent.clone()).await?;
		self.spawn_subconscious(agent.id).await?;
		Ok(())
	}

	pub async fn delete_agent(&self, agent_id: AgentId) -> Result<()> {
		let _ = self.hibernate_agent(agent_id).await;
		self.runtimes.evict(agent_id).await;
		self.agent_registry.delete_agent(agent_id).await
	}

	async fn require_agent(&self, agent_id: AgentId) -> Result<Agent> {
		self.agent_registry.find_by_id(agent_id).await.ok_or_else(|| AimaestroError::not_found(format!("agent {agent_id} not found")))
	}

	async fn spawn_subconscious(&self, agent_id: AgentId) -> Result<()> {
		if self.subconsciouses.read().await.contains_key(&agent_id) {
			return Ok(());
		}
		let runtime = self.runtimes.get(agent_id).await?;
		let agent_dir = self.agent_registry.agent_dir(agent_id);
		let runs = Arc::new(ConsolidationStore::open(agent_dir.root()).await?);

		let subconscious = Arc::new(Subconscious {
			agent_id,
			registry: self.agent_registry.clone(),
			db: runtime.db.clone(),
			slots: self.slots.clone(),
			runs,
			llm: self.llm.clone(),
			embedder: self.embedder.clone(),
			config: SubconsciousConfig {
				projects_dir: dirs_projects_root(),
				message_check_interval: self.config.indexing.message_check_interval,
				consolidation_interval: schedule_interval(&self.config.consolidation.schedule),
				batch_size: self.config.indexing.batch_size,
				n_promote: self.config.consolidation.n_promote,
				d_promote_ms: self.config.consolidation.d_promote.as_millis() as i64,
				dedupe_threshold: self.config.consolidation.dedupe_threshold,
			},
		});
		subconscious.clone().spawn(&self.shutdown);
		self.subconsciouses.write().await.insert(agent_id, subconscious);
		Ok(())
	}

	async fn stop_subconscious(&self, agent_id: AgentId) {
		// The Subconscious task itself only observes the daemon-wide
		// shutdown token; removing it from the map here just stops
		// `wake_agent` from treating it as already running, and lets a
		// fresh `spawn_subconscious` replace it on the next wake.
		self.subconsciouses.write().await.remove(&agent_id);
	}
}

fn dirs_projects_root() -> std::path::PathBuf {
	std::env::var_os("HOME").map(std::path::PathBuf::from).unwrap_or_else(|| std::path::PathBuf::from(".")).join(".aimaestro-projects")
}

/// `"manual"` disables the automatic cadence (an effectively-never
/// interval); anything else runs once a day, the only cron-ish granularity
/// wired through so far.
fn schedule_interval(schedule: &str) -> Duration {
	if schedule.eq_ignore_ascii_case("manual") {
		Duration::from_secs(u64::MAX / 2)
	} else {
		Duration::from_secs(24 * 60 * 60)
	}
}

/// Owns every service for the process's lifetime.
pub struct Daemon {
	pub core: Arc<CoreHandle>,
	shutdown: CancellationToken,
}

impl Daemon {
	/// Constructs every service in order and spawns a Subconscious for each
	/// agent already `Active` in the Agent Registry.
	pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
		tokio::fs::create_dir_all(&config.data_root).await?;

        let host_registry = Arc::new(HostRegistry::open(&config.data_root).await?);
		let agent_registry = Arc::new(AgentRegistry::open(&config.data_root).await?);
		let runtimes = Arc::new(AgentRuntimes::new(agent_registry.clone()));
		let terminal = TerminalService::start();
		let slots = Arc::new(IndexingSlotAllocator::new(config.indexing.max_concurrent_index));
		let mesh = Arc::new(PeerMeshController::new(host_registry.clone()));
		let api_keys = Arc::new(ApiKeyStore::open(&config.data_root).await?);

		let llm: Arc<dyn LlmProvider> = Arc::new(AutoProvider::new(
			Box::new(HttpJsonProvider::new(local_llm_endpoint(), None)),
			Box::new(HttpJsonProvider::new(remote_llm_endpoint(), remote_llm_token())),
		));
		let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());

		let shutdown = CancellationToken::new();
		let core = Arc::new(CoreHandle {
			config: config.clone(),
			host_registry,
			agent_registry: agent_registry.clone(),
			runtimes,
			terminal,
			mesh,
			slots,
			api_keys,
			llm,
			embedder,
			subconsciouses: RwLock::new(HashMap::new()),
			shutdown: shutdown.clone(),
		});

		for agent in agent_registry.list().await.into_iter().filter(|a| a.status == AgentStatus::Active) {
			if let Err(e) = core.spawn_subconscious(agent.id).await {
				tracing::warn!(agent_id = %agent.id, error = %e, "failed to spawn subconscious for active agent");
			}
		}

		Ok(Self { core, shutdown })
	}

	/// Cancels every background task and waits out the shutdown grace
	/// period for in-flight work to reach a suspension point.
	pub async fn shutdown(self) {
		self.shutdown.cancel();
		tokio::time::sleep(SHUTDOWN_GRACE).await;
	}
}

fn local_llm_endpoint() -> String {
	std::env::var("AIMAESTRO_LLM_LOCAL_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:11434/extract".to_string())
}

fn remote_llm_endpoint() -> String {
	std::env::var("AIMAESTRO_LLM_REMOTE_ENDPOINT").unwrap_or_else(|_| "https://api.aimaestro.dev/v1/extract".to_string())
}

fn remote_llm_token() -> Option<String> {
	std::env::var("AIMAESTRO_LLM_REMOTE_TOKEN").ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn bootstrap_with_no_agents_spawns_nothing_and_exposes_self_host() {
		let dir = tempfile::tempdir().unwrap();
		let config = Config { data_root: dir.path().to_path_buf(), ..Config::default() };
		let daemon = Daemon::bootstrap(config).await.unwrap();

		let discovery = daemon.core.well_known_discovery().await.unwrap();
		assert_eq!(discovery.version, "AMP01");
		assert!(discovery.capabilities.contains(&"mesh-routing".to_string()));

		daemon.shutdown().await;
	}

	#[tokio::test]
	async fn create_agent_then_send_message_delivers_locally() {
		let dir = tempfile::tempdir().unwrap();
		let config = Config { data_root: dir.path().to_path_buf(), ..Config::default() };
		let daemon = Daemon::bootstrap(config).await.unwrap();

		let alice = daemon.core.create_agent("alice", "Alice", "/tmp/alice").await.unwrap();
		let bob = daemon.core.create_agent("bob", "Bob", "/tmp/bob").await.unwrap();

		let envelope = daemon
			.core
			.send_message(
				alice.id,
				CreateMessageOpts {
					to: bob.amp_identity.address.clone(),
					subject: "hi".into(),
					priority: aimaestro_amp::Priority::Normal,
					in_reply_to: None,
					expires_at: None,
					payload: aimaestro_amp::Payload { kind: "task".into(), message: "hello".into(), context: serde_json::Map::new() },
				},
			)
			.await
			.unwrap();

		let inbox_dir = daemon.core.agent_registry.agent_dir(bob.id).messages_dir("inbox");
		let entry_path = inbox_dir.join(format!("{}.json", envelope.id));
		assert!(entry_path.is_file());

		daemon.shutdown().await;
	}
}
