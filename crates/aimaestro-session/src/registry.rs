//! `SessionStore`: the Terminal Broker's source of truth for which sessions
//! it intends to have running, reconciled against what's actually alive.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use aimaestro_primitives::{now_ms, Result, TimestampMs};
use tokio::sync::{Mutex, RwLock};

use crate::persistence::SessionsFileStore;
use crate::types::{SessionRecord, SessionsFile};

/// One recorded session, classified against the multiplexer's live list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledSession {
	pub id: String,
	pub working_directory: PathBuf,
	pub created_at: TimestampMs,
	/// `true` if a live multiplexer session of this name currently exists.
	pub live: bool,
}

/// Owns `sessions.json` for one agent.
pub struct SessionStore {
	store: SessionsFileStore,
	cache: RwLock<Vec<SessionRecord>>,
	write_lock: Mutex<()>,
}

impl SessionStore {
	/// Loads (or initializes) the store from `agent_dir/sessions.json`.
	pub async fn open(agent_dir: &Path) -> Result<Self> {
		let store = SessionsFileStore::new(agent_dir);
		let file = store.read().await?;
		Ok(Self {
			store,
			cache: RwLock::new(file.sessions),
			write_lock: Mutex::new(()),
		})
	}

	/// Current recorded intent, as last read or written. Never touches disk.
	pub async fn list(&self) -> Vec<SessionRecord> {
		self.cache.read().await.clone()
	}

	/// Records (or refreshes) intent for session `id`. Upsert by `id`: a
	/// second `record` call for the same session updates its working
	/// directory in place rather than duplicating the entry, and preserves
	/// the original `createdAt`.
	pub async fn record(&self, id: &str, working_directory: PathBuf) -> Result<SessionRecord> {
		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;

		let record = if let Some(existing) = cache.iter_mut().find(|s| s.id == id) {
			existing.working_directory = working_directory;
			existing.clone()
		} else {
			let record = SessionRecord {
				id: id.to_string(),
				working_directory,
				created_at: now_ms(),
			};
			cache.push(record.clone());
			record
		};

		let snapshot = SessionsFile { sessions: cache.clone() };
		drop(cache);
		self.store.write(&snapshot).await?;
		Ok(record)
	}

	/// Removes recorded intent for `id`. Called on hibernate; a no-op if
	/// `id` was never recorded or already removed.
	pub async fn remove(&self, id: &str) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;
		cache.retain(|s| s.id != id);
		let snapshot = SessionsFile { sessions: cache.clone() };
		drop(cache);
		self.store.write(&snapshot).await
	}

	/// Computes the resumable set: every recorded session, classified by
	/// whether `live_session_names` already shows it alive. A recorded
	/// session absent from `live_session_names` is one the Terminal Broker
	/// must re-create (attach-to-or-create) in its recorded working
	/// directory; one present is already running and just needs a new
	/// subscriber attached.
	pub async fn reconcile(&self, live_session_names: &[String]) -> Vec<ReconciledSession> {
		let live: HashSet<&str> = live_session_names.iter().map(String::as_str).collect();
		self.cache
			.read()
			.await
			.iter()
			.map(|s| ReconciledSession {
				id: s.id.clone(),
				working_directory: s.working_directory.clone(),
				created_at: s.created_at,
				live: live.contains(s.id.as_str()),
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn record_upserts_by_id_and_preserves_created_at() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::open(dir.path()).await.unwrap();

		let first = store.record("lola", "/home/lola".into()).await.unwrap();
		let second = store.record("lola", "/home/lola/project".into()).await.unwrap();

		assert_eq!(second.created_at, first.created_at);
		assert_eq!(second.working_directory, PathBuf::from("/home/lola/project"));
		assert_eq!(store.list().await.len(), 1);
	}

	#[tokio::test]
	async fn remove_is_a_noop_on_unknown_id() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::open(dir.path()).await.unwrap();
		store.remove("never-recorded").await.unwrap();
		assert!(store.list().await.is_empty());
	}

	#[tokio::test]
	async fn reconcile_classifies_recorded_sessions_against_live_list() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionStore::open(dir.path()).await.unwrap();
		store.record("lola", "/home/lola".into()).await.unwrap();
		store.record("lola-1", "/home/lola/work".into()).await.unwrap();

		let reconciled = store.reconcile(&["lola".to_string()]).await;
		assert_eq!(reconciled.len(), 2);
		let lola = reconciled.iter().find(|s| s.id == "lola").unwrap();
		let lola_1 = reconciled.iter().find(|s| s.id == "lola-1").unwrap();
		assert!(lola.live);
		assert!(!lola_1.live);
	}

	#[tokio::test]
	async fn reopening_reloads_recorded_state_from_disk() {
		let dir = tempfile::tempdir().unwrap();
		{
			let store = SessionStore::open(dir.path()).await.unwrap();
			store.record("lola", "/home/lola".into()).await.unwrap();
		}
		let reopened = SessionStore::open(dir.path()).await.unwrap();
		assert_eq!(reopened.list().await.len(), 1);
	}
}
