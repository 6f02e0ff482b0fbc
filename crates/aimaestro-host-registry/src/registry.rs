//! The Host Registry service: self-identity, peer list, and organization.
//!
//! # Mental model
//!
//! - Exactly one host in `hosts.json` has `kind = Self`.
//! - Writers serialize through `write_lock`; a successful write refreshes
//!   the cached snapshot and bumps `version` so any reader holding a stale
//!   snapshot can tell it's out of date.
//! - Readers that only need "good enough, might be one write behind" data
//!   (e.g. federated query fan-out) call [`HostRegistry::snapshot`], which
//!   never touches disk. Callers needing a fully current view call
//!   [`HostRegistry::reload`] first.

use std::sync::Arc;

use aimaestro_primitives::{now_ms, AimaestroError, ConflictKind, HostId, Result};
use tokio::sync::{Mutex, RwLock};

use crate::env::{preferred_address, HostEnvironment, SystemHostEnvironment};
use crate::persistence::HostsFileStore;
use crate::types::{is_valid_organization_name, Host, HostType, HostsFile, Organization};

/// A consistent, versioned read of the hosts file.
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub file: HostsFile,
	pub version: u64,
}

/// Owns `hosts.json` for one host daemon.
pub struct HostRegistry {
	store: HostsFileStore,
	env: Arc<dyn HostEnvironment>,
	cache: RwLock<Snapshot>,
	write_lock: Mutex<()>,
}

impl HostRegistry {
	/// Loads (or initializes) the registry from `data_root/hosts.json` using
	/// the real OS environment for self-host discovery.
	pub async fn open(data_root: &std::path::Path) -> Result<Self> {
		Self::open_with_env(data_root, Arc::new(SystemHostEnvironment)).await
	}

	/// Like [`Self::open`] but with an injectable [`HostEnvironment`], used
	/// by tests to pin the hostname/addresses.
	pub async fn open_with_env(
		data_root: &std::path::Path,
		env: Arc<dyn HostEnvironment>,
	) -> Result<Self> {
		let store = HostsFileStore::new(data_root);
		let file = store.read().await?;
		let registry = Self {
			store,
			env,
			cache: RwLock::new(Snapshot { file, version: 0 }),
			write_lock: Mutex::new(()),
		};
		registry.self_host().await?;
		Ok(registry)
	}

	/// A cached, possibly one-write-stale snapshot. Never touches disk.
	pub async fn snapshot(&self) -> Snapshot {
		self.cache.read().await.clone()
	}

	/// Re-reads `hosts.json` from disk and refreshes the cache.
	pub async fn reload(&self) -> Result<Snapshot> {
		let file = self.store.read().await?;
		let mut cache = self.cache.write().await;
		cache.file = file;
		cache.version += 1;
		Ok(cache.clone())
	}

	/// Returns (synthesizing if absent) this daemon's own host entry.
	pub async fn self_host(&self) -> Result<Host> {
		{
			let cache = self.cache.read().await;
			if let Some(existing) = cache.file.hosts.iter().find(|h| h.kind == HostType::SelfHost) {
				return Ok(existing.clone());
			}
		}

		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;
		if let Some(existing) = cache.file.hosts.iter().find(|h| h.kind == HostType::SelfHost) {
			return Ok(existing.clone());
		}

		let hostname = self.env.hostname();
		let id = HostId::canonicalize(&hostname);
		let addr = preferred_address(&self.env.local_ipv4_addrs())
			.ok_or_else(|| AimaestroError::validation("no non-loopback address available for self host"))?;

		let host = Host {
			id: id.clone(),
			name: hostname,
			url: format!("http://{addr}"),
			aliases: Default::default(),
			enabled: true,
			description: String::new(),
			kind: HostType::SelfHost,
			synced_at: None,
			sync_source: None,
		};

		cache.file.hosts.push(host.clone());
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await?;

		Ok(host)
	}

	/// True if `candidate` (hostname, IP, or URL) identifies this daemon.
	pub async fn is_self(&self, candidate: &str) -> bool {
		let cache = self.cache.read().await;
		cache
			.file
			.hosts
			.iter()
			.any(|h| h.kind == HostType::SelfHost && h.matches(candidate))
	}

	/// Adds a peer host, rejecting collisions with any existing non-self
	/// host (by id, url, or alias, case-insensitively) and rejecting an
	/// attempt to add self as a peer.
	pub async fn add_host(&self, host: Host) -> Result<()> {
		if host.kind == HostType::SelfHost {
			return Err(AimaestroError::validation("cannot add a self-typed host as a peer"));
		}

		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;

		let is_self_collision = cache
			.file
			.hosts
			.iter()
			.any(|h| h.kind == HostType::SelfHost && (h.matches(&host.id.0) || h.matches(&host.url)));
		if is_self_collision {
			return Err(AimaestroError::validation("refusing to add self as a peer"));
		}

		let collides = cache.file.hosts.iter().any(|h| {
			h.matches(&host.id.0) || h.matches(&host.url) || host.aliases.iter().any(|a| h.matches(a))
		});
		if collides {
			return Err(AimaestroError::Conflict(ConflictKind::HostAlreadyKnown));
		}

		cache.file.hosts.push(host);
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await
	}

	/// Adopts `name` as the mesh organization if none is set yet.
	///
	/// No-op if the local organization is already set to the same name.
	/// Fails with [`ConflictKind::OrganizationMismatch`] if set to a
	/// different name.
	pub async fn adopt_organization(&self, name: &str, set_at: i64, set_by: HostId) -> Result<bool> {
		if !is_valid_organization_name(name) {
			return Err(AimaestroError::validation(format!("invalid organization name: {name}")));
		}

		let _guard = self.write_lock.lock().await;
		let mut cache = self.cache.write().await;

		if let Some(existing) = &cache.file.organization {
			if existing.name == name {
				return Ok(false);
			}
			return Err(AimaestroError::Conflict(ConflictKind::OrganizationMismatch));
		}

		cache.file.organization = Some(Organization {
			name: name.to_string(),
			set_at,
			set_by,
		});
		cache.version += 1;
		let snapshot = cache.file.clone();
		drop(cache);
		self.store.write(&snapshot).await?;
		Ok(true)
	}

	/// Checks whether peering with a remote organization is permitted: equal
	/// organizations, or either side unset.
	#[must_use]
	pub fn organizations_compatible(local: Option<&str>, remote: Option<&str>) -> bool {
		match (local, remote) {
			(Some(a), Some(b)) => a == b,
			_ => true,
		}
	}

	/// Returns the current timestamp helper used when stamping `synced_at`
	/// fields on imported/updated hosts.
	#[must_use]
	pub fn now() -> i64 {
		now_ms()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::Ipv4Addr;

	struct FixedEnv {
		hostname: String,
		addrs: Vec<Ipv4Addr>,
	}

	impl HostEnvironment for FixedEnv {
		fn hostname(&self) -> String {
			self.hostname.clone()
		}
		fn local_ipv4_addrs(&self) -> Vec<Ipv4Addr> {
			self.addrs.clone()
		}
	}

	async fn open_fixed(dir: &std::path::Path) -> HostRegistry {
		HostRegistry::open_with_env(
			dir,
			Arc::new(FixedEnv {
				hostname: "Forge.local".into(),
				addrs: vec![Ipv4Addr::new(192, 168, 1, 9)],
			}),
		)
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn self_host_is_synthesized_once_and_reused() {
		let dir = tempfile::tempdir().unwrap();
		let registry = open_fixed(dir.path()).await;
		let first = registry.self_host().await.unwrap();
		assert_eq!(first.id.0, "forge");
		assert_eq!(first.url, "http://192.168.1.9");

		let second = registry.self_host().await.unwrap();
		assert_eq!(second.id, first.id);

		let snapshot = registry.snapshot().await;
		assert_eq!(snapshot.file.hosts.len(), 1);
	}

	#[tokio::test]
	async fn add_host_rejects_collision_and_self() {
		let dir = tempfile::tempdir().unwrap();
		let registry = open_fixed(dir.path()).await;

		let peer = Host {
			id: HostId("peer-a".into()),
			name: "peer-a".into(),
			url: "http://10.0.0.2".into(),
			aliases: Default::default(),
			enabled: true,
			description: String::new(),
			kind: HostType::Remote,
			synced_at: None,
			sync_source: None,
		};
		registry.add_host(peer.clone()).await.unwrap();

		let collide = Host {
			id: HostId("peer-b".into()),
			..peer.clone()
		};
		let err = registry.add_host(collide).await.unwrap_err();
		assert!(matches!(err, AimaestroError::Conflict(ConflictKind::HostAlreadyKnown)));

		let self_as_peer = Host {
			id: HostId("forge".into()),
			name: "forge".into(),
			url: "http://192.168.1.9".into(),
			aliases: Default::default(),
			enabled: true,
			description: String::new(),
			kind: HostType::Remote,
			synced_at: None,
			sync_source: None,
		};
		assert!(registry.add_host(self_as_peer).await.is_err());
	}

	#[tokio::test]
	async fn adopt_organization_flows() {
		let dir = tempfile::tempdir().unwrap();
		let registry = open_fixed(dir.path()).await;

		let adopted = registry
			.adopt_organization("acme", 1, HostId("h2".into()))
			.await
			.unwrap();
		assert!(adopted);

		let noop = registry
			.adopt_organization("acme", 2, HostId("h3".into()))
			.await
			.unwrap();
		assert!(!noop);

		let err = registry
			.adopt_organization("other", 3, HostId("h4".into()))
			.await
			.unwrap_err();
		assert!(matches!(err, AimaestroError::Conflict(ConflictKind::OrganizationMismatch)));
	}

	#[tokio::test]
	async fn is_self_checks_hostname_and_url() {
		let dir = tempfile::tempdir().unwrap();
		let registry = open_fixed(dir.path()).await;
		registry.self_host().await.unwrap();

		assert!(registry.is_self("forge").await);
		assert!(registry.is_self("http://192.168.1.9").await);
		assert!(!registry.is_self("someone-else").await);
	}
}
