//! `PeerMeshController`: handles inbound register-peer requests, originates
//! sync waves, and fans out federated queries.

use std::time::Duration;

use aimaestro_host_registry::{Host, HostRegistry, HostType};
use aimaestro_primitives::{now_ms, AimaestroError, ConflictKind, HostId, PropagationId, Result};

use crate::propagation::PropagationCache;
use crate::protocol::{
	PeerQueryOutcome, RegisterPeerRequest, RegisterPeerResponse, RegisterSource, FEDERATED_QUERY_HEADER, MAX_PROPAGATION_DEPTH,
};

/// Per-peer deadline for both registration and federated query requests.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PeerMeshController {
	registry: std::sync::Arc<HostRegistry>,
	propagation: PropagationCache,
	client: reqwest::Client,
}

impl PeerMeshController {
	#[must_use]
	pub fn new(registry: std::sync::Arc<HostRegistry>) -> Self {
		Self {
			registry,
			propagation: PropagationCache::default(),
			client: reqwest::Client::builder().timeout(PEER_TIMEOUT).build().unwrap_or_default(),
		}
	}

	/// Handles an inbound register-peer request, per the server algorithm:
	/// depth/propagation-id loop suppression, self-collision rejection,
	/// organization reconciliation, known-peer dedup, and peer insertion.
	pub async fn register_peer(&self, req: RegisterPeerRequest) -> Result<RegisterPeerResponse> {
		if req.host.id.0.is_empty() || req.host.url.is_empty() {
			return Err(AimaestroError::validation("register-peer request missing host id or url"));
		}

		if req.source.propagation_depth > MAX_PROPAGATION_DEPTH {
			return Ok(RegisterPeerResponse { registered: false, already_known: true, ..Default::default() });
		}

		if self.propagation.seen_or_insert(req.source.propagation_id).await {
			return Ok(RegisterPeerResponse { registered: false, already_known: true, ..Default::default() });
		}

		if self.registry.is_self(&req.host.id.0).await || self.registry.is_self(&req.host.url).await {
			return Err(AimaestroError::validation("refusing to register self as a peer"));
		}

		let mut organization_adopted = None;
		if let Some(org_name) = &req.organization {
			let set_at = req.organization_set_at.unwrap_or_else(now_ms);
			let set_by = req.organization_set_by.clone().unwrap_or_else(|| req.host.id.clone());
			match self.registry.adopt_organization(org_name, set_at, set_by).await {
				Ok(adopted) => organization_adopted = Some(adopted),
				Err(AimaestroError::Conflict(ConflictKind::OrganizationMismatch)) => {
					return Err(AimaestroError::Conflict(ConflictKind::OrganizationMismatch));
				}
				Err(e) => return Err(e),
			}
		}

		let snapshot = self.registry.snapshot().await;
		let already_known = snapshot.file.hosts.iter().any(|h| {
			h.kind != HostType::SelfHost && (h.matches(&req.host.id.0) || req.host.aliases.iter().any(|a| h.matches(a)))
		});

		if already_known {
			let known_hosts = peers_excluding(&snapshot.file.hosts, &req.host.id);
			return Ok(RegisterPeerResponse { registered: false, already_known: true, known_hosts, ..Default::default() });
		}

		let mut incoming = req.host;
		incoming.kind = HostType::Remote;
		incoming.synced_at = Some(now_ms());
		incoming.sync_source = Some(req.source.initiator);
		self.registry.add_host(incoming.clone()).await?;

		let self_identity = self.registry.self_host().await?;
		let snapshot = self.registry.snapshot().await;
		let known_hosts = peers_excluding(&snapshot.file.hosts, &incoming.id);

		Ok(RegisterPeerResponse {
			registered: true,
			already_known: false,
			known_hosts,
			host: Some(self_identity),
			organization: snapshot.file.organization.as_ref().map(|o| o.name.clone()),
			organization_adopted,
		})
	}

	/// Originates a sync wave: POSTs register-peer to every currently known
	/// peer with a fresh propagation id at depth 0. Any `knownHosts` entry the
	/// peer returns that isn't already in our registry triggers a follow-up
	/// registration at depth 1, bounded by [`MAX_PROPAGATION_DEPTH`] and the
	/// propagation-id cache so convergence terminates.
	pub async fn sync_with_all_peers(&self) -> Vec<(HostId, Result<RegisterPeerResponse>)> {
		let self_identity = match self.registry.self_host().await {
			Ok(h) => h,
			Err(e) => return vec![(HostId(String::new()), Err(e))],
		};
		let snapshot = self.registry.snapshot().await;
		let peers: Vec<Host> = snapshot.file.hosts.into_iter().filter(|h| h.kind != HostType::SelfHost).collect();

		let propagation_id = PropagationId::new();
		let mut results = Vec::new();
		for peer in &peers {
			let outcome = self.register_with_remote(peer, &self_identity, propagation_id, 0).await;
			if let Ok(response) = &outcome {
				self.follow_up_unknown_hosts(response, &self_identity, propagation_id, 1).await;
			}
			results.push((peer.id.clone(), outcome));
		}
		results
	}

	async fn follow_up_unknown_hosts(&self, response: &RegisterPeerResponse, self_identity: &Host, propagation_id: PropagationId, depth: u32) {
		if depth > MAX_PROPAGATION_DEPTH {
			return;
		}
		for candidate in &response.known_hosts {
			if self.registry.is_self(&candidate.id.0).await {
				continue;
			}
			let already_known = self.registry.snapshot().await.file.hosts.iter().any(|h| h.matches(&candidate.id.0));
			if already_known {
				continue;
			}
			let _ = self.register_with_remote(candidate, self_identity, propagation_id, depth).await;
		}
	}

	async fn register_with_remote(&self, peer: &Host, self_identity: &Host, propagation_id: PropagationId, depth: u32) -> Result<RegisterPeerResponse> {
		let body = RegisterPeerRequest {
			host: self_identity.clone(),
			source: RegisterSource { initiator: self_identity.id.clone(), propagation_id, propagation_depth: depth },
			organization: None,
			organization_set_at: None,
			organization_set_by: None,
		};

		let response = self
			.client
			.post(format!("{}/mesh/register-peer", peer.url))
			.json(&body)
			.send()
			.await
			.map_err(|e| AimaestroError::TransientRemote(e.to_string()))?;

		response.json::<RegisterPeerResponse>().await.map_err(|e| AimaestroError::TransientRemote(e.to_string()))
	}

	/// Fans a query out to every known peer, marking the request so
	/// recipients handle it locally only. First response wins on key
	/// collision in the returned aggregate; failed peers are reported but do
	/// not fail the whole call.
	pub async fn federated_query(&self, path: &str, body: &serde_json::Value) -> Vec<PeerQueryOutcome> {
		let snapshot = self.registry.snapshot().await;
		let peers: Vec<Host> = snapshot.file.hosts.into_iter().filter(|h| h.kind != HostType::SelfHost).collect();

		let mut outcomes = Vec::with_capacity(peers.len());
		for peer in peers {
			let result = self
				.client
				.post(format!("{}{path}", peer.url))
				.header(FEDERATED_QUERY_HEADER, "true")
				.json(body)
				.send()
				.await;
			let parsed = match result {
				Ok(resp) => resp.json::<serde_json::Value>().await.map_err(|e| e.to_string()),
				Err(e) => Err(e.to_string()),
			};
			outcomes.push(PeerQueryOutcome { host_id: peer.id, result: parsed });
		}
		outcomes
	}
}

/// Every known peer except `excluding`, used for the `knownHosts` field.
fn peers_excluding(hosts: &[Host], excluding: &HostId) -> Vec<Host> {
	hosts.iter().filter(|h| h.kind != HostType::SelfHost && h.id != *excluding).cloned().collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use aimaestro_host_registry::env::HostEnvironment;
	use std::net::Ipv4Addr;
	use std::sync::Arc;

	struct FixedEnv;
	impl HostEnvironment for FixedEnv {
		fn hostname(&self) -> String {
			"forge".into()
		}
		fn local_ipv4_addrs(&self) -> Vec<Ipv4Addr> {
			vec![Ipv4Addr::new(192, 168, 1, 9)]
		}
	}

	async fn controller() -> PeerMeshController {
		let dir = tempfile::tempdir().unwrap();
		let registry = Arc::new(HostRegistry::open_with_env(dir.path(), Arc::new(FixedEnv)).await.unwrap());
		PeerMeshController::new(registry)
	}

	fn sample_host(id: &str) -> Host {
		Host {
			id: HostId(id.into()),
			name: id.into(),
			url: format!("http://{id}.example"),
			aliases: Default::default(),
			enabled: true,
			description: String::new(),
			kind: HostType::Remote,
			synced_at: None,
			sync_source: None,
		}
	}

	fn request(host: Host, depth: u32) -> RegisterPeerRequest {
		RegisterPeerRequest {
			host,
			source: RegisterSource { initiator: HostId("peer-a".into()), propagation_id: PropagationId::new(), propagation_depth: depth },
			organization: None,
			organization_set_at: None,
			organization_set_by: None,
		}
	}

	#[tokio::test]
	async fn first_registration_succeeds_and_is_known_on_retry() {
		let controller = controller().await;
		let req = request(sample_host("peer-a"), 0);
		let response = controller.register_peer(req.clone()).await.unwrap();
		assert!(response.registered);

		let mut retry = req;
		retry.source.propagation_id = PropagationId::new();
		let response = controller.register_peer(retry).await.unwrap();
		assert!(!response.registered);
		assert!(response.already_known);
	}

	#[tokio::test]
	async fn depth_beyond_maximum_is_rejected_without_propagating() {
		let controller = controller().await;
		let req = request(sample_host("peer-b"), MAX_PROPAGATION_DEPTH + 1);
		let response = controller.register_peer(req).await.unwrap();
		assert!(!response.registered);
		assert!(response.already_known);
	}

	#[tokio::test]
	async fn repeated_propagation_id_is_suppressed() {
		let controller = controller().await;
		let req = request(sample_host("peer-c"), 0);
		let propagation_id = req.source.propagation_id;

		controller.register_peer(req).await.unwrap();

		let mut second = request(sample_host("peer-d"), 0);
		second.source.propagation_id = propagation_id;
		let response = controller.register_peer(second).await.unwrap();
		assert!(response.already_known);
	}

	#[tokio::test]
	async fn self_identity_cannot_be_registered_as_a_peer() {
		let controller = controller().await;
		let req = request(sample_host("forge"), 0);
		assert!(controller.register_peer(req).await.is_err());
	}
}
