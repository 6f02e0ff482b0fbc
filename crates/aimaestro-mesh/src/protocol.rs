//! Wire shapes for the register-peer and federated-query protocols.

use aimaestro_host_registry::Host;
use aimaestro_primitives::{HostId, PropagationId, TimestampMs};
use serde::{Deserialize, Serialize};

/// Maximum hops a sync wave is allowed to propagate before it's dropped.
pub const MAX_PROPAGATION_DEPTH: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSource {
	pub initiator: HostId,
	pub propagation_id: PropagationId,
	pub propagation_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPeerRequest {
	pub host: Host,
	pub source: RegisterSource,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub organization: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub organization_set_at: Option<TimestampMs>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub organization_set_by: Option<HostId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterPeerResponse {
	pub registered: bool,
	pub already_known: bool,
	#[serde(default)]
	pub known_hosts: Vec<Host>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub host: Option<Host>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub organization: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub organization_adopted: Option<bool>,
}

/// HTTP header marking a federated query so recipients never re-fan-out.
pub const FEDERATED_QUERY_HEADER: &str = "X-Federated-Query";

/// Result of querying one peer during federated fan-out.
#[derive(Debug, Clone)]
pub struct PeerQueryOutcome {
	pub host_id: HostId,
	pub result: Result<serde_json::Value, String>,
}
