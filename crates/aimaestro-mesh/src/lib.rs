//! Peer Mesh Controller: register-peer protocol, propagation-id loop
//! suppression, sync-wave origination, and federated query fan-out.
//!
//! A reactive service layered directly on [`aimaestro_host_registry`]
//! rather than its own actor: every mutation it performs already goes
//! through the Host Registry's own write lock, so there is no additional
//! shared mutable state here that needs message-passing isolation.

mod controller;
mod propagation;
mod protocol;

pub use controller::{PeerMeshController, PEER_TIMEOUT};
pub use propagation::{PropagationCache, DEFAULT_CAPACITY};
pub use protocol::{
	PeerQueryOutcome, RegisterPeerRequest, RegisterPeerResponse, RegisterSource, FEDERATED_QUERY_HEADER, MAX_PROPAGATION_DEPTH,
};
