//! Agent Messaging Protocol: addresses and signed envelopes.
//!
//! This crate is pure data plus crypto — it knows nothing about how an
//! envelope gets from one host to another. That's the Peer Mesh Controller's
//! job ([`aimaestro_mesh`]) and the Terminal Broker's job for relay bytes;
//! this crate only builds, signs, and verifies the envelopes themselves.

pub mod address;
pub mod envelope;

pub use address::{parse_address, Address, LOCAL_SUFFIX};
pub use envelope::{
	canonical_signing_bytes, create_message, sign, verify, CreateMessageOpts, Envelope,
	LocalMetadata, MessageStatus, Payload, Priority,
};
