//! Host and Organization data model.

use std::collections::BTreeSet;

use aimaestro_primitives::{HostId, TimestampMs};
use serde::{Deserialize, Serialize};

/// Whether a host entry is this daemon's own identity or a known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
	#[serde(rename = "self")]
	SelfHost,
	Remote,
}

/// One entry in the peer mesh, including the local daemon's own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
	pub id: HostId,
	pub name: String,
	/// Preferred non-loopback IP or hostname URL for reaching this host.
	pub url: String,
	/// Additional hostnames/IPs/URLs this host is also known by.
	#[serde(default)]
	pub aliases: BTreeSet<String>,
	pub enabled: bool,
	#[serde(default)]
	pub description: String,
	#[serde(rename = "type")]
	pub kind: HostType,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub synced_at: Option<TimestampMs>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sync_source: Option<HostId>,
}

impl Host {
	/// True if `candidate` (a hostname, IP, or URL) matches this host's id,
	/// url, or any alias under case-insensitive comparison.
	#[must_use]
	pub fn matches(&self, candidate: &str) -> bool {
		let candidate = normalize(candidate);
		normalize(&self.id.0) == candidate
			|| normalize(&self.url) == candidate
			|| self.aliases.iter().any(|a| normalize(a) == candidate)
	}
}

fn normalize(s: &str) -> String {
	s.trim()
		.trim_end_matches('/')
		.to_ascii_lowercase()
}

/// The mesh-wide organization name, once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
	pub name: String,
	pub set_at: TimestampMs,
	pub set_by: HostId,
}

/// On-disk shape of `hosts.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostsFile {
	#[serde(default)]
	pub hosts: Vec<Host>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub organization: Option<Organization>,
}

/// Validates an organization name: `^[a-z][a-z0-9-]*[a-z0-9]$`, 1-63 chars.
#[must_use]
pub fn is_valid_organization_name(name: &str) -> bool {
	if name.is_empty() || name.len() > 63 {
		return false;
	}
	let bytes = name.as_bytes();
	let first_ok = bytes[0].is_ascii_lowercase();
	let last_ok = bytes[bytes.len() - 1].is_ascii_lowercase() || bytes[bytes.len() - 1].is_ascii_digit();
	let middle_ok = bytes.iter().all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
	// Single-character names skip the "distinct first/last" shape but must
	// still be a lowercase letter (the regex `^[a-z][a-z0-9-]*[a-z0-9]$`
	// requires at least 2 characters; a lone "a" satisfies neither group
	// twice, so treat length 1 specially).
	if name.len() == 1 {
		return first_ok;
	}
	first_ok && last_ok && middle_ok
}
