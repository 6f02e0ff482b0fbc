//! AMP address parsing: `agent@tenant.provider`.

use aimaestro_primitives::{AimaestroError, Result};

/// The domain suffix that marks an address as local mesh routing rather than
/// an external provider.
pub const LOCAL_SUFFIX: &str = "aimaestro.local";

/// A parsed AMP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
	/// The agent name component.
	pub agent: String,
	/// The tenant label. For local addresses this is the destination host id.
	pub tenant: String,
	/// The provider domain (`"aimaestro.local"` for local addresses).
	pub provider: String,
	/// Whether this address routes within the mesh rather than to an
	/// external provider.
	pub is_local: bool,
}

impl Address {
	/// Renders the address back to its canonical `agent@tenant.provider` form.
	#[must_use]
	pub fn to_canonical_string(&self) -> String {
		format!("{}@{}.{}", self.agent, self.tenant, self.provider)
	}
}

/// Parses an AMP address string, applying the default tenant for bare agent
/// names and dotless local hosts.
///
/// Boundary rules (normative, see the testable properties):
/// - `"foo"` with `default_tenant = "t"` → `foo@t.aimaestro.local`, local.
/// - `"foo@bar"` (no dot in `bar`) → `foo@bar.aimaestro.local`, local.
/// - `"foo@bar.aimaestro.local"` → tenant=`bar`, local.
/// - `"foo@ws.crabmail.ai"` → tenant=`ws`, provider=`crabmail.ai`, external.
pub fn parse_address(raw: &str, default_tenant: &str) -> Result<Address> {
	let raw = raw.trim();
	if raw.is_empty() {
		return Err(AimaestroError::validation("address must not be empty"));
	}

	let Some((agent, domain)) = raw.split_once('@') else {
		if !is_valid_agent_token(raw) {
			return Err(AimaestroError::validation(format!("invalid agent token: {raw}")));
		}
		return Ok(Address {
			agent: raw.to_string(),
			tenant: default_tenant.to_string(),
			provider: LOCAL_SUFFIX.to_string(),
			is_local: true,
		});
	};

	if !is_valid_agent_token(agent) {
		return Err(AimaestroError::validation(format!("invalid agent token: {agent}")));
	}
	if domain.is_empty() {
		return Err(AimaestroError::validation("address domain must not be empty"));
	}

	if let Some(tenant) = domain.strip_suffix(&format!(".{LOCAL_SUFFIX}")) {
		return Ok(Address {
			agent: agent.to_string(),
			tenant: tenant.to_string(),
			provider: LOCAL_SUFFIX.to_string(),
			is_local: true,
		});
	}

	if !domain.contains('.') {
		return Ok(Address {
			agent: agent.to_string(),
			tenant: domain.to_string(),
			provider: LOCAL_SUFFIX.to_string(),
			is_local: true,
		});
	}

	let (tenant, provider) = domain
		.split_once('.')
		.expect("domain.contains('.') checked above");

	Ok(Address {
		agent: agent.to_string(),
		tenant: tenant.to_string(),
		provider: provider.to_string(),
		is_local: false,
	})
}

fn is_valid_agent_token(s: &str) -> bool {
	!s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_token_expands_to_default_tenant() {
		let addr = parse_address("foo", "t").unwrap();
		assert_eq!(addr.to_canonical_string(), "foo@t.aimaestro.local");
		assert!(addr.is_local);
	}

	#[test]
	fn dotless_domain_is_local() {
		let addr = parse_address("foo@bar", "t").unwrap();
		assert_eq!(addr.tenant, "bar");
		assert_eq!(addr.provider, LOCAL_SUFFIX);
		assert!(addr.is_local);
	}

	#[test]
	fn aimaestro_local_suffix_is_local() {
		let addr = parse_address("foo@bar.aimaestro.local", "t").unwrap();
		assert_eq!(addr.tenant, "bar");
		assert!(addr.is_local);
	}

	#[test]
	fn other_dotted_domain_is_external() {
		let addr = parse_address("foo@ws.crabmail.ai", "t").unwrap();
		assert_eq!(addr.tenant, "ws");
		assert_eq!(addr.provider, "crabmail.ai");
		assert!(!addr.is_local);
	}

	#[test]
	fn rejects_invalid_agent_token() {
		assert!(parse_address("foo bar@baz.com", "t").is_err());
	}

	#[test]
	fn rejects_empty_address() {
		assert!(parse_address("", "t").is_err());
	}
}
