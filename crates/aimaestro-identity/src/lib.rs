//! Per-agent Ed25519 identity.
//!
//! # Mental model
//!
//! - Every agent owns exactly one Ed25519 keypair, generated on first use and
//!   persisted to `keys/{private,public}.pem` inside the agent's directory.
//! - The fingerprint derived from the public key is the stable handle other
//!   components use to refer to "this agent's identity" without holding the
//!   key material itself.
//! - Keys MUST travel with the agent on import. If an import declares keys
//!   but the backing files are missing, [`IdentityStore::load_or_generate`]
//!   generates a fresh pair and reports that it did so, so the caller can
//!   surface a warning instead of silently rotating an identity.

pub mod keys;
pub mod registrations;
pub mod spki;

use std::path::Path;

use aimaestro_primitives::Result;
pub use keys::{fingerprint_of, verify, KeyPair};
pub use registrations::Registration;

/// Outcome of loading an agent's identity from disk.
pub struct LoadedIdentity {
	/// The resolved keypair, either read from disk or freshly generated.
	pub keypair: KeyPair,
	/// True if no key material was found and a new pair was generated.
	pub generated: bool,
}

/// Loads an agent's keypair from `dir`, generating and persisting a new one
/// if none exists yet.
pub async fn load_or_generate(dir: &Path) -> Result<LoadedIdentity> {
	if let Some(keypair) = KeyPair::read_from_dir(dir).await? {
		return Ok(LoadedIdentity {
			keypair,
			generated: false,
		});
	}

	let keypair = KeyPair::generate();
	keypair.write_to_dir(dir).await?;
	tracing::info!(dir = %dir.display(), fingerprint = %keypair.fingerprint(), "generated new agent identity");

	Ok(LoadedIdentity {
		keypair,
		generated: true,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn load_or_generate_generates_once_then_reuses() {
		let dir = tempfile::tempdir().unwrap();

		let first = load_or_generate(dir.path()).await.unwrap();
		assert!(first.generated);

		let second = load_or_generate(dir.path()).await.unwrap();
		assert!(!second.generated);
		assert_eq!(second.keypair.fingerprint(), first.keypair.fingerprint());
	}
}
