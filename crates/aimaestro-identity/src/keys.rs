//! Keypair generation, PEM persistence, and fingerprinting.

use std::path::Path;

use aimaestro_primitives::{AimaestroError, Result};
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::spki;

const PEM_PUBLIC_LABEL: &str = "PUBLIC KEY";
const PEM_PRIVATE_LABEL: &str = "PRIVATE KEY";

/// An agent's Ed25519 identity, held in memory for the lifetime of the agent.
#[derive(Clone)]
pub struct KeyPair {
	signing_key: SigningKey,
}

impl KeyPair {
	/// Generates a brand-new keypair.
	#[must_use]
	pub fn generate() -> Self {
		let mut csprng = rand::rngs::OsRng;
		Self {
			signing_key: SigningKey::generate(&mut csprng),
		}
	}

	/// Reconstructs a keypair from a raw 32-byte Ed25519 seed.
	#[must_use]
	pub fn from_seed(seed: &[u8; 32]) -> Self {
		Self {
			signing_key: SigningKey::from_bytes(seed),
		}
	}

	/// The raw 32-byte public key.
	#[must_use]
	pub fn public_bytes(&self) -> [u8; 32] {
		self.signing_key.verifying_key().to_bytes()
	}

	/// The raw 32-byte private seed.
	#[must_use]
	pub fn private_seed(&self) -> [u8; 32] {
		self.signing_key.to_bytes()
	}

	/// Signs `message` with this agent's private key.
	#[must_use]
	pub fn sign(&self, message: &[u8]) -> Signature {
		self.signing_key.sign(message)
	}

	/// The PEM-encoded SPKI public key (0644 on disk).
	#[must_use]
	pub fn public_pem(&self) -> String {
		encode_pem(PEM_PUBLIC_LABEL, &spki::wrap_public_spki(&self.public_bytes()))
	}

	/// The PEM-encoded PKCS8 private key (0600 on disk).
	#[must_use]
	pub fn private_pem(&self) -> String {
		encode_pem(PEM_PRIVATE_LABEL, &spki::wrap_private_pkcs8(&self.private_seed()))
	}

	/// Parses a keypair back out of its private PEM form.
	pub fn from_private_pem(pem: &str) -> Result<Self> {
		let der = decode_pem(pem, PEM_PRIVATE_LABEL)?;
		let seed = spki::unwrap_private_pkcs8(&der)
			.ok_or_else(|| AimaestroError::Integrity("malformed private key PEM".into()))?;
		Ok(Self::from_seed(&seed))
	}

	/// `"SHA256:"` + base64 of `sha256(raw 32-byte public key)`.
	#[must_use]
	pub fn fingerprint(&self) -> String {
		fingerprint_of(&self.public_bytes())
	}

	/// Writes `identity.json`-adjacent key files at `dir/keys/{private,public}.pem`
	/// with 0600/0644 permissions, creating the `keys` directory if needed.
	pub async fn write_to_dir(&self, dir: &Path) -> Result<()> {
		let keys_dir = dir.join("keys");
		tokio::fs::create_dir_all(&keys_dir).await?;

		let private_path = keys_dir.join("private.pem");
		let public_path = keys_dir.join("public.pem");

		tokio::fs::write(&private_path, self.private_pem()).await?;
		tokio::fs::write(&public_path, self.public_pem()).await?;

		set_mode(&private_path, 0o600).await?;
		set_mode(&public_path, 0o644).await?;

		Ok(())
	}

	/// Reads a keypair back from `dir/keys/private.pem`, if present.
	pub async fn read_from_dir(dir: &Path) -> Result<Option<Self>> {
		let private_path = dir.join("keys").join("private.pem");
		match tokio::fs::read_to_string(&private_path).await {
			Ok(pem) => Self::from_private_pem(&pem).map(Some),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}
}

/// Verifies a signature against a stored 32-byte public key, reconstructing
/// the SPKI wrapper around it before handing both to `ed25519-dalek`.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature_bytes: &[u8]) -> Result<bool> {
	let verifying_key = VerifyingKey::from_bytes(public_key)
		.map_err(|e| AimaestroError::Integrity(format!("invalid public key: {e}")))?;
	let signature = Signature::from_slice(signature_bytes)
		.map_err(|e| AimaestroError::Integrity(format!("invalid signature encoding: {e}")))?;
	Ok(verifying_key.verify(message, &signature).is_ok())
}

/// `"SHA256:"` + base64 of `sha256(raw 32-byte public key)`.
#[must_use]
pub fn fingerprint_of(public_key: &[u8; 32]) -> String {
	let digest = Sha256::digest(public_key);
	format!("SHA256:{}", base64::engine::general_purpose::STANDARD.encode(digest))
}

fn encode_pem(label: &str, der: &[u8]) -> String {
	let body = base64::engine::general_purpose::STANDARD.encode(der);
	let mut pem = format!("-----BEGIN {label}-----\n");
	for chunk in body.as_bytes().chunks(64) {
		pem.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
		pem.push('\n');
	}
	pem.push_str(&format!("-----END {label}-----\n"));
	pem
}

fn decode_pem(pem: &str, label: &str) -> Result<Vec<u8>> {
	let begin = format!("-----BEGIN {label}-----");
	let end = format!("-----END {label}-----");
	let start = pem
		.find(&begin)
		.ok_or_else(|| AimaestroError::Integrity("missing PEM header".into()))?
		+ begin.len();
	let stop = pem
		.find(&end)
		.ok_or_else(|| AimaestroError::Integrity("missing PEM footer".into()))?;
	let body: String = pem[start..stop].chars().filter(|c| !c.is_whitespace()).collect();
	base64::engine::general_purpose::STANDARD
		.decode(body)
		.map_err(|e| AimaestroError::Integrity(format!("invalid PEM base64: {e}")))
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
	use std::os::unix::fs::PermissionsExt;
	let perms = std::fs::Permissions::from_mode(mode);
	tokio::fs::set_permissions(path, perms).await?;
	Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sign_and_verify_round_trip() {
		let kp = KeyPair::generate();
		let msg = b"a random 1 KiB payload".repeat(32);
		let sig = kp.sign(&msg);
		assert!(verify(&kp.public_bytes(), &msg, &sig.to_bytes()).unwrap());
	}

	#[test]
	fn verify_rejects_tampered_message() {
		let kp = KeyPair::generate();
		let sig = kp.sign(b"hello");
		assert!(!verify(&kp.public_bytes(), b"goodbye", &sig.to_bytes()).unwrap());
	}

	#[test]
	fn pem_round_trip_preserves_fingerprint() {
		let kp = KeyPair::generate();
		let fp = kp.fingerprint();
		let restored = KeyPair::from_private_pem(&kp.private_pem()).unwrap();
		assert_eq!(restored.fingerprint(), fp);
		assert_eq!(restored.public_bytes(), kp.public_bytes());
	}

	#[tokio::test]
	async fn write_and_read_from_dir_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let kp = KeyPair::generate();
		kp.write_to_dir(dir.path()).await.unwrap();

		let restored = KeyPair::read_from_dir(dir.path()).await.unwrap().unwrap();
		assert_eq!(restored.fingerprint(), kp.fingerprint());

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let meta = std::fs::metadata(dir.path().join("keys/private.pem")).unwrap();
			assert_eq!(meta.permissions().mode() & 0o777, 0o600);
			let meta = std::fs::metadata(dir.path().join("keys/public.pem")).unwrap();
			assert_eq!(meta.permissions().mode() & 0o777, 0o644);
		}
	}

	#[tokio::test]
	async fn read_from_dir_missing_keys_returns_none() {
		let dir = tempfile::tempdir().unwrap();
		assert!(KeyPair::read_from_dir(dir.path()).await.unwrap().is_none());
	}
}
