//! API Key Store: `amp-api-keys.json`, hashed bearer tokens gating the
//! transport adapter.
//!
//! Structurally the same cache/write-lock/atomic-write shape as
//! `aimaestro-host-registry`'s `HostRegistry`, scaled down to one flat file
//! with no self-identity bootstrapping step.

use std::path::{Path, PathBuf};

use aimaestro_primitives::{now_ms, AimaestroError, Result, TimestampMs};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

const GRACE_PERIOD_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
	pub jti: String,
	pub label: String,
	/// `"sha256:" + hex(sha256(plaintext))`; the plaintext itself is never
	/// persisted.
	pub hash: String,
	pub env: String,
	pub kind: String,
	pub created_at: TimestampMs,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub revoked_at: Option<TimestampMs>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub grace_expires_at: Option<TimestampMs>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_used_at: Option<TimestampMs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ApiKeysFile {
	#[serde(default)]
	keys: Vec<ApiKey>,
}

fn hash_token(plaintext: &str) -> String {
	format!("sha256:{:x}", Sha256::digest(plaintext.as_bytes()))
}

fn random_hex_64() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	hex::encode(bytes)
}

pub struct ApiKeyStore {
	path: PathBuf,
	cache: RwLock<Vec<ApiKey>>,
	write_lock: Mutex<()>,
}

impl ApiKeyStore {
	/// Opens (or initializes) `data_root/amp-api-keys.json`.
	pub async fn open(data_root: &Path) -> Result<Self> {
		let path = data_root.join("amp-api-keys.json");
		let file = match tokio::fs::read(&path).await {
			Ok(bytes) => serde_json::from_slice(&bytes)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => ApiKeysFile::default(),
			Err(e) => return Err(e.into()),
		};
		Ok(Self { path, cache: RwLock::new(file.keys), write_lock: Mutex::new(()) })
	}

	async fn persist(&self, keys: Vec<ApiKey>) -> Result<()> {
		let body = serde_json::to_vec_pretty(&ApiKeysFile { keys: keys.clone() })?;
		let path = self.path.clone();
		tokio::task::spawn_blocking(move || -> Result<()> {
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			let tmp = path.with_extension("json.tmp");
			std::fs::write(&tmp, &body)?;
			std::fs::rename(&tmp, &path)?;
			set_owner_only_permissions(&path);
			Ok(())
		})
		.await
		.map_err(|e| AimaestroError::Io(std::io::Error::other(e)))??;
		*self.cache.write().await = keys;
		Ok(())
	}

	/// Generates a fresh bearer token, formatted `amp_{env}_{kind}_{hex}`,
	/// and persists only its hash. Returns the plaintext once; callers must
	/// surface it to the operator immediately, since it cannot be recovered.
	pub async fn issue(&self, label: &str, env: &str, kind: &str) -> Result<(String, ApiKey)> {
		let _guard = self.write_lock.lock().await;
		let secret = random_hex_64();
		let plaintext = format!("amp_{env}_{kind}_{secret}");
		let key = ApiKey {
			jti: uuid::Uuid::new_v4().to_string(),
			label: label.to_string(),
			hash: hash_token(&plaintext),
			env: env.to_string(),
			kind: kind.to_string(),
			created_at: now_ms(),
			revoked_at: None,
			grace_expires_at: None,
			last_used_at: None,
		};
		let mut keys = self.cache.read().await.clone();
		keys.push(key.clone());
		self.persist(keys).await?;
		Ok((plaintext, key))
	}

	/// Looks up `bearer` by hash. Rejects revoked keys once their grace
	/// period has elapsed; a revoked key still inside its grace window
	/// verifies successfully so in-flight clients have time to pick up a
	/// rotated replacement.
	pub async fn verify(&self, bearer: &str) -> Option<ApiKey> {
		let hash = hash_token(bearer);
		let keys = self.cache.read().await;
		let key = keys.iter().find(|k| k.hash == hash)?;
		if let Some(revoked_at) = key.revoked_at {
			let grace_until = key.grace_expires_at.unwrap_or(revoked_at);
			if now_ms() > grace_until {
				return None;
			}
		}
		Some(key.clone())
	}

	/// Marks `jti`'s key as used just now. Best-effort bookkeeping: call
	/// sites that can't afford the write-lock wait may skip this.
	pub async fn record_use(&self, jti: &str) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut keys = self.cache.read().await.clone();
		let Some(key) = keys.iter_mut().find(|k| k.jti == jti) else {
			return Ok(());
		};
		key.last_used_at = Some(now_ms());
		self.persist(keys).await
	}

	/// Issues a replacement key and starts a 24h grace period on `jti`'s
	/// current key so callers already holding it keep working until they
	/// pick up the new one.
	pub async fn rotate(&self, jti: &str, label: &str, env: &str, kind: &str) -> Result<(String, ApiKey)> {
		let _guard = self.write_lock.lock().await;
		let mut keys = self.cache.read().await.clone();
		let Some(old) = keys.iter_mut().find(|k| k.jti == jti) else {
			return Err(AimaestroError::not_found(format!("api key {jti} not found")));
		};
		let now = now_ms();
		old.revoked_at = Some(now);
		old.grace_expires_at = Some(now + GRACE_PERIOD_MS);

		let secret = random_hex_64();
		let plaintext = format!("amp_{env}_{kind}_{secret}");
		let fresh = ApiKey {
			jti: uuid::Uuid::new_v4().to_string(),
			label: label.to_string(),
			hash: hash_token(&plaintext),
			env: env.to_string(),
			kind: kind.to_string(),
			created_at: now,
			revoked_at: None,
			grace_expires_at: None,
			last_used_at: None,
		};
		keys.push(fresh.clone());
		self.persist(keys).await?;
		Ok((plaintext, fresh))
	}
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) {
	use std::os::unix::fs::PermissionsExt;
	if let Ok(metadata) = std::fs::metadata(path) {
		let mut perms = metadata.permissions();
		perms.set_mode(0o600);
		let _ = std::fs::set_permissions(path, perms);
	}
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn issued_key_verifies_and_hash_never_stored_plaintext() {
		let dir = tempfile::tempdir().unwrap();
		let store = ApiKeyStore::open(dir.path()).await.unwrap();
		let (plaintext, key) = store.issue("ci", "live", "bot").await.unwrap();

		assert!(plaintext.starts_with("amp_live_bot_"));
		assert!(!key.hash.contains(&plaintext));

		let verified = store.verify(&plaintext).await.unwrap();
		assert_eq!(verified.jti, key.jti);
		assert!(store.verify("amp_live_bot_wrong").await.is_none());
	}

	#[tokio::test]
	async fn rotated_key_keeps_old_valid_through_grace_then_new_works() {
		let dir = tempfile::tempdir().unwrap();
		let store = ApiKeyStore::open(dir.path()).await.unwrap();
		let (old_plaintext, old_key) = store.issue("ci", "live", "bot").await.unwrap();

		let (new_plaintext, _new_key) = store.rotate(&old_key.jti, "ci", "live", "bot").await.unwrap();

		assert!(store.verify(&old_plaintext).await.is_some());
		assert!(store.verify(&new_plaintext).await.is_some());
	}

	#[tokio::test]
	async fn store_reopens_and_reads_previously_persisted_keys() {
		let dir = tempfile::tempdir().unwrap();
		let store = ApiKeyStore::open(dir.path()).await.unwrap();
		let (plaintext, _) = store.issue("ci", "live", "bot").await.unwrap();
		drop(store);

		let reopened = ApiKeyStore::open(dir.path()).await.unwrap();
		assert!(reopened.verify(&plaintext).await.is_some());
	}
}
