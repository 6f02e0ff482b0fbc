//! Instance configuration: `config.json` plus `AIMAESTRO_<FIELD>` environment
//! overrides read once at startup.
//!
//! Mirrors `broker/lib/src/core/mod.rs`'s `BrokerConfig`: every sub-config
//! has a typed `Default`, and the whole tree deserializes straight off disk
//! with `serde`. Environment overrides are applied by [`Config::load`], not
//! by any library crate downstream of this one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aimaestro_indexing::DEFAULT_MAX_CONCURRENT_INDEX;
use aimaestro_memory::{DEFAULT_D_PROMOTE_MS, DEFAULT_N_PROMOTE};
use aimaestro_subconscious::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};

fn default_data_root() -> PathBuf {
	dirs_home().join(".aimaestro")
}

fn dirs_home() -> PathBuf {
	std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfHostConfig {
	/// Overrides hostname-based self-identification, for containers where
	/// the hostname isn't a stable or reachable address.
	pub name: Option<String>,
	pub url: Option<String>,
}

impl Default for SelfHostConfig {
	fn default() -> Self {
		Self { name: None, url: None }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
	/// Peers dialed by an unprompted `sync_with_all_peers` sweep at startup.
	pub seed_peers: Vec<String>,
}

impl Default for MeshConfig {
	fn default() -> Self {
		Self { seed_peers: Vec::new() }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
	pub max_concurrent_index: usize,
	pub batch_size: usize,
	#[serde(with = "duration_secs")]
	pub message_check_interval: Duration,
}

impl Default for IndexingConfig {
	fn default() -> Self {
		Self {
			max_concurrent_index: DEFAULT_MAX_CONCURRENT_INDEX,
			batch_size: DEFAULT_BATCH_SIZE,
			message_check_interval: Duration::from_secs(30),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
	/// A cron-ish schedule string, or `"manual"` to disable the automatic
	/// cadence entirely (the Subconscious still exposes a manual trigger).
	pub schedule: String,
	pub n_promote: u32,
	#[serde(with = "duration_secs")]
	pub d_promote: Duration,
	pub min_confidence: f32,
	pub dedupe_threshold: f32,
}

impl Default for ConsolidationConfig {
	fn default() -> Self {
		Self {
			schedule: "daily".to_string(),
			n_promote: DEFAULT_N_PROMOTE,
			d_promote: Duration::from_millis(DEFAULT_D_PROMOTE_MS as u64),
			min_confidence: 0.5,
			dedupe_threshold: 0.85,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
	pub bind_addr: String,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self { bind_addr: "127.0.0.1:7777".to_string() }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub data_root: PathBuf,
	pub self_host: SelfHostConfig,
	pub mesh: MeshConfig,
	pub indexing: IndexingConfig,
	pub consolidation: ConsolidationConfig,
	pub api: ApiConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_root: default_data_root(),
			self_host: SelfHostConfig::default(),
			mesh: MeshConfig::default(),
			indexing: IndexingConfig::default(),
			consolidation: ConsolidationConfig::default(),
			api: ApiConfig::default(),
		}
	}
}

impl Config {
	/// Reads `<data_root>/config.json` if present, falling back to
	/// `Config::default()` with `data_root` already resolved, then applies
	/// `AIMAESTRO_<FIELD>` overrides on top.
	pub async fn load(data_root: &Path) -> anyhow::Result<Self> {
		let config_path = data_root.join("config.json");
		let mut config = match tokio::fs::read(&config_path).await {
			Ok(bytes) => serde_json::from_slice(&bytes)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self { data_root: data_root.to_path_buf(), ..Self::default() },
			Err(e) => return Err(e.into()),
		};
		config.data_root = data_root.to_path_buf();
		config.apply_env_overrides();
		Ok(config)
	}

	/// Applies any `AIMAESTRO_<FIELD>` environment variables set for fields
	/// operators commonly need to override per deployment, without requiring
	/// a config file edit.
	fn apply_env_overrides(&mut self) {
		if let Ok(v) = std::env::var("AIMAESTRO_SELF_HOST_NAME") {
			self.self_host.name = Some(v);
		}
		if let Ok(v) = std::env::var("AIMAESTRO_SELF_HOST_URL") {
			self.self_host.url = Some(v);
		}
		if let Ok(v) = std::env::var("AIMAESTRO_API_BIND_ADDR") {
			self.api.bind_addr = v;
		}
		if let Ok(v) = std::env::var("AIMAESTRO_MAX_CONCURRENT_INDEX") {
			if let Ok(parsed) = v.parse() {
				self.indexing.max_concurrent_index = parsed;
			}
		}
		if let Ok(v) = std::env::var("AIMAESTRO_CONSOLIDATION_SCHEDULE") {
			self.consolidation.schedule = v;
		}
	}
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_secs(u64::deserialize(d)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn load_missing_config_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = Config::load(dir.path()).await.unwrap();
		assert_eq!(config.indexing.max_concurrent_index, DEFAULT_MAX_CONCURRENT_INDEX);
		assert_eq!(config.consolidation.n_promote, DEFAULT_N_PROMOTE);
	}

	#[tokio::test]
	async fn load_reads_config_json_and_keeps_resolved_data_root() {
		let dir = tempfile::tempdir().unwrap();
		let body = serde_json::json!({ "consolidation": { "schedule": "manual", "n_promote": 9 } });
		tokio::fs::write(dir.path().join("config.json"), serde_json::to_vec(&body).unwrap()).await.unwrap();

		let config = Config::load(dir.path()).await.unwrap();
		assert_eq!(config.consolidation.schedule, "manual");
		assert_eq!(config.consolidation.n_promote, 9);
		assert_eq!(config.data_root, dir.path());
	}
}
