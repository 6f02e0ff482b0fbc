//! Atomic, lock-guarded persistence for `hosts.json`.

use std::path::{Path, PathBuf};

use aimaestro_primitives::Result;

use crate::types::HostsFile;

/// Owns the on-disk path for `hosts.json` and performs lock-guarded,
/// write-then-rename updates so readers never observe a half-written file.
pub struct HostsFileStore {
	path: PathBuf,
}

impl HostsFileStore {
	/// Points at `data_root/hosts.json`.
	#[must_use]
	pub fn new(data_root: &Path) -> Self {
		Self {
			path: data_root.join("hosts.json"),
		}
	}

	/// Reads the current file, treating a missing file as an empty registry.
	pub async fn read(&self) -> Result<HostsFile> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostsFile::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// Writes `file` to disk, taking an exclusive OS file lock on a sentinel
	/// `.lock` file for the duration of the write so concurrent daemon
	/// processes on the same machine (not just tasks within one process)
	/// serialize their writes, then atomically renames the temp file into
	/// place.
	pub async fn write(&self, file: &HostsFile) -> Result<()> {
		let path = self.path.clone();
		let body = serde_json::to_vec_pretty(file)?;

		tokio::task::spawn_blocking(move || -> std::io::Result<()> {
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			let lock_path = path.with_extension("json.lock");
			let lock_file = std::fs::OpenOptions::new()
				.create(true)
				.write(true)
				.truncate(false)
				.open(&lock_path)?;
			let mut lock = fd_lock::RwLock::new(lock_file);
			let _guard = lock.write()?;

			let tmp_path = path.with_extension("json.tmp");
			std::fs::write(&tmp_path, &body)?;
			std::fs::rename(&tmp_path, &path)?;
			Ok(())
		})
		.await
		.expect("write_hosts_file blocking task panicked")?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Host;

	#[tokio::test]
	async fn missing_file_reads_as_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = HostsFileStore::new(dir.path());
		let file = store.read().await.unwrap();
		assert!(file.hosts.is_empty());
		assert!(file.organization.is_none());
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = HostsFileStore::new(dir.path());

		let mut file = HostsFile::default();
		file.hosts.push(Host {
			id: aimaestro_primitives::HostId("forge".into()),
			name: "forge".into(),
			url: "http://10.0.0.5:7777".into(),
			aliases: Default::default(),
			enabled: true,
			description: String::new(),
			kind: crate::types::HostType::SelfHost,
			synced_at: None,
			sync_source: None,
		});

		store.write(&file).await.unwrap();
		let reread = store.read().await.unwrap();
		assert_eq!(reread.hosts.len(), 1);
		assert_eq!(reread.hosts[0].id.0, "forge");
	}
}
