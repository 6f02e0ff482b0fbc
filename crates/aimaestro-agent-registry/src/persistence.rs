//! Atomic, lock-guarded persistence for `agents/registry.json`.

use std::path::{Path, PathBuf};

use aimaestro_primitives::Result;

use crate::types::RegistryFile;

/// Owns the on-disk path for `registry.json` and performs lock-guarded,
/// write-then-rename updates so readers never observe a half-written file.
pub struct RegistryFileStore {
	path: PathBuf,
}

impl RegistryFileStore {
	/// Points at `agents_root/registry.json`.
	#[must_use]
	pub fn new(agents_root: &Path) -> Self {
		Self {
			path: agents_root.join("registry.json"),
		}
	}

	/// Reads the current file, treating a missing file as an empty registry.
	pub async fn read(&self) -> Result<RegistryFile> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryFile::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// Writes `file` to disk under an exclusive OS file lock on a sentinel
	/// `.lock` file, then atomically renames the temp file into place.
	pub async fn write(&self, file: &RegistryFile) -> Result<()> {
		let path = self.path.clone();
		let body = serde_json::to_vec_pretty(file)?;

		tokio::task::spawn_blocking(move || -> std::io::Result<()> {
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			let lock_path = path.with_extension("json.lock");
			let lock_file = std::fs::OpenOptions::new().create(true).write(true).truncate(false).open(&lock_path)?;
			let mut lock = fd_lock::RwLock::new(lock_file);
			let _guard = lock.write()?;

			let tmp_path = path.with_extension("json.tmp");
			std::fs::write(&tmp_path, &body)?;
			std::fs::rename(&tmp_path, &path)?;
			Ok(())
		})
		.await
		.expect("write_registry_file blocking task panicked")?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn missing_file_reads_as_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = RegistryFileStore::new(dir.path());
		assert!(store.read().await.unwrap().agents.is_empty());
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = RegistryFileStore::new(dir.path());
		let file = RegistryFile { agents: Vec::new() };
		store.write(&file).await.unwrap();
		assert!(store.read().await.unwrap().agents.is_empty());
	}
}
