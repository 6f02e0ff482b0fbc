//! Atomic, lock-guarded persistence for one agent's `sessions.json`.

use std::path::{Path, PathBuf};

use aimaestro_primitives::Result;

use crate::types::SessionsFile;

/// Owns the on-disk path for `sessions.json` and performs lock-guarded,
/// write-then-rename updates so readers never observe a half-written file.
pub struct SessionsFileStore {
	path: PathBuf,
}

impl SessionsFileStore {
	/// Points at `agent_dir/sessions.json`.
	#[must_use]
	pub fn new(agent_dir: &Path) -> Self {
		Self {
			path: agent_dir.join("sessions.json"),
		}
	}

	/// Reads the current file, treating a missing file as an empty set of
	/// recorded sessions.
	pub async fn read(&self) -> Result<SessionsFile> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionsFile::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// Writes `file` to disk under an exclusive lock on a sentinel `.lock`
	/// file, then atomically renames the temp file into place.
	pub async fn write(&self, file: &SessionsFile) -> Result<()> {
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
		.expect("write_sessions_file blocking task panicked")?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::SessionRecord;

	#[tokio::test]
	async fn missing_file_reads_as_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionsFileStore::new(dir.path());
		let file = store.read().await.unwrap();
		assert!(file.sessions.is_empty());
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = SessionsFileStore::new(dir.path());

		let file = SessionsFile {
			sessions: vec![SessionRecord {
				id: "lola".into(),
				working_directory: "/home/lola".into(),
				created_at: 1,
			}],
		};
		store.write(&file).await.unwrap();

		let reread = store.read().await.unwrap();
		assert_eq!(reread.sessions.len(), 1);
		assert_eq!(reread.sessions[0].id, "lola");
	}
}
