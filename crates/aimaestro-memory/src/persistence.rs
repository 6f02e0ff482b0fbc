//! Atomic, lock-guarded persistence for one agent's
//! `consolidation-runs.json`.

use std::path::{Path, PathBuf};

use aimaestro_primitives::Result;

use crate::types::ConsolidationRunsFile;

pub struct ConsolidationRunsFileStore {
	path: PathBuf,
}

impl ConsolidationRunsFileStore {
	#[must_use]
	pub fn new(agent_dir: &Path) -> Self {
		Self {
			path: agent_dir.join("consolidation-runs.json"),
		}
	}

	/// Reads the current file, treating a missing file as no recorded runs.
	pub async fn read(&self) -> Result<ConsolidationRunsFile> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConsolidationRunsFile::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// Writes `file` under an exclusive lock on a sentinel `.lock` file, then
	/// atomically renames the temp file into place.
	pub async fn write(&self, file: &ConsolidationRunsFile) -> Result<()> {
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
		.expect("write_consolidation_runs_file blocking task panicked")?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ConsolidationRun;
	use aimaestro_primitives::AgentId;

	#[tokio::test]
	async fn missing_file_reads_as_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = ConsolidationRunsFileStore::new(dir.path());
		let file = store.read().await.unwrap();
		assert!(file.runs.is_empty());
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = ConsolidationRunsFileStore::new(dir.path());

		let run = ConsolidationRun::start(AgentId::new(), "sess-1".into(), 1, 0);
		let file = ConsolidationRunsFile { runs: vec![run.clone()] };
		store.write(&file).await.unwrap();

		let reread = store.read().await.unwrap();
		assert_eq!(reread.runs.len(), 1);
		assert_eq!(reread.runs[0].session_id, "sess-1");
	}
}
