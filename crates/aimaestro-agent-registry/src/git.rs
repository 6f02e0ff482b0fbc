//! Optional `git clone` of an agent's portable repository entries on import.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One repository an exported agent carried a working copy of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
	pub origin: String,
	/// Path relative to the agent's working directory the repo should land
	/// at on import.
	pub path: String,
}

/// Outcome of attempting to materialize one [`RepoEntry`] on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneStatus {
	Cloned,
	/// A repo already exists at the target path with a matching origin.
	Exists,
	Skipped,
	Failed,
}

/// Clones `entry` into `target_root/entry.path` unless something is already
/// there. Never overwrites an existing, non-matching directory: that case is
/// reported as `Failed` rather than destroying whatever the caller had.
pub async fn clone_repo(entry: &RepoEntry, target_root: &Path) -> CloneStatus {
	let dest = target_root.join(&entry.path);

	if dest.join(".git").is_dir() {
		return match current_origin(&dest).await {
			Some(origin) if origin == entry.origin => CloneStatus::Exists,
			_ => CloneStatus::Failed,
		};
	}
	if dest.exists() {
		return CloneStatus::Failed;
	}

	let Some(parent) = dest.parent() else {
		return CloneStatus::Failed;
	};
	if tokio::fs::create_dir_all(parent).await.is_err() {
		return CloneStatus::Failed;
	}

	let status = tokio::process::Command::new("git").args(["clone", &entry.origin, &dest.to_string_lossy()]).status().await;

	match status {
		Ok(s) if s.success() => CloneStatus::Cloned,
		Ok(_) => CloneStatus::Failed,
		Err(_) => CloneStatus::Skipped,
	}
}

async fn current_origin(repo_dir: &Path) -> Option<String> {
	let output = tokio::process::Command::new("git")
		.args(["-C", &repo_dir.to_string_lossy(), "remote", "get-url", "origin"])
		.output()
		.await
		.ok()?;
	if !output.status.success() {
		return None;
	}
	Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn clone_reports_failed_on_non_matching_existing_directory() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::create_dir_all(dir.path().join("repo")).await.unwrap();
		tokio::fs::write(dir.path().join("repo/marker"), b"x").await.unwrap();

		let entry = RepoEntry {
			origin: "https://example.invalid/repo.git".into(),
			path: "repo".into(),
		};
		let status = clone_repo(&entry, dir.path()).await;
		assert_eq!(status, CloneStatus::Failed);
	}
}
