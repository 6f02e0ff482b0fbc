//! Per-agent directory layout under `<data_root>/agents/<agent-id>/`.

use std::path::{Path, PathBuf};

use aimaestro_primitives::{AgentId, Result};

/// Path helpers for one agent's exclusive directory tree.
#[derive(Debug, Clone)]
pub struct AgentDir {
	root: PathBuf,
}

impl AgentDir {
	#[must_use]
	pub fn new(agents_root: &Path, id: AgentId) -> Self {
		Self {
			root: agents_root.join(id.0.to_string()),
		}
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	#[must_use]
	pub fn identity_json(&self) -> PathBuf {
		self.root.join("identity.json")
	}

	#[must_use]
	pub fn keys_dir(&self) -> PathBuf {
		self.root.join("keys")
	}

	#[must_use]
	pub fn registrations_dir(&self) -> PathBuf {
		self.root.join("registrations")
	}

	#[must_use]
	pub fn database_path(&self) -> PathBuf {
		self.root.join("agent.db")
	}

	#[must_use]
	pub fn skill_settings_json(&self) -> PathBuf {
		self.root.join("skill-settings.json")
	}

	#[must_use]
	pub fn messages_dir(&self, mailbox: &str) -> PathBuf {
		self.root.join("messages").join(mailbox)
	}

	#[must_use]
	pub fn logs_dir(&self) -> PathBuf {
		self.root.join("logs")
	}

	#[must_use]
	pub fn skills_custom_dir(&self) -> PathBuf {
		self.root.join("skills").join("custom")
	}

	#[must_use]
	pub fn hooks_json(&self) -> PathBuf {
		self.root.join("hooks").join("hooks.json")
	}

	/// Creates the fixed subdirectory skeleton for a brand-new agent.
	pub async fn create_skeleton(&self) -> Result<()> {
		tokio::fs::create_dir_all(&self.root).await?;
		tokio::fs::create_dir_all(self.keys_dir()).await?;
		tokio::fs::create_dir_all(self.registrations_dir()).await?;
		for mailbox in ["inbox", "sent", "archived"] {
			tokio::fs::create_dir_all(self.messages_dir(mailbox)).await?;
		}
		tokio::fs::create_dir_all(self.logs_dir()).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn create_skeleton_builds_expected_tree() {
		let dir = tempfile::tempdir().unwrap();
		let id = AgentId::new();
		let agent_dir = AgentDir::new(dir.path(), id);
		agent_dir.create_skeleton().await.unwrap();

		assert!(agent_dir.keys_dir().is_dir());
		assert!(agent_dir.messages_dir("inbox").is_dir());
		assert!(agent_dir.messages_dir("sent").is_dir());
		assert!(agent_dir.messages_dir("archived").is_dir());
	}
}
