//! Portable agent archive: export to ZIP, import from ZIP.
//!
//! The archive layout mirrors the agent's own directory tree so import is
//! mostly "extract, then move the relevant subtrees into a fresh agent
//! directory" rather than a bespoke format.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use aimaestro_identity::KeyPair;
use aimaestro_primitives::{now_ms, AgentId, AimaestroError, ConflictKind, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::git::{clone_repo, CloneStatus, RepoEntry};
use crate::registry::AgentRegistry;
use crate::types::Agent;

/// Manifest versions this build knows how to import. Bumped whenever the
/// archive layout changes in a way older imports can't handle.
const KNOWN_MANIFEST_VERSIONS: &[u32] = &[1];
const CURRENT_MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
	version: u32,
	contents: Vec<String>,
	#[serde(default)]
	repos: Vec<RepoEntry>,
}

/// Exports `agent` (whose directory tree already lives under `registry`) to
/// a ZIP file at `out_path`.
pub async fn export_agent(registry: &AgentRegistry, agent: &Agent, repos: Vec<RepoEntry>, out_path: &Path) -> Result<()> {
	let dir = registry.agent_dir(agent.id);
	let root = dir.root().to_path_buf();
	let agent_json = serde_json::to_vec_pretty(agent)?;
	let out_path = out_path.to_path_buf();

	let mut contents = vec!["registry.json".to_string(), "agent.db".to_string(), "messages".to_string(), "keys".to_string()];
	if dir.registrations_dir().is_dir() {
		contents.push("registrations".to_string());
	}
	if dir.skills_custom_dir().is_dir() {
		contents.push("skills".to_string());
	}
	if dir.hooks_json().parent().is_some_and(Path::is_dir) {
		contents.push("hooks".to_string());
	}

	let manifest = Manifest {
		version: CURRENT_MANIFEST_VERSION,
		contents,
		repos,
	};
	let manifest_json = serde_json::to_vec_pretty(&manifest)?;

	tokio::task::spawn_blocking(move || -> std::io::Result<()> {
		let file = std::fs::File::create(&out_path)?;
		let mut zip = zip::ZipWriter::new(file);
		let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

		zip.start_file("manifest.json", options)?;
		zip.write_all(&manifest_json)?;

		zip.start_file("registry.json", options)?;
		zip.write_all(&agent_json)?;

		for subtree in ["agent.db", "messages", "keys", "registrations", "skills", "hooks"] {
			let src = root.join(subtree);
			if src.exists() {
				add_tree_to_zip(&mut zip, &src, subtree, options)?;
			}
		}

		zip.finish()?;
		Ok(())
	})
	.await
	.expect("export_agent blocking task panicked")?;

	Ok(())
}

fn add_tree_to_zip<W: Write + std::io::Seek>(
	zip: &mut zip::ZipWriter<W>,
	src_root: &Path,
	archive_prefix: &str,
	options: zip::write::SimpleFileOptions,
) -> std::io::Result<()> {
	for entry in WalkDir::new(src_root).into_iter().filter_map(std::result::Result::ok) {
		let relative = entry.path().strip_prefix(src_root).expect("walkdir yields children of src_root");
		let archive_name = if relative.as_os_str().is_empty() {
			archive_prefix.to_string()
		} else {
			format!("{archive_prefix}/{}", relative.to_string_lossy())
		};

		if entry.file_type().is_dir() {
			zip.add_directory(format!("{archive_name}/"), options)?;
		} else if entry.file_type().is_file() {
			zip.start_file(&archive_name, options)?;
			let bytes = std::fs::read(entry.path())?;
			zip.write_all(&bytes)?;
		}
	}
	Ok(())
}

/// Status of one imported agent: the final record plus per-repo clone
/// outcomes and whether identity had to be regenerated.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
	pub agent: Agent,
	pub keys_generated: bool,
	pub repo_statuses: Vec<(RepoEntry, CloneStatus)>,
}

/// Imports the archive at `archive_path`. If an agent named the same as the
/// archive's already exists and `overwrite` is false, fails with
/// [`ConflictKind::AgentNameTaken`]. An id collision (distinct from a name
/// collision) is resolved by minting a fresh id for the imported agent.
pub async fn import_agent(registry: &AgentRegistry, archive_path: &Path, overwrite: bool) -> Result<ImportOutcome> {
	let extract_dir = tempfile::tempdir()?;
	let extract_root = extract_dir.path().to_path_buf();
	let archive_path = archive_path.to_path_buf();
	let extract_target = extract_root.clone();

	tokio::task::spawn_blocking(move || -> std::io::Result<()> {
		let file = std::fs::File::open(&archive_path)?;
		let mut archive = zip::ZipArchive::new(file)?;
		for i in 0..archive.len() {
			let mut entry = archive.by_index(i)?;
			let Some(rel) = entry.enclosed_name() else { continue };
			let dest = extract_target.join(rel);
			if entry.is_dir() {
				std::fs::create_dir_all(&dest)?;
				continue;
			}
			if let Some(parent) = dest.parent() {
				std::fs::create_dir_all(parent)?;
			}
			let mut buf = Vec::new();
			entry.read_to_end(&mut buf)?;
			std::fs::write(&dest, buf)?;
		}
		Ok(())
	})
	.await
	.expect("import_agent extraction task panicked")?;

	let manifest: Manifest = read_json(&extract_root.join("manifest.json")).await?;
	if !KNOWN_MANIFEST_VERSIONS.contains(&manifest.version) {
		return Err(AimaestroError::validation(format!("unknown manifest version: {}", manifest.version)));
	}

	let mut agent: Agent = read_json(&extract_root.join("registry.json")).await?;

	if let Some(existing) = registry.find_by_name(&agent.name).await {
		if !overwrite {
			return Err(AimaestroError::Conflict(ConflictKind::AgentNameTaken));
		}
		registry.delete_agent(existing.id).await?;
	}

	if registry.find_by_id(agent.id).await.is_some() {
		agent.id = AgentId::new();
	}

	let dir = registry.agent_dir(agent.id);
	dir.create_skeleton().await?;

	for subtree in ["agent.db", "messages", "keys", "registrations", "skills", "hooks"] {
		let src = extract_root.join(subtree);
		if !src.exists() {
			continue;
		}
		let dest = dir.root().join(subtree);
		if dest.exists() {
			tokio::fs::remove_dir_all(&dest).await?;
		}
		move_tree(&src, &dest).await?;
	}

	let keys_generated = match KeyPair::read_from_dir(dir.root()).await? {
		Some(keypair) => {
			agent.amp_identity.fingerprint = keypair.fingerprint();
			false
		}
		None => {
			let keypair = KeyPair::generate();
			keypair.write_to_dir(dir.root()).await?;
			tracing::warn!(agent = %agent.name, "import declared no keys; generated a new identity");
			agent.amp_identity.fingerprint = keypair.fingerprint();
			true
		}
	};

	agent.last_active = now_ms();
	tokio::fs::write(dir.identity_json(), serde_json::to_vec_pretty(&agent)?).await?;
	registry.insert_agent(agent.clone()).await?;

	let mut repo_statuses = Vec::with_capacity(manifest.repos.len());
	for repo in manifest.repos {
		let status = clone_repo(&repo, Path::new(&agent.working_directory)).await;
		repo_statuses.push((repo, status));
	}

	Ok(ImportOutcome {
		agent,
		keys_generated,
		repo_statuses,
	})
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
	let bytes = tokio::fs::read(path).await.map_err(|e| {
		if e.kind() == std::io::ErrorKind::NotFound {
			AimaestroError::validation(format!("archive is missing {}", path.display()))
		} else {
			AimaestroError::Io(e)
		}
	})?;
	Ok(serde_json::from_slice(&bytes)?)
}

async fn move_tree(src: &Path, dest: &Path) -> Result<()> {
	if let Some(parent) = dest.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	match tokio::fs::rename(src, dest).await {
		Ok(()) => Ok(()),
		Err(_) => copy_tree_recursive(src, dest).await,
	}
}

fn copy_tree_recursive<'a>(src: &'a Path, dest: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
	Box::pin(async move {
		if src.is_dir() {
			tokio::fs::create_dir_all(dest).await?;
			let mut entries = tokio::fs::read_dir(src).await?;
			while let Some(entry) = entries.next_entry().await? {
				copy_tree_recursive(&entry.path(), &dest.join(entry.file_name())).await?;
			}
		} else {
			tokio::fs::copy(src, dest).await?;
		}
		Ok(())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use aimaestro_primitives::HostId;

	#[tokio::test]
	async fn export_then_import_preserves_fingerprint_and_name() {
		let host_dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(host_dir.path()).await.unwrap();
		let agent = registry.create_agent("lola", "Lola", "/tmp/lola", HostId("forge".into())).await.unwrap();

		let archive_dir = tempfile::tempdir().unwrap();
		let archive_path = archive_dir.path().join("lola.zip");
		export_agent(&registry, &agent, Vec::new(), &archive_path).await.unwrap();

		let other_host_dir = tempfile::tempdir().unwrap();
		let other_registry = AgentRegistry::open(other_host_dir.path()).await.unwrap();
		let outcome = import_agent(&other_registry, &archive_path, false).await.unwrap();

		assert_eq!(outcome.agent.name, "lola");
		assert_eq!(outcome.agent.amp_identity.fingerprint, agent.amp_identity.fingerprint);
		assert!(!outcome.keys_generated);
	}

	#[tokio::test]
	async fn import_without_overwrite_rejects_name_collision() {
		let host_dir = tempfile::tempdir().unwrap();
		let registry = AgentRegistry::open(host_dir.path()).await.unwrap();
		let agent = registry.create_agent("lola", "Lola", "/tmp/lola", HostId("forge".into())).await.unwrap();

		let archive_dir = tempfile::tempdir().unwrap();
		let archive_path = archive_dir.path().join("lola.zip");
		export_agent(&registry, &agent, Vec::new(), &archive_path).await.unwrap();

		let err = import_agent(&registry, &archive_path, false).await.unwrap_err();
		assert!(matches!(err, AimaestroError::Conflict(ConflictKind::AgentNameTaken)));
	}
}
