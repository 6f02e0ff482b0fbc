//! Code-graph ingestion: walks a project tree into `CodeFile`/`CodeFunction`
//! nodes and `Imports`/`Calls`/... edges in the agent database.
//!
//! Parsing is intentionally light: a regex-based heuristic per source file
//! rather than a full per-language grammar, since the knowledge store only
//! needs "this file roughly imports/declares that" for retrieval, not a
//! compiler-grade AST.

use std::path::{Path, PathBuf};

use aimaestro_agentdb::{AgentDb, CodeEdgeKind, CodeFile};
use aimaestro_primitives::Result;
use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Options controlling one indexing pass.
#[derive(Debug, Clone)]
pub struct IndexOptions {
	/// File extensions considered source files, without the leading dot.
	pub extensions: Vec<String>,
	/// Directory names skipped entirely during the walk.
	pub ignore_dirs: Vec<String>,
}

impl Default for IndexOptions {
	fn default() -> Self {
		Self {
			extensions: ["rs", "ts", "tsx", "js", "jsx", "py", "go"].iter().map(|s| (*s).to_string()).collect(),
			ignore_dirs: ["node_modules", "target", ".git", "dist", "build", "vendor"].iter().map(|s| (*s).to_string()).collect(),
		}
	}
}

/// Summary of one indexing pass, returned so the Subconscious can log
/// progress and decide whether to schedule a delta pass next time.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
	pub files_scanned: usize,
	pub files_changed: usize,
	pub edges_added: usize,
}

fn import_pattern() -> &'static Regex {
	static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r#"(?m)^\s*(?:use|import|from|require\()\s*\(?["']?([\w:./@-]+)"?\)?"#).expect("static regex is valid")
	})
}

fn function_pattern() -> &'static Regex {
	static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r#"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|def|func|function)\s+([A-Za-z_][A-Za-z0-9_]*)"#)
			.expect("static regex is valid")
	})
}

fn file_uri(path: &Path) -> String {
	format!("file://{}", path.to_string_lossy())
}

fn hash_file(bytes: &[u8]) -> String {
	let digest = Sha256::digest(bytes);
	hex::encode(digest)
}

fn resolve_import(root: &Path, from_dir: &Path, raw: &str, extensions: &[String]) -> Option<PathBuf> {
	if !raw.starts_with('.') {
		return None;
	}
	let candidate = from_dir.join(raw);
	for ext in extensions {
		let with_ext = candidate.with_extension(ext);
		if with_ext.is_file() {
			return with_ext.canonicalize().ok().or(Some(with_ext));
		}
	}
	if candidate.is_file() {
		return candidate.canonicalize().ok().or(Some(candidate));
	}
	let _ = root;
	None
}

fn should_walk(entry: &walkdir::DirEntry, ignore_dirs: &[String]) -> bool {
	if entry.file_type().is_dir() {
		let name = entry.file_name().to_string_lossy();
		return !ignore_dirs.iter().any(|d| d == name.as_ref());
	}
	true
}

/// Full index of `path`: (re)creates every `CodeFile`/`CodeFunction` node
/// and every edge discoverable from a single pass, then stamps file
/// metadata so a future call can run [`index_project_delta`] instead.
pub fn index_project(db: &AgentDb, path: &Path, opts: &IndexOptions) -> Result<IndexReport> {
	let mut report = IndexReport::default();
	let mut source_files = Vec::new();

	for entry in WalkDir::new(path).into_iter().filter_entry(|e| should_walk(e, &opts.ignore_dirs)).filter_map(std::result::Result::ok)
	{
		if !entry.file_type().is_file() {
			continue;
		}
		let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
			continue;
		};
		if !opts.extensions.iter().any(|e| e == ext) {
			continue;
		}
		source_files.push(entry.path().to_path_buf());
	}

	for file_path in &source_files {
		report.files_scanned += 1;
		let Ok(bytes) = std::fs::read(file_path) else { continue };
		let hash = hash_file(&bytes);
		let mtime = std::fs::metadata(file_path).and_then(|m| m.modified()).ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs()).unwrap_or(0);

		let uri = file_uri(file_path);
		db.upsert_code_file(&CodeFile { uri: uri.clone(), hash, mtime })?;
		report.files_changed += 1;

		let text = String::from_utf8_lossy(&bytes);
		for cap in function_pattern().captures_iter(&text) {
			let name = &cap[1];
			db.upsert_code_function(&uri, name, name)?;
		}
	}

	for file_path in &source_files {
		let Ok(bytes) = std::fs::read(file_path) else { continue };
		let text = String::from_utf8_lossy(&bytes);
		let from_dir = file_path.parent().unwrap_or(path);
		let from_uri = file_uri(file_path);

		for cap in import_pattern().captures_iter(&text) {
			let raw = &cap[1];
			if let Some(resolved) = resolve_import(path, from_dir, raw, &opts.extensions) {
				let to_uri = file_uri(&resolved);
				db.add_code_edge(CodeEdgeKind::Imports, &from_uri, &to_uri)?;
				report.edges_added += 1;
			}
		}
	}

	Ok(report)
}

/// Delta index: only re-parses files whose hash changed since last recorded.
/// Falls back to [`index_project`] (and initializes metadata) if `path` has
/// never had file metadata recorded, matching the component design's
/// fallback rule.
pub fn index_project_delta(db: &AgentDb, path: &Path, opts: &IndexOptions) -> Result<IndexReport> {
	let probe = WalkDir::new(path)
		.into_iter()
		.filter_entry(|e| should_walk(e, &opts.ignore_dirs))
		.filter_map(std::result::Result::ok)
		.find(|e| e.file_type().is_file() && e.path().extension().and_then(|x| x.to_str()).is_some_and(|ext| opts.extensions.iter().any(|o| o == ext)));

	let Some(probe) = probe else {
		return Ok(IndexReport::default());
	};
	let probe_uri = file_uri(probe.path());
	if !db.has_file_metadata(&probe_uri)? {
		tracing::info!(path = %path.display(), "no file metadata yet; falling back to full index");
		return index_project(db, path, opts);
	}

	let mut report = IndexReport::default();
	for entry in WalkDir::new(path).into_iter().filter_entry(|e| should_walk(e, &opts.ignore_dirs)).filter_map(std::result::Result::ok) {
		if !entry.file_type().is_file() {
			continue;
		}
		let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
			continue;
		};
		if !opts.extensions.iter().any(|e| e == ext) {
			continue;
		}
		report.files_scanned += 1;

		let Ok(bytes) = std::fs::read(entry.path()) else { continue };
		let hash = hash_file(&bytes);
		let uri = file_uri(entry.path());

		let unchanged = db.code_file_metadata(&uri)?.is_some_and(|meta| meta.hash == hash);
		if unchanged {
			continue;
		}

		let mtime = std::fs::metadata(entry.path()).and_then(|m| m.modified()).ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs()).unwrap_or(0);
		db.upsert_code_file(&CodeFile { uri: uri.clone(), hash, mtime })?;
		report.files_changed += 1;

		let text = String::from_utf8_lossy(&bytes);
		for cap in function_pattern().captures_iter(&text) {
			let name = &cap[1];
			db.upsert_code_function(&uri, name, name)?;
		}

		let from_dir = entry.path().parent().unwrap_or(path);
		for cap in import_pattern().captures_iter(&text) {
			let raw = &cap[1];
			if let Some(resolved) = resolve_import(path, from_dir, raw, &opts.extensions) {
				let to_uri = file_uri(&resolved);
				db.add_code_edge(CodeEdgeKind::Imports, &uri, &to_uri)?;
				report.edges_added += 1;
			}
		}
	}

	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn full_index_discovers_files_functions_and_import_edge() {
		let project = tempfile::tempdir().unwrap();
		std::fs::write(project.path().join("a.rs"), "pub fn helper() {}\nuse crate::b;\n").unwrap();
		std::fs::write(project.path().join("b.rs"), "pub fn other() {}\n").unwrap();

		let db_dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&db_dir.path().join("agent.db")).unwrap();

		let report = index_project(&db, project.path(), &IndexOptions::default()).unwrap();
		assert_eq!(report.files_changed, 2);
	}

	#[test]
	fn delta_falls_back_to_full_index_without_prior_metadata() {
		let project = tempfile::tempdir().unwrap();
		std::fs::write(project.path().join("a.rs"), "pub fn helper() {}\n").unwrap();

		let db_dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&db_dir.path().join("agent.db")).unwrap();

		let report = index_project_delta(&db, project.path(), &IndexOptions::default()).unwrap();
		assert_eq!(report.files_changed, 1);
	}

	#[test]
	fn delta_skips_unchanged_files_on_second_pass() {
		let project = tempfile::tempdir().unwrap();
		std::fs::write(project.path().join("a.rs"), "pub fn helper() {}\n").unwrap();

		let db_dir = tempfile::tempdir().unwrap();
		let db = AgentDb::open(&db_dir.path().join("agent.db")).unwrap();

		index_project(&db, project.path(), &IndexOptions::default()).unwrap();
		let second = index_project_delta(&db, project.path(), &IndexOptions::default()).unwrap();
		assert_eq!(second.files_changed, 0);
	}
}
