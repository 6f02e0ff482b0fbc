//! External AMP provider registrations for one agent.
//!
//! Each registration lives at `registrations/<provider>.json` (mode 0600)
//! inside the agent's directory and records whatever credential the
//! corresponding external provider issued for this agent's address.

use std::path::Path;

use aimaestro_primitives::Result;
use serde::{Deserialize, Serialize};

/// One external messaging provider registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
	/// Provider domain, e.g. `"ws.crabmail.ai"`.
	pub provider: String,
	/// Tenant label the agent registered under with that provider.
	pub tenant: String,
	/// Provider-issued credential (API key, token, etc).
	pub credential: String,
	/// When this registration was created, in milliseconds since epoch.
	pub registered_at: aimaestro_primitives::TimestampMs,
}

/// Writes a registration to `dir/registrations/<provider>.json` with 0600.
pub async fn write(dir: &Path, reg: &Registration) -> Result<()> {
	let regs_dir = dir.join("registrations");
	tokio::fs::create_dir_all(&regs_dir).await?;
	let path = regs_dir.join(format!("{}.json", sanitize(&reg.provider)));
	let body = serde_json::to_vec_pretty(reg)?;
	tokio::fs::write(&path, body).await?;
	set_mode(&path).await?;
	Ok(())
}

/// Reads all registrations in `dir/registrations/`.
pub async fn read_all(dir: &Path) -> Result<Vec<Registration>> {
	let regs_dir = dir.join("registrations");
	let mut out = Vec::new();
	let mut entries = match tokio::fs::read_dir(&regs_dir).await {
		Ok(e) => e,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
		Err(e) => return Err(e.into()),
	};
	while let Some(entry) = entries.next_entry().await? {
		if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
			continue;
		}
		let body = tokio::fs::read(entry.path()).await?;
		match serde_json::from_slice::<Registration>(&body) {
			Ok(reg) => out.push(reg),
			Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "skipping malformed registration"),
		}
	}
	Ok(out)
}

fn sanitize(provider: &str) -> String {
	provider
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
		.collect()
}

#[cfg(unix)]
async fn set_mode(path: &Path) -> Result<()> {
	use std::os::unix::fs::PermissionsExt;
	tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
	Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path) -> Result<()> {
	Ok(())
}
