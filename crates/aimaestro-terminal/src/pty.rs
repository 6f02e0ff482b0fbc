//! Spawns and owns one multiplexer session's PTY.
//!
//! The multiplexer itself (tmux) is run as the PTY's child process so its
//! own attach/detach and pane model do the heavy lifting; this crate only
//! owns the byte stream in and out of that process.

use std::io::{Read, Write};

use portable_pty::{CommandBuilder, MasterPty, NativePtySystem, PtySize, PtySystem};
use tokio::sync::mpsc;

use crate::TerminalError;

/// A chunk of PTY output, handed to the session task over a bounded(1)
/// channel. The bound is what realizes "pause the PTY": the reader thread's
/// `blocking_send` does not return until the session task has drained the
/// previous chunk, so the OS-level read loop cannot race ahead of a slow
/// fan-out. `portable_pty::MasterPty` exposes no native pause/resume call;
/// this channel bound is the idiomatic substitute.
pub type PtyOutput = mpsc::Receiver<Vec<u8>>;

pub struct PtyProcess {
	master: Box<dyn MasterPty + Send>,
	writer: Box<dyn Write + Send>,
	child: Box<dyn portable_pty::Child + Send>,
}

impl PtyProcess {
	/// Spawns `tmux new-session -A -s <session_name>` (attach-to-or-create)
	/// inside a freshly allocated PTY, sized 80x24 per the attach protocol.
	/// Returns the process handle plus a receiver that yields output chunks
	/// as they arrive.
	pub fn spawn_tmux(session_name: &str, working_directory: &std::path::Path) -> Result<(Self, PtyOutput), TerminalError> {
		let pty_system = NativePtySystem::default();
		let pair = pty_system
			.openpty(PtySize {
				rows: 24,
				cols: 80,
				pixel_width: 0,
				pixel_height: 0,
			})
			.map_err(|e| TerminalError::Pty(e.to_string()))?;

		let mut cmd = CommandBuilder::new("tmux");
		cmd.args(["new-session", "-A", "-s", session_name, "-x", "80", "-y", "24"]);
		cmd.cwd(working_directory);

		let child = pair.slave.spawn_command(cmd).map_err(|e| TerminalError::Spawn(e.to_string()))?;
		drop(pair.slave);

		let mut reader = pair.master.try_clone_reader().map_err(|e| TerminalError::Pty(e.to_string()))?;
		let writer = pair.master.take_writer().map_err(|e| TerminalError::Pty(e.to_string()))?;

		let (tx, rx) = mpsc::channel(1);
		std::thread::spawn(move || {
			let mut buf = [0u8; 4096];
			loop {
				match reader.read(&mut buf) {
					Ok(0) => break,
					Ok(n) => {
						if tx.blocking_send(buf[..n].to_vec()).is_err() {
							break;
						}
					}
					Err(_) => break,
				}
			}
		});

		Ok((
			Self {
				master: pair.master,
				writer,
				child,
			},
			rx,
		))
	}

	pub fn write_input(&mut self, bytes: &[u8]) -> Result<(), TerminalError> {
		self.writer.write_all(bytes).map_err(TerminalError::Io)
	}

	pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), TerminalError> {
		self.master
			.resize(PtySize {
				rows,
				cols,
				pixel_width: 0,
				pixel_height: 0,
			})
			.map_err(|e| TerminalError::Pty(e.to_string()))
	}

	pub fn is_alive(&mut self) -> bool {
		matches!(self.child.try_wait(), Ok(None))
	}

	pub fn kill(&mut self) {
		let _ = self.child.kill();
	}
}

/// Queries whether `tmux` currently lists a session named `session_name`.
pub async fn has_live_session(session_name: &str) -> bool {
	live_session_names().await.iter().any(|s| s == session_name)
}

/// All session names `tmux` currently reports. An empty vec (rather than an
/// error) if the tmux server isn't running at all; that just means no
/// sessions are live.
pub async fn live_session_names() -> Vec<String> {
	let output = tokio::process::Command::new("tmux").args(["list-sessions", "-F", "#S"]).output().await;
	match output {
		Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).lines().map(str::to_string).collect(),
		_ => Vec::new(),
	}
}

/// The multiplexer's reported current working directory for the active
/// pane of `session_name`, used for working-directory reconciliation.
pub async fn current_pane_path(session_name: &str) -> Option<std::path::PathBuf> {
	let output = tokio::process::Command::new("tmux")
		.args(["display-message", "-p", "-t", session_name, "#{pane_current_path}"])
		.output()
		.await
		.ok()?;
	if !output.status.success() {
		return None;
	}
	let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
	if path.is_empty() {
		None
	} else {
		Some(std::path::PathBuf::from(path))
	}
}

/// Best-effort force kill of a named multiplexer session, used as the final
/// step of hibernate if the graceful sequence didn't end the session.
pub async fn kill_session(session_name: &str) {
	let _ = tokio::process::Command::new("tmux").args(["kill-session", "-t", session_name]).output().await;
}
