//! Terminal Broker error type.

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
	#[error("pty error: {0}")]
	Pty(String),
	#[error("spawn error: {0}")]
	Spawn(String),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("relay error: {0}")]
	Relay(String),
	#[error("session not found: {0}")]
	SessionNotFound(String),
	#[error("broker shut down")]
	Gone,
}
