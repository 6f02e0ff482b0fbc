//! `TerminalHandle`: the public entry point every caller (the daemon's API
//! layer, the Subconscious's wake-up tick) uses to talk to the broker.

use std::path::PathBuf;
use std::sync::Arc;

use aimaestro_session::{ReconciledSession, SessionStore};
use tokio::sync::{mpsc, oneshot};

use crate::commands::{AttachOutcome, AttachRequest, BrokerCmd};
use crate::TerminalError;

#[derive(Clone)]
pub struct TerminalHandle {
	tx: mpsc::Sender<BrokerCmd>,
}

impl TerminalHandle {
	pub(crate) fn new(tx: mpsc::Sender<BrokerCmd>) -> Self {
		Self { tx }
	}

	/// Runs the attach protocol: relays to a remote peer, or locally spawns
	/// the session's PTY if it doesn't already exist, records intent in
	/// Session Persistence, sends the history snapshot, and returns a sink
	/// the caller forwards further client frames into.
	pub async fn attach(&self, req: AttachRequest) -> Result<AttachOutcome, TerminalError> {
		let (reply, rx) = oneshot::channel();
		self.tx.send(BrokerCmd::Attach { req, reply }).await.map_err(|_| TerminalError::Gone)?;
		rx.await.map_err(|_| TerminalError::Gone)?
	}

	/// Interrupt, then `exit`, then force kill if still alive after 1.5s;
	/// removes the session from Session Persistence.
	pub async fn hibernate(&self, session_name: &str) -> Result<(), TerminalError> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(BrokerCmd::Hibernate { session_name: session_name.to_string(), reply })
			.await
			.map_err(|_| TerminalError::Gone)?;
		rx.await.map_err(|_| TerminalError::Gone)?
	}

	/// Re-creating a hibernated session is just an [`Self::attach`] whose
	/// target session doesn't exist yet; this is a convenience for callers
	/// (e.g. the daemon's wake operation) that don't yet have a client to
	/// attach and only want the PTY and recorded intent to exist.
	pub async fn wake(&self, req: AttachRequest) -> Result<(), TerminalError> {
		self.attach(req).await.map(|_| ())
	}

	/// The multiplexer's current pane working directory for `session_name`,
	/// for working-directory reconciliation against the Agent Registry.
	pub async fn reconcile_working_directory(&self, session_name: &str) -> Option<PathBuf> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(BrokerCmd::ReconcileWorkingDirectory { session_name: session_name.to_string(), reply })
			.await
			.ok()?;
		rx.await.ok().flatten()
	}

	/// Reconciles `session_store`'s recorded intent against the
	/// multiplexer's live session list, classifying each recorded session
	/// as already-live or needing re-creation.
	pub async fn resumable_sessions(&self, session_store: Arc<SessionStore>) -> Vec<ReconciledSession> {
		let (reply, rx) = oneshot::channel();
		if self.tx.send(BrokerCmd::ResumableSessions { session_store, reply }).await.is_err() {
			return Vec::new();
		}
		rx.await.unwrap_or_default()
	}
}
