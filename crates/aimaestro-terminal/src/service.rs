//! `TerminalService`: the host-wide actor that owns every local session's
//! PTY and routes attach/hibernate/reconcile requests to the right one.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::commands::{AttachOutcome, AttachRequest, AttachTarget, BrokerCmd};
use crate::protocol::ClientFrame;
use crate::pty::{self, PtyProcess};
use crate::session::{self, SessionCmd};
use crate::{relay, TerminalError};

/// Owns `HashMap<session_name, SessionCmd sender>` for every live local
/// session on this host. One instance per daemon process.
pub struct TerminalService {
	rx: mpsc::Receiver<BrokerCmd>,
	sessions: HashMap<String, mpsc::Sender<SessionCmd>>,
}

impl TerminalService {
	/// Spawns the actor task and returns a handle for communicating with it.
	pub fn start() -> super::TerminalHandle {
		let (tx, rx) = mpsc::channel(256);
		let service = Self { rx, sessions: HashMap::new() };
		tokio::spawn(service.run());
		super::TerminalHandle::new(tx)
	}

	async fn run(mut self) {
		while let Some(cmd) = self.rx.recv().await {
			match cmd {
				BrokerCmd::Attach { req, reply } => {
					let outcome = self.attach(req).await;
					let _ = reply.send(outcome);
				}
				BrokerCmd::Hibernate { session_name, reply } => {
					let outcome = self.hibernate(&session_name).await;
					let _ = reply.send(outcome);
				}
				BrokerCmd::ReconcileWorkingDirectory { session_name, reply } => {
					let path = pty::current_pane_path(&session_name).await;
					let _ = reply.send(path);
				}
				BrokerCmd::ResumableSessions { session_store, reply } => {
					let live = pty::live_session_names().await;
					let reconciled = session_store.reconcile(&live).await;
					let _ = reply.send(reconciled);
				}
			}
		}
	}

	async fn attach(&mut self, req: AttachRequest) -> Result<AttachOutcome, TerminalError> {
		if let AttachTarget::Remote { ws_url } = &req.target {
			let input = relay::attach_remote(ws_url, req.client_sink).await?;
			return Ok(AttachOutcome { input });
		}

		let cmd_tx = match self.sessions.get(&req.session_name) {
			Some(tx) => tx.clone(),
			None => {
				let (pty, pty_rx) = PtyProcess::spawn_tmux(&req.session_name, &req.working_directory)?;
				let tx = session::spawn(req.session_name.clone(), pty, pty_rx, req.session_store.clone());
				self.sessions.insert(req.session_name.clone(), tx.clone());
				tx
			}
		};

		req.session_store.record(&req.session_name, req.working_directory.clone()).await.map_err(|e| TerminalError::Pty(e.to_string()))?;

		let _ = cmd_tx.send(SessionCmd::AttachClient { client_id: req.client_id, sink: req.client_sink }).await;

		Ok(AttachOutcome { input: spawn_input_forwarder(cmd_tx, req.client_id) })
	}

	async fn hibernate(&mut self, session_name: &str) -> Result<(), TerminalError> {
		let Some(cmd_tx) = self.sessions.remove(session_name) else {
			return Err(TerminalError::SessionNotFound(session_name.to_string()));
		};
		let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
		cmd_tx.send(SessionCmd::Hibernate { reply: reply_tx }).await.map_err(|_| TerminalError::Gone)?;
		reply_rx.await.map_err(|_| TerminalError::Gone)
	}
}

/// Translates decoded client frames into session actor commands. Spawned
/// once per attach; ends when the caller drops its `input` sender or the
/// session actor goes away.
fn spawn_input_forwarder(cmd_tx: mpsc::Sender<SessionCmd>, client_id: crate::protocol::ClientId) -> mpsc::Sender<ClientFrame> {
	let (input_tx, mut input_rx) = mpsc::channel::<ClientFrame>(64);
	tokio::spawn(async move {
		while let Some(frame) = input_rx.recv().await {
			let cmd = match frame {
				ClientFrame::Input(bytes) => SessionCmd::Input(bytes),
				ClientFrame::Resize { cols, rows } => SessionCmd::Resize { cols, rows },
				ClientFrame::Ping => SessionCmd::Ping { client_id },
			};
			if cmd_tx.send(cmd).await.is_err() {
				break;
			}
		}
	});
	input_tx
}
