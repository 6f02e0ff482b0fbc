//! Per-session actor: owns one multiplexer session's PTY and fans its
//! output out to every attached client with the pause/resume backpressure
//! discipline described at the top of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aimaestro_session::SessionStore;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::protocol::{ClientId, ClientSink, ServerFrame};
use crate::pty::{self, PtyProcess};
use crate::TerminalError;

/// Bounded so a very chatty session can't grow memory without limit; 64KiB
/// comfortably covers a typical terminal scrollback used for the initial
/// history snapshot on attach.
const HISTORY_CAP: usize = 64 * 1024;

const INTERRUPT_THEN_EXIT_GAP: Duration = Duration::from_millis(100);
const GRACEFUL_EXIT_WAIT: Duration = Duration::from_millis(1500);

#[derive(Debug)]
pub enum SessionCmd {
	AttachClient { client_id: ClientId, sink: ClientSink },
	DetachClient { client_id: ClientId },
	Input(Vec<u8>),
	Resize { cols: u16, rows: u16 },
	/// Refreshes `activityTimestamp` and, if `client_id` is still attached,
	/// sends it a `Pong`.
	Ping { client_id: ClientId },
	Hibernate { reply: oneshot::Sender<()> },
}

/// Spawns the actor task for a brand-new or resumed session. The caller is
/// responsible for recording intent in `session_store` beforehand (or
/// after, for a fresh session); this task only tears the record down on
/// hibernate.
pub fn spawn(session_name: String, pty: PtyProcess, pty_rx: pty::PtyOutput, session_store: Arc<SessionStore>) -> mpsc::Sender<SessionCmd> {
	let (cmd_tx, cmd_rx) = mpsc::channel(1);
	tokio::spawn(run(session_name, pty, pty_rx, cmd_rx, session_store));
	cmd_tx
}

async fn run(session_name: String, mut pty: PtyProcess, mut pty_rx: pty::PtyOutput, mut cmd_rx: mpsc::Receiver<SessionCmd>, session_store: Arc<SessionStore>) {
	let mut subscribers: HashMap<ClientId, ClientSink> = HashMap::new();
	let mut history: VecDeque<u8> = VecDeque::with_capacity(HISTORY_CAP);
	let mut last_activity = Instant::now();

	loop {
		tokio::select! {
			chunk = pty_rx.recv() => {
				let Some(chunk) = chunk else {
					tracing::info!(session = %session_name, "pty reader closed, ending session actor");
					break;
				};
				push_history(&mut history, &chunk);
				fan_out(&mut subscribers, &chunk).await;
			}
			cmd = cmd_rx.recv() => {
				let Some(cmd) = cmd else { break };
				match cmd {
					SessionCmd::AttachClient { client_id, sink } => {
						let snapshot: Vec<u8> = history.iter().copied().collect();
						if !snapshot.is_empty() && sink.send(ServerFrame::Data(snapshot)).await.is_err() {
							continue;
						}
						if sink.send(ServerFrame::HistoryComplete).await.is_err() {
							continue;
						}
						subscribers.insert(client_id, sink);
					}
					SessionCmd::DetachClient { client_id } => {
						subscribers.remove(&client_id);
					}
					SessionCmd::Input(bytes) => {
						let _ = pty.write_input(&bytes);
						last_activity = Instant::now();
					}
					SessionCmd::Resize { cols, rows } => {
						let _ = pty.resize(cols, rows);
					}
					SessionCmd::Ping { client_id } => {
						last_activity = Instant::now();
						if let Some(sink) = subscribers.get(&client_id) {
							let _ = sink.send(ServerFrame::Pong).await;
						}
					}
					SessionCmd::Hibernate { reply } => {
						hibernate(&mut pty, &session_name).await;
						let _ = session_store.remove(&session_name).await;
						let _ = reply.send(());
						break;
					}
				}
			}
		}
	}
}

fn push_history(history: &mut VecDeque<u8>, chunk: &[u8]) {
	history.extend(chunk.iter().copied());
	while history.len() > HISTORY_CAP {
		history.pop_front();
	}
}

/// Fans `chunk` out to every subscriber concurrently, awaits all sends to
/// settle (success or error), then removes whichever subscribers failed.
/// Errors never block resumption of the other subscribers or the PTY read
/// loop; the only thing gating the next PTY read is this function
/// returning, which happens once every send has resolved one way or the
/// other.
async fn fan_out(subscribers: &mut HashMap<ClientId, ClientSink>, chunk: &[u8]) {
	if subscribers.is_empty() {
		return;
	}
	let sends = subscribers.iter().map(|(id, sink)| {
		let sink = sink.clone();
		let chunk = chunk.to_vec();
		let id = *id;
		async move { (id, sink.send(ServerFrame::Data(chunk)).await.is_ok()) }
	});
	let results = join_all(sends).await;
	for (id, ok) in results {
		if !ok {
			subscribers.remove(&id);
		}
	}
}

/// Best-effort graceful shutdown: interrupt, then `exit` + Enter, wait up
/// to 1.5s for the multiplexer client to exit on its own, then force kill.
async fn hibernate(pty: &mut PtyProcess, session_name: &str) {
	let _ = pty.write_input(&[0x03]);
	tokio::time::sleep(INTERRUPT_THEN_EXIT_GAP).await;
	let _ = pty.write_input(b"exit\r");

	let deadline = Instant::now() + GRACEFUL_EXIT_WAIT;
	while Instant::now() < deadline {
		if !pty.is_alive() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}

	pty::kill_session(session_name).await;
	pty.kill();
}

/// Used by tests that need to exercise [`fan_out`]/[`push_history`] without
/// a real PTY.
#[cfg(test)]
pub(crate) async fn test_fan_out(subscribers: &mut HashMap<ClientId, ClientSink>, chunk: &[u8]) {
	let _ = timeout(Duration::from_secs(1), fan_out(subscribers, chunk)).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn fan_out_drops_subscribers_whose_receiver_is_gone() {
		let (tx_alive, mut rx_alive) = mpsc::channel(4);
		let (tx_dead, rx_dead) = mpsc::channel(4);
		drop(rx_dead);

		let mut subs = HashMap::new();
		subs.insert(ClientId::new(), tx_alive);
		subs.insert(ClientId::new(), tx_dead);

		test_fan_out(&mut subs, b"hello").await;

		assert_eq!(subs.len(), 1);
		let received = rx_alive.recv().await.unwrap();
		assert!(matches!(received, ServerFrame::Data(bytes) if bytes == b"hello"));
	}

	#[test]
	fn history_buffer_is_capped() {
		let mut history = VecDeque::new();
		push_history(&mut history, &vec![1u8; HISTORY_CAP + 100]);
		assert_eq!(history.len(), HISTORY_CAP);
	}
}
