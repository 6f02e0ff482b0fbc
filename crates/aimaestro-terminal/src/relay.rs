//! Pure relay to a remote peer's broker: no local PTY, just bytes piped
//! bidirectionally over an outbound WebSocket.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientFrame, ClientSink, ServerFrame};
use crate::TerminalError;

/// Wire encoding for `ClientFrame::Resize`/`Ping`, sent as WebSocket text
/// frames; `ClientFrame::Input` travels as a binary frame unmodified.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
	Resize { cols: u16, rows: u16 },
	Ping,
}

/// Opens an outbound WebSocket to `ws_url` (the peer's broker, addressing
/// one remote session) and pipes bytes bidirectionally until either side
/// closes. Returns a sender the caller forwards local client frames into;
/// PTY-equivalent output is delivered to `client` as it arrives.
pub async fn attach_remote(ws_url: &str, client: ClientSink) -> Result<mpsc::Sender<ClientFrame>, TerminalError> {
	let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await.map_err(|e| TerminalError::Relay(e.to_string()))?;
	let (mut write, mut read) = ws_stream.split();
	let (input_tx, mut input_rx) = mpsc::channel::<ClientFrame>(32);

	tokio::spawn(async move {
		loop {
			tokio::select! {
				incoming = read.next() => {
					match incoming {
						Some(Ok(Message::Binary(bytes))) => {
							if client.send(ServerFrame::Data(bytes)).await.is_err() {
								break;
							}
						}
						Some(Ok(Message::Pong(_))) => {
							let _ = client.send(ServerFrame::Pong).await;
						}
						Some(Ok(Message::Close(_))) | None => break,
						Some(Err(_)) => break,
						_ => {}
					}
				}
				outgoing = input_rx.recv() => {
					match outgoing {
						Some(ClientFrame::Input(bytes)) => {
							if write.send(Message::Binary(bytes)).await.is_err() {
								break;
							}
						}
						Some(ClientFrame::Resize { cols, rows }) => {
							let frame = ControlFrame::Resize { cols, rows };
							if let Ok(json) = serde_json::to_string(&frame)
								&& write.send(Message::Text(json)).await.is_err()
							{
								break;
							}
						}
						Some(ClientFrame::Ping) => {
							if write.send(Message::Ping(Vec::new())).await.is_err() {
								break;
							}
						}
						None => break,
					}
				}
			}
		}
		let _ = write.close().await;
	});

	Ok(input_tx)
}
