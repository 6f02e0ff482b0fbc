//! Frames exchanged between the Terminal Broker and an attached client.
//!
//! The broker is transport-agnostic: whatever carries these frames to a
//! browser or remote peer (WebSocket, in practice) lives above this crate.

use uuid::Uuid;

/// Identifies one attached client (viewer) of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for ClientId {
	fn default() -> Self {
		Self::new()
	}
}

/// Bytes flowing from a client into the PTY, or a control frame.
#[derive(Debug, Clone)]
pub enum ClientFrame {
	/// Raw terminal input, written unmodified.
	Input(Vec<u8>),
	/// Resize the PTY immediately.
	Resize { cols: u16, rows: u16 },
	/// Refreshes `activityTimestamp` and elicits a `Pong`.
	Ping,
}

/// Bytes flowing from the PTY to a client, or a control frame.
#[derive(Debug, Clone)]
pub enum ServerFrame {
	/// One chunk of PTY output.
	Data(Vec<u8>),
	/// Sent once, after the history snapshot finishes flushing, so the
	/// client can finalize layout.
	HistoryComplete,
	Pong,
}

/// The sink a client registers when attaching. Send is async and may fail
/// (receiver dropped); a failed send is how the fanout loop detects a dead
/// subscriber.
pub type ClientSink = tokio::sync::mpsc::Sender<ServerFrame>;
