//! Commands accepted by the host-wide [`crate::service::TerminalService`].

use std::path::PathBuf;
use std::sync::Arc;

use aimaestro_session::SessionStore;
use tokio::sync::oneshot;

use crate::protocol::{ClientFrame, ClientId, ClientSink};
use crate::TerminalError;

#[derive(Debug, Clone)]
pub enum AttachTarget {
	/// The session's PTY lives on this host.
	Local,
	/// The session belongs to a peer; the broker relays bytes over this
	/// peer broker's WebSocket endpoint rather than owning a PTY.
	Remote { ws_url: String },
}

pub struct AttachRequest {
	pub session_name: String,
	pub target: AttachTarget,
	pub working_directory: PathBuf,
	pub session_store: Arc<SessionStore>,
	pub client_id: ClientId,
	pub client_sink: ClientSink,
}

pub struct AttachOutcome {
	/// The caller forwards decoded client frames (raw input bytes, resize,
	/// ping) into this sender for the remainder of the attachment.
	pub input: tokio::sync::mpsc::Sender<ClientFrame>,
}

pub(crate) enum BrokerCmd {
	Attach {
		req: AttachRequest,
		reply: oneshot::Sender<Result<AttachOutcome, TerminalError>>,
	},
	Hibernate {
		session_name: String,
		reply: oneshot::Sender<Result<(), TerminalError>>,
	},
	ReconcileWorkingDirectory {
		session_name: String,
		reply: oneshot::Sender<Option<PathBuf>>,
	},
	ResumableSessions {
		session_store: Arc<SessionStore>,
		reply: oneshot::Sender<Vec<aimaestro_session::ReconciledSession>>,
	},
}
