//! Terminal Broker: owns every PTY for every active agent on this host.
//!
//! A [`TerminalService`] runs as one host-wide actor; callers talk to it
//! through a cloneable [`TerminalHandle`]. Each attached multiplexer session
//! gets its own actor task (see [`session`]) so a slow or wedged client can
//! only ever stall its own session's PTY reads, never another session's.
//!
//! Output backpressure is the multiplexer's own `portable_pty` stream paced
//! by a bounded(1) channel: the PTY reader thread cannot push its next chunk
//! until the session actor has finished fanning the current one out to every
//! subscriber. That's the pause/resume discipline in its entirety; there is
//! no separate pause/resume call on the PTY itself.
//!
//! Remote sessions (owned by a peer's broker) skip all of the above: they're
//! a pure byte relay over an outbound WebSocket, handled by [`relay`].

mod commands;
mod error;
mod handle;
mod protocol;
mod pty;
mod relay;
mod service;
mod session;

pub use commands::{AttachOutcome, AttachRequest, AttachTarget};
pub use error::TerminalError;
pub use handle::TerminalHandle;
pub use protocol::{ClientFrame, ClientId, ClientSink, ServerFrame};
pub use service::TerminalService;
