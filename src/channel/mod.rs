//! Real-time channel layer
//!
//! This module provides the channel abstraction and its WebSocket
//! implementation. The rest of the client only sees three things: a
//! fire-and-forget [`Channel::publish`], the current [`SessionState`], and a
//! stream of [`ChannelEvent`]s covering the closed set of lifecycle signals
//! plus inbound remote commands.

use crate::protocol::AppCommand;

pub mod session;
pub mod wire;

pub use session::{ReconnectPolicy, WsChannel};

/// Connection state of the real-time session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected; the supervisor may still be retrying
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Handshake complete, publishes go out
    Connected,
    /// Reconnection attempts exhausted; the session will not recover
    PermanentlyDisconnected,
}

/// Lifecycle signals and inbound commands delivered to the reporting loop
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Session established. `first` distinguishes bootup from reconnection.
    Connected { first: bool },
    /// Session dropped; the supervisor keeps retrying until its bound
    Disconnected { reason: String },
    /// Unrecoverable channel error (reconnection attempts exhausted)
    Error { message: String },
    /// Decoded inbound `app-cmd`
    Command(AppCommand),
}

/// Outbound side of the real-time channel
///
/// `publish` is best-effort fire-and-forget: when the session is not
/// connected the send is silently skipped: never queued, never retried,
/// never surfaced to the caller.
pub trait Channel: Send + Sync {
    fn publish(&self, event: &str, payload: serde_json::Value);

    fn state(&self) -> SessionState;

    fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }
}
