//! Boundary with the connection layer.
//!
//! The channel core never owns a socket. Outbound protocol messages go through
//! a [`Transport`]; inbound messages and connection transitions are pushed in
//! through a [`TransportSink`], which feeds the same ordered queue as
//! application requests.

use std::fmt;

use realtime_protocol::{ErrorInfo, ProtocolMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{RealtimeError, Result};
use crate::worker::Command;

/// State of the underlying connection, as reported by the transport.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Initialized,
    Connecting,
    Connected,
    Disconnected,
    Suspended,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a channel may start attaching in this connection state.
    pub fn can_attach(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Suspended
                | ConnectionState::Closing
                | ConnectionState::Closed
                | ConnectionState::Failed
        )
    }

    /// Error surfaced to operations rejected because of this state.
    pub fn error(&self) -> ErrorInfo {
        match self {
            ConnectionState::Suspended => ErrorInfo::connection_suspended(),
            ConnectionState::Closing | ConnectionState::Closed => ErrorInfo::connection_closed(),
            ConnectionState::Failed => ErrorInfo::connection_failed(),
            other => ErrorInfo::invalid_state(format!("Connection is {other}")),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Initialized => "initialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Suspended => "suspended",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors reported by a transport when sending.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection cannot carry messages right now
    #[error("Connection not available: {0}")]
    NotConnected(ConnectionState),

    /// The transport failed to hand the message off
    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl From<&TransportError> for ErrorInfo {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::NotConnected(state) => state.error(),
            TransportError::SendFailed(message) => {
                ErrorInfo::new(realtime_protocol::codes::CONNECTION_FAILED, 503, message.clone())
            }
        }
    }
}

/// Outbound side of the connection layer.
///
/// `send` is best effort: a message accepted here may still be lost, and the
/// channel core relies on its own timers rather than on send results.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Hand a protocol message to the connection.
    fn send(&self, message: ProtocolMessage) -> std::result::Result<(), TransportError>;

    /// Current connection state, read once when the client starts.
    fn connection_state(&self) -> ConnectionState;
}

/// Inbound side of the connection layer.
///
/// Cloneable handle the connection uses to route received protocol messages
/// and its own state transitions to the channel core, in order.
#[derive(Clone)]
pub struct TransportSink {
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportSink {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    /// Route a received protocol message.
    pub fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        self.commands
            .send(Command::Inbound(message))
            .map_err(|_| RealtimeError::Closed)
    }

    /// Report a connection state transition.
    pub fn connection_state_changed(&self, state: ConnectionState) -> Result<()> {
        self.commands
            .send(Command::ConnectionState(state))
            .map_err(|_| RealtimeError::Closed)
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}
