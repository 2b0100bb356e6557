//! Channel states, state-change events and the read-only channel snapshot.

use std::collections::BTreeMap;
use std::fmt;

use realtime_protocol::{ChannelMode, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::options::ChannelOptions;

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Created by the registry, never attached
    Initialized,
    /// ATTACH sent (or waiting for the connection), no answer yet
    Attaching,
    /// The server confirmed the attachment
    Attached,
    /// DETACH sent, no answer yet
    Detaching,
    /// Not attached, by request or because the connection closed
    Detached,
    /// Attachment lost; retried automatically
    Suspended,
    /// Rejected by the server; only an explicit attach leaves this state
    Failed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Initialized => "initialized",
            ChannelState::Attaching => "attaching",
            ChannelState::Attached => "attached",
            ChannelState::Detaching => "detaching",
            ChannelState::Detached => "detached",
            ChannelState::Suspended => "suspended",
            ChannelState::Failed => "failed",
        }
    }

    /// Whether the channel holds, or is acquiring, an attachment.
    pub fn is_attachment_live(&self) -> bool {
        matches!(self, ChannelState::Attaching | ChannelState::Attached)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of every channel event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStateChange {
    pub previous: ChannelState,
    pub current: ChannelState,
    /// Error that caused the transition, if any
    pub reason: Option<ErrorInfo>,
    /// Message continuity flag; only meaningful for attached events
    pub resumed: bool,
}

/// Event emitted to `RealtimeChannel::events` subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel moved to a new state
    StateChange(ChannelStateChange),
    /// The server re-confirmed an attached channel (state unchanged)
    Update(ChannelStateChange),
}

impl ChannelEvent {
    /// The state change carried by this event.
    pub fn change(&self) -> &ChannelStateChange {
        match self {
            ChannelEvent::StateChange(change) | ChannelEvent::Update(change) => change,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, ChannelEvent::Update(_))
    }

    /// Event name: the current state, or `"update"`.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::StateChange(change) => change.current.as_str(),
            ChannelEvent::Update(_) => "update",
        }
    }
}

/// Read-only view of a channel, republished after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub state: ChannelState,
    pub error_reason: Option<ErrorInfo>,
    /// Params granted by the server on the last ATTACHED
    pub params: BTreeMap<String, String>,
    /// Modes granted by the server on the last ATTACHED
    pub modes: Vec<ChannelMode>,
    /// Options most recently requested by the application
    pub options: ChannelOptions,
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            state: ChannelState::Initialized,
            error_reason: None,
            params: BTreeMap::new(),
            modes: ChannelMode::defaults(),
            options: ChannelOptions::default(),
        }
    }
}
