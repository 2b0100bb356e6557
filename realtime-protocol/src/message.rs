//! Protocol-message records exchanged between client and server.
//!
//! These are field sets, not byte layouts: the transport is free to encode
//! them however it likes. Field names follow the camelCase wire naming so
//! records can be built straight from their deserialized JSON form.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorInfo;
use crate::mode::ChannelMode;

/// Protocol action with its numeric wire code.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Action {
    Heartbeat,
    Ack,
    Nack,
    Connect,
    Connected,
    Disconnect,
    Disconnected,
    Close,
    Closed,
    Error,
    Attach,
    Attached,
    Detach,
    Detached,
    Presence,
    Message,
    Sync,
    Auth,
}

impl Action {
    /// Numeric wire code of the action.
    pub fn code(self) -> u8 {
        match self {
            Action::Heartbeat => 0,
            Action::Ack => 1,
            Action::Nack => 2,
            Action::Connect => 3,
            Action::Connected => 4,
            Action::Disconnect => 5,
            Action::Disconnected => 6,
            Action::Close => 7,
            Action::Closed => 8,
            Action::Error => 9,
            Action::Attach => 10,
            Action::Attached => 11,
            Action::Detach => 12,
            Action::Detached => 13,
            Action::Presence => 14,
            Action::Message => 15,
            Action::Sync => 16,
            Action::Auth => 17,
        }
    }
}

/// A numeric action code with no known meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown protocol action code: {0}")]
pub struct UnknownAction(pub u8);

impl TryFrom<u8> for Action {
    type Error = UnknownAction;

    fn try_from(code: u8) -> Result<Self, UnknownAction> {
        let action = match code {
            0 => Action::Heartbeat,
            1 => Action::Ack,
            2 => Action::Nack,
            3 => Action::Connect,
            4 => Action::Connected,
            5 => Action::Disconnect,
            6 => Action::Disconnected,
            7 => Action::Close,
            8 => Action::Closed,
            9 => Action::Error,
            10 => Action::Attach,
            11 => Action::Attached,
            12 => Action::Detach,
            13 => Action::Detached,
            14 => Action::Presence,
            15 => Action::Message,
            16 => Action::Sync,
            17 => Action::Auth,
            other => return Err(UnknownAction(other)),
        };
        Ok(action)
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action.code()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// A message published on, or delivered from, a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Event name used for subscription filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Message {
    /// Create a message with an optional event name and payload.
    pub fn new(name: Option<impl Into<String>>, data: Option<Value>) -> Self {
        Self {
            name: name.map(Into::into),
            data,
            ..Default::default()
        }
    }
}

/// Presence event kind, with its numeric wire code.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PresenceAction {
    Absent,
    Present,
    Enter,
    Leave,
    Update,
}

impl PresenceAction {
    /// Event name used for presence subscription filtering.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceAction::Absent => "absent",
            PresenceAction::Present => "present",
            PresenceAction::Enter => "enter",
            PresenceAction::Leave => "leave",
            PresenceAction::Update => "update",
        }
    }
}

impl TryFrom<u8> for PresenceAction {
    type Error = UnknownAction;

    fn try_from(code: u8) -> Result<Self, UnknownAction> {
        match code {
            0 => Ok(PresenceAction::Absent),
            1 => Ok(PresenceAction::Present),
            2 => Ok(PresenceAction::Enter),
            3 => Ok(PresenceAction::Leave),
            4 => Ok(PresenceAction::Update),
            other => Err(UnknownAction(other)),
        }
    }
}

impl From<PresenceAction> for u8 {
    fn from(action: PresenceAction) -> Self {
        match action {
            PresenceAction::Absent => 0,
            PresenceAction::Present => 1,
            PresenceAction::Enter => 2,
            PresenceAction::Leave => 3,
            PresenceAction::Update => 4,
        }
    }
}

/// A presence event for one client on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub action: PresenceAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PresenceMessage {
    pub fn new(action: PresenceAction, client_id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            action,
            client_id: Some(client_id.into()),
            data,
        }
    }
}

/// A typed protocol-message record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage {
    pub action: Action,
    /// Channel the message is scoped to; empty for connection-level messages
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_serial: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modes: Option<Vec<ChannelMode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presence: Vec<PresenceMessage>,
}

impl ProtocolMessage {
    /// Create an empty message for `action` on `channel`.
    pub fn new(action: Action, channel: impl Into<String>) -> Self {
        Self {
            action,
            channel: channel.into(),
            msg_serial: None,
            count: None,
            error: None,
            resumed: None,
            params: None,
            modes: None,
            messages: Vec::new(),
            presence: Vec::new(),
        }
    }

    /// ATTACH request carrying the negotiated options.
    pub fn attach(
        channel: impl Into<String>,
        params: Option<BTreeMap<String, String>>,
        modes: Option<Vec<ChannelMode>>,
    ) -> Self {
        Self {
            params,
            modes,
            ..Self::new(Action::Attach, channel)
        }
    }

    /// DETACH request.
    pub fn detach(channel: impl Into<String>) -> Self {
        Self::new(Action::Detach, channel)
    }

    /// ATTACHED response.
    pub fn attached(channel: impl Into<String>) -> Self {
        Self::new(Action::Attached, channel)
    }

    /// DETACHED notification, optionally with a server error.
    pub fn detached(channel: impl Into<String>, error: Option<ErrorInfo>) -> Self {
        Self {
            error,
            ..Self::new(Action::Detached, channel)
        }
    }

    /// Channel-scoped ERROR.
    pub fn error(channel: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            error: Some(error),
            ..Self::new(Action::Error, channel)
        }
    }

    /// Builder: set the `resumed` flag.
    pub fn with_resumed(mut self, resumed: bool) -> Self {
        self.resumed = Some(resumed);
        self
    }

    /// Builder: attach an error body.
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Builder: granted params.
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    /// Builder: granted modes.
    pub fn with_modes(mut self, modes: Vec<ChannelMode>) -> Self {
        self.modes = Some(modes);
        self
    }

    /// Whether the server reported message continuity. Absent means `false`.
    pub fn is_resumed(&self) -> bool {
        self.resumed.unwrap_or(false)
    }

    /// Whether this message is routed to a channel rather than the connection.
    pub fn is_channel_scoped(&self) -> bool {
        !self.channel.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_detached_with_error() {
        let message: ProtocolMessage = serde_json::from_value(json!({
            "action": 13,
            "channel": "server_sent_detached",
            "error": {"statusCode": 500, "code": 50000, "message": "generic serverside failure"}
        }))
        .unwrap();

        assert_eq!(message.action, Action::Detached);
        assert_eq!(message.channel, "server_sent_detached");
        assert_eq!(message.error.as_ref().unwrap().code, 50000);
        assert!(!message.is_resumed());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<ProtocolMessage, _> =
            serde_json::from_value(json!({"action": 42, "channel": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_action_code_conversion() {
        assert_eq!(Action::try_from(9), Ok(Action::Error));
        assert_eq!(Action::try_from(13), Ok(Action::Detached));
        assert_eq!(u8::from(Action::Error), 9);
        assert_eq!(Action::try_from(42), Err(UnknownAction(42)));
        assert_eq!(PresenceAction::try_from(200), Err(UnknownAction(200)));
    }

    #[test]
    fn test_attach_serializes_options() {
        let mut params = BTreeMap::new();
        params.insert("delta".to_string(), "vcdiff".to_string());
        let message = ProtocolMessage::attach("room", Some(params), Some(vec![ChannelMode::Subscribe]));

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["action"], 10);
        assert_eq!(value["params"]["delta"], "vcdiff");
        assert_eq!(value["modes"], json!(["subscribe"]));
        assert!(value.get("msgSerial").is_none());
        assert!(value.get("messages").is_none());
    }

    #[test]
    fn test_connection_scoped_ack() {
        let message: ProtocolMessage =
            serde_json::from_value(json!({"action": 1, "msgSerial": 3, "count": 2})).unwrap();
        assert_eq!(message.action, Action::Ack);
        assert!(!message.is_channel_scoped());
        assert_eq!(message.msg_serial, Some(3));
        assert_eq!(message.count, Some(2));
    }

    #[test]
    fn test_presence_action_names() {
        let message: PresenceMessage =
            serde_json::from_value(json!({"action": 2, "clientId": "alice"})).unwrap();
        assert_eq!(message.action.as_str(), "enter");
        assert_eq!(message.client_id.as_deref(), Some("alice"));
    }
}
