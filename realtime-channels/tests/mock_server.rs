//! Scripted in-process server implementing [`Transport`].
//!
//! Every outbound protocol message is recorded and answered through the
//! client's [`TransportSink`], the way a connection would feed replies back.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use realtime_channels::{
    is_valid_channel_name, Action, ChannelMode, ConnectionState, ErrorInfo, ProtocolMessage,
    Transport, TransportError, TransportSink,
};

pub struct MockServer {
    sink: OnceLock<TransportSink>,
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<ProtocolMessage>>,
    ignored: Mutex<HashSet<String>>,
    granted: Mutex<HashMap<String, Vec<ChannelMode>>>,
}

impl MockServer {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            sink: OnceLock::new(),
            state: Mutex::new(state),
            sent: Mutex::new(Vec::new()),
            ignored: Mutex::new(HashSet::new()),
            granted: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the server to the client it answers.
    pub fn connect_sink(&self, sink: TransportSink) {
        let _ = self.sink.set(sink);
    }

    /// Stop answering ATTACH for `channel`.
    pub fn ignore_attach(&self, channel: &str) {
        self.ignored.lock().unwrap().insert(channel.to_string());
    }

    pub fn answer_attach(&self, channel: &str) {
        self.ignored.lock().unwrap().remove(channel);
    }

    pub fn set_connection(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        self.sink().connection_state_changed(state).unwrap();
    }

    /// Push a server-originated message to the client.
    pub fn deliver(&self, message: ProtocolMessage) {
        self.sink().deliver(message).unwrap();
    }

    pub fn sent(&self) -> Vec<ProtocolMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_on(&self, channel: &str, action: Action) -> Vec<ProtocolMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.channel == channel && m.action == action)
            .collect()
    }

    fn sink(&self) -> &TransportSink {
        self.sink.get().expect("server not connected to a client")
    }

    fn answer(&self, message: &ProtocolMessage) {
        match message.action {
            Action::Attach => self.answer_attach_request(message),
            Action::Detach => self.deliver(ProtocolMessage::detached(&message.channel, None)),
            Action::Message => {
                let serial = message.msg_serial.unwrap_or_default();
                if self.granted(&message.channel, ChannelMode::Publish) {
                    self.deliver(ack(serial));
                    let mut echo = ProtocolMessage::new(Action::Message, &message.channel);
                    echo.messages = message.messages.clone();
                    self.deliver(echo);
                } else {
                    self.deliver(nack(serial, not_permitted("publish")));
                }
            }
            Action::Presence => {
                let serial = message.msg_serial.unwrap_or_default();
                if self.granted(&message.channel, ChannelMode::Presence) {
                    self.deliver(ack(serial));
                    let mut echo = ProtocolMessage::new(Action::Presence, &message.channel);
                    echo.presence = message.presence.clone();
                    self.deliver(echo);
                } else {
                    self.deliver(nack(serial, not_permitted("presence")));
                }
            }
            _ => {}
        }
    }

    fn answer_attach_request(&self, message: &ProtocolMessage) {
        let channel = &message.channel;
        if self.ignored.lock().unwrap().contains(channel) {
            return;
        }
        if !is_valid_channel_name(channel) {
            self.deliver(ProtocolMessage::error(
                channel,
                ErrorInfo::invalid_channel_name(channel),
            ));
            return;
        }

        let modes = message.modes.clone().unwrap_or_else(ChannelMode::defaults);
        self.granted
            .lock()
            .unwrap()
            .insert(channel.clone(), modes.clone());

        let mut reply = ProtocolMessage::attached(channel).with_modes(modes);
        if let Some(params) = message.params.clone() {
            reply = reply.with_params(params);
        }
        self.deliver(reply);
    }

    fn granted(&self, channel: &str, mode: ChannelMode) -> bool {
        self.granted
            .lock()
            .unwrap()
            .get(channel)
            .is_some_and(|modes| modes.contains(&mode))
    }
}

impl Transport for MockServer {
    fn send(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        let state = self.connection_state();
        if !state.is_connected() {
            return Err(TransportError::NotConnected(state));
        }
        self.sent.lock().unwrap().push(message.clone());
        self.answer(&message);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }
}

fn ack(serial: u64) -> ProtocolMessage {
    let mut message = ProtocolMessage::new(Action::Ack, "");
    message.msg_serial = Some(serial);
    message.count = Some(1);
    message
}

fn nack(serial: u64, error: ErrorInfo) -> ProtocolMessage {
    let mut message = ProtocolMessage::new(Action::Nack, "").with_error(error);
    message.msg_serial = Some(serial);
    message.count = Some(1);
    message
}

fn not_permitted(operation: &str) -> ErrorInfo {
    ErrorInfo::new(
        realtime_channels::codes::OPERATION_NOT_PERMITTED,
        401,
        format!("Channel mode does not permit {operation}"),
    )
}
