//! Presence enter/update/leave and presence subscriptions.
//!
//! Presence events ride the channel's publish path, so they share its
//! queueing, implicit attach and acknowledgement handling. Full presence-set
//! bookkeeping is not kept here.

use realtime_protocol::{ErrorInfo, PresenceAction, PresenceMessage};
use serde_json::Value;

use crate::completion::Completion;
use crate::handle::RealtimeChannel;
use crate::queue::Payload;
use crate::subscriptions::Listener;
use crate::worker::Command;

/// Listener for presence events.
pub type PresenceListener = Listener<PresenceMessage>;

/// Presence operations for one channel.
#[derive(Clone, Debug)]
pub struct RealtimePresence {
    channel: RealtimeChannel,
}

impl RealtimePresence {
    pub(crate) fn new(channel: RealtimeChannel) -> Self {
        Self { channel }
    }

    /// Enter presence as the client's configured client id.
    pub fn enter(&self, data: Option<Value>) -> Completion<()> {
        self.as_self(PresenceAction::Enter, data)
    }

    pub fn update(&self, data: Option<Value>) -> Completion<()> {
        self.as_self(PresenceAction::Update, data)
    }

    pub fn leave(&self, data: Option<Value>) -> Completion<()> {
        self.as_self(PresenceAction::Leave, data)
    }

    /// Enter presence on behalf of `client_id`.
    pub fn enter_client(&self, client_id: &str, data: Option<Value>) -> Completion<()> {
        self.send_presence(PresenceAction::Enter, client_id, data)
    }

    pub fn update_client(&self, client_id: &str, data: Option<Value>) -> Completion<()> {
        self.send_presence(PresenceAction::Update, client_id, data)
    }

    pub fn leave_client(&self, client_id: &str, data: Option<Value>) -> Completion<()> {
        self.send_presence(PresenceAction::Leave, client_id, data)
    }

    /// Subscribe to presence events with `action` (all actions for `None`).
    ///
    /// Implicitly attaches; the completion carries the attach outcome.
    pub fn subscribe(
        &self,
        action: Option<PresenceAction>,
        listener: PresenceListener,
    ) -> Completion<()> {
        if let Err(error) = self.channel.send(Command::SubscribePresence {
            channel: self.channel.name().to_string(),
            filter: action.map(|a| a.as_str().to_string()),
            listener,
        }) {
            return Completion::ready(Err(error));
        }
        self.channel.attach()
    }

    /// Remove presence listeners; `None` arguments match anything.
    pub fn unsubscribe(&self, action: Option<PresenceAction>, listener: Option<&PresenceListener>) {
        let _ = self.channel.send(Command::UnsubscribePresence {
            channel: self.channel.name().to_string(),
            filter: action.map(|a| a.as_str().to_string()),
            listener: listener.cloned(),
        });
    }

    fn as_self(&self, action: PresenceAction, data: Option<Value>) -> Completion<()> {
        match self.channel.client_id() {
            Some(client_id) => self.send_presence(action, client_id, data),
            None => Completion::ready(Err(ErrorInfo::missing_client_id())),
        }
    }

    fn send_presence(
        &self,
        action: PresenceAction,
        client_id: &str,
        data: Option<Value>,
    ) -> Completion<()> {
        if client_id.is_empty() {
            return Completion::ready(Err(ErrorInfo::missing_client_id()));
        }
        let message = PresenceMessage::new(action, client_id, data);
        self.channel.publish_payload(Payload::Presence(vec![message]))
    }
}
