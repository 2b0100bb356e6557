//! Application-facing channel handle.
//!
//! A `RealtimeChannel` is a cheap, cloneable view of one channel: reads come
//! from the snapshot the dispatcher publishes, and every operation is queued
//! to the dispatcher and answered through a [`Completion`].

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use realtime_protocol::{ChannelMode, ErrorInfo, Message};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::completion::{client_closed, Completion, Responder};
use crate::options::ChannelOptions;
use crate::presence::RealtimePresence;
use crate::queue::Payload;
use crate::state::{ChannelEvent, ChannelSnapshot, ChannelState};
use crate::subscriptions::Listener;
use crate::worker::Command;

/// Listener for published messages.
pub type MessageListener = Listener<Message>;

/// Whether `name` is acceptable as a channel name.
///
/// Rejected: the empty name, an empty namespace (leading `:`) and an empty
/// name after the namespace separator (trailing `:`).
pub fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with(':') && !name.ends_with(':')
}

/// Handle to one named channel.
#[derive(Clone)]
pub struct RealtimeChannel {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChannelSnapshot>,
    client_id: Option<Arc<str>>,
}

impl RealtimeChannel {
    pub(crate) fn new(
        name: &str,
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<ChannelSnapshot>,
        client_id: Option<Arc<str>>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            commands,
            snapshot,
            client_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        self.snapshot.borrow().state
    }

    /// Last error that caused a transition; cleared on successful attach.
    pub fn error_reason(&self) -> Option<ErrorInfo> {
        self.snapshot.borrow().error_reason.clone()
    }

    /// Params granted by the server.
    pub fn params(&self) -> BTreeMap<String, String> {
        self.snapshot.borrow().params.clone()
    }

    /// Modes granted by the server.
    pub fn modes(&self) -> Vec<ChannelMode> {
        self.snapshot.borrow().modes.clone()
    }

    /// Options as last requested by the application.
    pub fn channel_options(&self) -> ChannelOptions {
        self.snapshot.borrow().options.clone()
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Attach to the channel. Concurrent calls share one request.
    pub fn attach(&self) -> Completion<()> {
        self.request(|channel, reply| Command::Attach { channel, reply })
    }

    pub fn detach(&self) -> Completion<()> {
        self.request(|channel, reply| Command::Detach { channel, reply })
    }

    /// Replace the channel options.
    ///
    /// Invalid options fail without touching the channel. Options naming no
    /// server-visible field resolve before this returns. Otherwise the
    /// dispatcher decides: the completion resolves at once when nothing needs
    /// renegotiating, or once the server has answered the new ATTACH.
    pub fn set_options(&self, options: ChannelOptions) -> Completion<()> {
        if let Err(error) = options.normalize() {
            return Completion::ready(Err(error));
        }

        if !options.has_server_fields() {
            let result = self.send(Command::SetOptions {
                channel: self.name.to_string(),
                options,
                local_only: false,
                reply: None,
            });
            return Completion::ready(result);
        }

        self.request(|channel, reply| Command::SetOptions {
            channel,
            options,
            local_only: false,
            reply: Some(reply),
        })
    }

    /// Apply options from a registry lookup; refused if they would reattach.
    pub(crate) fn apply_options_locally(&self, options: ChannelOptions) -> Completion<()> {
        self.request(|channel, reply| Command::SetOptions {
            channel,
            options,
            local_only: true,
            reply: Some(reply),
        })
    }

    /// Publish a single message.
    pub fn publish(&self, name: Option<&str>, data: Option<Value>) -> Completion<()> {
        self.publish_messages(vec![Message::new(name, data)])
    }

    /// Publish a batch of messages in one protocol message.
    pub fn publish_messages(&self, messages: Vec<Message>) -> Completion<()> {
        self.publish_payload(Payload::Messages(messages))
    }

    pub(crate) fn publish_payload(&self, payload: Payload) -> Completion<()> {
        if !is_valid_channel_name(&self.name) {
            return Completion::ready(Err(ErrorInfo::invalid_channel_name(&self.name)));
        }
        self.request(|channel, reply| Command::Publish {
            channel,
            payload,
            reply,
        })
    }

    /// Subscribe to messages named `filter` (all messages for `None`).
    ///
    /// Implicitly attaches; the completion carries the attach outcome.
    pub fn subscribe(&self, filter: Option<&str>, listener: MessageListener) -> Completion<()> {
        if let Err(error) = self.send(Command::Subscribe {
            channel: self.name.to_string(),
            filter: filter.map(str::to_string),
            listener,
        }) {
            return Completion::ready(Err(error));
        }
        self.attach()
    }

    /// Remove message listeners. `None` arguments match anything, so
    /// `unsubscribe(None, None)` removes every listener on the channel.
    pub fn unsubscribe(&self, filter: Option<&str>, listener: Option<&MessageListener>) {
        let _ = self.send(Command::Unsubscribe {
            channel: self.name.to_string(),
            filter: filter.map(str::to_string),
            listener: listener.cloned(),
        });
    }

    /// Resolve once the channel is in `state`; immediately if it already is.
    pub fn when_state(&self, state: ChannelState) -> Completion<()> {
        if self.state() == state {
            return Completion::ready(Ok(()));
        }
        self.request(|channel, reply| Command::WhenState {
            channel,
            state,
            reply,
        })
    }

    /// Stream of state changes and updates from now on.
    pub fn events(&self) -> ChannelEvents {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.send(Command::Events {
            channel: self.name.to_string(),
            sender,
        });
        ChannelEvents { receiver }
    }

    /// Presence operations on this channel.
    pub fn presence(&self) -> RealtimePresence {
        RealtimePresence::new(self.clone())
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), ErrorInfo> {
        self.commands.send(command).map_err(|_| client_closed())
    }

    fn request(&self, build: impl FnOnce(String, Responder<()>) -> Command) -> Completion<()> {
        let (reply, completion) = Completion::channel();
        match self.send(build(self.name.to_string(), reply)) {
            Ok(()) => completion,
            Err(error) => Completion::ready(Err(error)),
        }
    }
}

impl fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-subscriber stream of [`ChannelEvent`]s.
pub struct ChannelEvents {
    receiver: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl ChannelEvents {
    /// Next event; `None` once the channel or client is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for ChannelEvents {
    type Item = ChannelEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
