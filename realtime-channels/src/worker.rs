//! Background dispatcher task
//!
//! Every application request, inbound protocol message, connection transition
//! and timer firing becomes a [`Command`] on one unbounded queue. A single
//! tokio task drains it in order, so channel state has exactly one writer.

use std::fmt;

use realtime_protocol::{Message, PresenceMessage, ProtocolMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::completion::Responder;
use crate::dispatcher::Dispatcher;
use crate::options::ChannelOptions;
use crate::queue::Payload;
use crate::state::{ChannelEvent, ChannelSnapshot, ChannelState};
use crate::subscriptions::Listener;
use crate::timers::TimerToken;
use crate::transport::ConnectionState;

/// Commands processed by the dispatcher task
pub(crate) enum Command {
    /// Create the record behind a new channel handle
    Register {
        name: String,
        snapshot: watch::Sender<ChannelSnapshot>,
    },
    /// Drop a channel record
    Release { name: String },
    Attach {
        channel: String,
        reply: Responder<()>,
    },
    Detach {
        channel: String,
        reply: Responder<()>,
    },
    SetOptions {
        channel: String,
        options: ChannelOptions,
        local_only: bool,
        reply: Option<Responder<()>>,
    },
    Publish {
        channel: String,
        payload: Payload,
        reply: Responder<()>,
    },
    Subscribe {
        channel: String,
        filter: Option<String>,
        listener: Listener<Message>,
    },
    Unsubscribe {
        channel: String,
        filter: Option<String>,
        listener: Option<Listener<Message>>,
    },
    SubscribePresence {
        channel: String,
        filter: Option<String>,
        listener: Listener<PresenceMessage>,
    },
    UnsubscribePresence {
        channel: String,
        filter: Option<String>,
        listener: Option<Listener<PresenceMessage>>,
    },
    WhenState {
        channel: String,
        state: ChannelState,
        reply: Responder<()>,
    },
    Events {
        channel: String,
        sender: mpsc::UnboundedSender<ChannelEvent>,
    },
    /// Protocol message received by the transport
    Inbound(ProtocolMessage),
    /// Connection transition reported by the transport
    ConnectionState(ConnectionState),
    TimerFired { channel: String, token: TimerToken },
    /// Stop the dispatcher, failing everything outstanding
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Register { name, .. } => write!(f, "Register({name})"),
            Command::Release { name } => write!(f, "Release({name})"),
            Command::Attach { channel, .. } => write!(f, "Attach({channel})"),
            Command::Detach { channel, .. } => write!(f, "Detach({channel})"),
            Command::SetOptions { channel, options, .. } => {
                write!(f, "SetOptions({channel}, {options:?})")
            }
            Command::Publish { channel, .. } => write!(f, "Publish({channel})"),
            Command::Subscribe { channel, filter, .. } => write!(f, "Subscribe({channel}, {filter:?})"),
            Command::Unsubscribe { channel, filter, .. } => {
                write!(f, "Unsubscribe({channel}, {filter:?})")
            }
            Command::SubscribePresence { channel, filter, .. } => {
                write!(f, "SubscribePresence({channel}, {filter:?})")
            }
            Command::UnsubscribePresence { channel, filter, .. } => {
                write!(f, "UnsubscribePresence({channel}, {filter:?})")
            }
            Command::WhenState { channel, state, .. } => write!(f, "WhenState({channel}, {state})"),
            Command::Events { channel, .. } => write!(f, "Events({channel})"),
            Command::Inbound(message) => write!(f, "Inbound({}, {:?})", message.action, message.channel),
            Command::ConnectionState(state) => write!(f, "ConnectionState({state})"),
            Command::TimerFired { channel, token } => write!(f, "TimerFired({channel}, {token:?})"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Spawns the dispatcher task on the current tokio runtime
pub(crate) fn spawn_dispatcher(
    mut dispatcher: Dispatcher,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Channel dispatcher started");

        while let Some(command) = commands.recv().await {
            tracing::trace!("Dispatcher: {:?}", command);
            if !dispatcher.handle(command) {
                break;
            }
        }

        tracing::info!("Channel dispatcher stopped");
    })
}
