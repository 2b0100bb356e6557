//! Deterministic fixtures for driving the dispatcher in unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use realtime_protocol::{Action, Message, ProtocolMessage};
use tokio::sync::{mpsc, watch};

use crate::completion::Completion;
use crate::config::ClientOptions;
use crate::dispatcher::Dispatcher;
use crate::options::ChannelOptions;
use crate::queue::Payload;
use crate::state::{ChannelEvent, ChannelSnapshot, ChannelState};
use crate::timers::{Scheduler, TimerToken};
use crate::transport::{ConnectionState, Transport, TransportError};
use crate::worker::Command;

/// Transport that records every outbound message.
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<ProtocolMessage>>,
    state: ConnectionState,
}

impl RecordingTransport {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            state,
        }
    }

    pub fn sent(&self) -> Vec<ProtocolMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_actions(&self) -> Vec<Action> {
        self.sent().iter().map(|m| m.action).collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Scheduled {
    pub channel: String,
    pub token: TimerToken,
    pub delay: Duration,
}

/// Scheduler whose timers only fire when a test says so.
#[derive(Clone, Default)]
pub(crate) struct ManualScheduler {
    scheduled: Arc<Mutex<Vec<Scheduled>>>,
    cancelled: Arc<Mutex<Vec<TimerToken>>>,
}

impl ManualScheduler {
    pub fn last(&self) -> Scheduled {
        self.scheduled.lock().unwrap().last().cloned().expect("no timer scheduled")
    }

    pub fn was_cancelled(&self, token: TimerToken) -> bool {
        self.cancelled.lock().unwrap().contains(&token)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, channel: &str, token: TimerToken, delay: Duration) {
        self.scheduled.lock().unwrap().push(Scheduled {
            channel: channel.to_string(),
            token,
            delay,
        });
    }

    fn cancel(&mut self, token: TimerToken) {
        self.cancelled.lock().unwrap().push(token);
    }
}

/// A dispatcher wired to a recording transport and a manual scheduler.
pub(crate) struct Harness {
    pub dispatcher: Dispatcher,
    pub transport: Arc<RecordingTransport>,
    pub scheduler: ManualScheduler,
    pub options: ClientOptions,
    snapshots: HashMap<String, watch::Receiver<ChannelSnapshot>>,
}

impl Harness {
    pub fn connected() -> Self {
        Self::with_connection(ConnectionState::Connected)
    }

    pub fn with_connection(state: ConnectionState) -> Self {
        Self::with_options(state, ClientOptions::default())
    }

    pub fn with_options(state: ConnectionState, options: ClientOptions) -> Self {
        let transport = Arc::new(RecordingTransport::new(state));
        let scheduler = ManualScheduler::default();
        let dispatcher = Dispatcher::new(
            transport.clone(),
            Box::new(scheduler.clone()),
            options.clone(),
        );
        Self {
            dispatcher,
            transport,
            scheduler,
            options,
            snapshots: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str) {
        if self.snapshots.contains_key(name) {
            return;
        }
        let (tx, rx) = watch::channel(ChannelSnapshot::default());
        self.dispatcher.handle(Command::Register {
            name: name.to_string(),
            snapshot: tx,
        });
        self.snapshots.insert(name.to_string(), rx);
    }

    /// Register, attach and confirm.
    pub fn attached(&mut self, name: &str) {
        self.register(name);
        let _ = self.attach(name);
        self.inbound(ProtocolMessage::attached(name));
    }

    pub fn snapshot(&self, name: &str) -> ChannelSnapshot {
        self.snapshots[name].borrow().clone()
    }

    pub fn events(&mut self, name: &str) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatcher.handle(Command::Events {
            channel: name.to_string(),
            sender: tx,
        });
        rx
    }

    pub fn subscribe_all(&mut self, name: &str) -> Arc<Mutex<Vec<String>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        self.dispatcher.handle(Command::Subscribe {
            channel: name.to_string(),
            filter: None,
            listener: Arc::new(move |message: &Message| {
                sink.lock()
                    .unwrap()
                    .push(message.name.clone().unwrap_or_default())
            }),
        });
        received
    }

    pub fn attach(&mut self, name: &str) -> Completion<()> {
        let (reply, completion) = Completion::channel();
        self.dispatcher.handle(Command::Attach {
            channel: name.to_string(),
            reply,
        });
        completion
    }

    pub fn detach(&mut self, name: &str) -> Completion<()> {
        let (reply, completion) = Completion::channel();
        self.dispatcher.handle(Command::Detach {
            channel: name.to_string(),
            reply,
        });
        completion
    }

    pub fn publish(&mut self, name: &str, payload: Payload) -> Completion<()> {
        let (reply, completion) = Completion::channel();
        self.dispatcher.handle(Command::Publish {
            channel: name.to_string(),
            payload,
            reply,
        });
        completion
    }

    pub fn set_options(&mut self, name: &str, options: ChannelOptions) -> Completion<()> {
        let (reply, completion) = Completion::channel();
        self.dispatcher.handle(Command::SetOptions {
            channel: name.to_string(),
            options,
            local_only: false,
            reply: Some(reply),
        });
        completion
    }

    pub fn when_state(&mut self, name: &str, state: ChannelState) -> Completion<()> {
        let (reply, completion) = Completion::channel();
        self.dispatcher.handle(Command::WhenState {
            channel: name.to_string(),
            state,
            reply,
        });
        completion
    }

    pub fn inbound(&mut self, message: ProtocolMessage) {
        self.dispatcher.handle(Command::Inbound(message));
    }

    pub fn connection(&mut self, state: ConnectionState) {
        self.dispatcher.handle(Command::ConnectionState(state));
    }

    pub fn fire(&mut self, timer: &Scheduled) {
        self.dispatcher.handle(Command::TimerFired {
            channel: timer.channel.clone(),
            token: timer.token,
        });
    }
}
