//! Routing of commands to channel records.
//!
//! The `Dispatcher` owns every channel record plus the state they share
//! (transport, timers, connection state, acknowledgement tracking). It is
//! driven by the worker task, and directly by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use realtime_protocol::{Action, ErrorInfo, ProtocolMessage};

use crate::channel::ChannelRecord;
use crate::completion::{client_closed, resolve, Responder};
use crate::config::ClientOptions;
use crate::timers::{Scheduler, TimerToken};
use crate::transport::{ConnectionState, Transport, TransportError};
use crate::worker::Command;

/// State shared by all channels of one client.
pub(crate) struct ChannelContext {
    transport: Arc<dyn Transport>,
    scheduler: Box<dyn Scheduler>,
    next_token: u64,
    pub options: ClientOptions,
    pub connection: ConnectionState,
    pub acks: crate::queue::PendingAcks,
}

impl ChannelContext {
    /// Send through the transport, logging failures.
    pub fn send(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        let action = message.action;
        let channel = message.channel.clone();
        self.transport.send(message).map_err(|e| {
            tracing::warn!("Failed to send {} on channel {}: {}", action, channel, e);
            e
        })
    }

    /// Arm a timer for `channel`, returning its token.
    pub fn schedule(&mut self, channel: &str, delay: Duration) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.scheduler.schedule(channel, token, delay);
        token
    }

    pub fn cancel(&mut self, token: TimerToken) {
        self.scheduler.cancel(token);
    }
}

pub(crate) struct Dispatcher {
    channels: HashMap<String, ChannelRecord>,
    ctx: ChannelContext,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
        options: ClientOptions,
    ) -> Self {
        let connection = transport.connection_state();
        Self {
            channels: HashMap::new(),
            ctx: ChannelContext {
                transport,
                scheduler,
                next_token: 0,
                options,
                connection,
                acks: Default::default(),
            },
        }
    }

    /// Process one command. Returns `false` once the dispatcher has shut down.
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Register { name, snapshot } => {
                tracing::debug!("Registering channel {}", name);
                self.channels
                    .entry(name.clone())
                    .or_insert_with(|| ChannelRecord::new(name, snapshot));
            }
            Command::Release { name } => {
                if let Some(mut record) = self.channels.remove(&name) {
                    tracing::debug!("Releasing channel {} in state {}", name, record.state());
                    record.discard(&mut self.ctx, &released(&name));
                }
            }
            Command::Attach { channel, reply } => {
                self.with_channel(&channel, Some(reply), |record, ctx, reply| {
                    record.attach(ctx, reply)
                });
            }
            Command::Detach { channel, reply } => {
                self.with_channel(&channel, Some(reply), |record, ctx, reply| {
                    if let Some(reply) = reply {
                        record.detach(ctx, reply);
                    }
                });
            }
            Command::SetOptions {
                channel,
                options,
                local_only,
                reply,
            } => {
                self.with_channel(&channel, reply, |record, ctx, reply| {
                    record.set_options(ctx, options, local_only, reply)
                });
            }
            Command::Publish {
                channel,
                payload,
                reply,
            } => {
                self.with_channel(&channel, Some(reply), |record, ctx, reply| {
                    if let Some(reply) = reply {
                        record.publish(ctx, payload, reply);
                    }
                });
            }
            Command::Subscribe {
                channel,
                filter,
                listener,
            } => {
                self.with_channel(&channel, None, |record, _, _| record.subscribe(filter, listener));
            }
            Command::Unsubscribe {
                channel,
                filter,
                listener,
            } => {
                self.with_channel(&channel, None, |record, _, _| {
                    record.unsubscribe(filter.as_deref(), listener.as_ref())
                });
            }
            Command::SubscribePresence {
                channel,
                filter,
                listener,
            } => {
                self.with_channel(&channel, None, |record, _, _| {
                    record.subscribe_presence(filter, listener)
                });
            }
            Command::UnsubscribePresence {
                channel,
                filter,
                listener,
            } => {
                self.with_channel(&channel, None, |record, _, _| {
                    record.unsubscribe_presence(filter.as_deref(), listener.as_ref())
                });
            }
            Command::WhenState {
                channel,
                state,
                reply,
            } => {
                self.with_channel(&channel, Some(reply), |record, _, reply| {
                    if let Some(reply) = reply {
                        record.when_state(state, reply);
                    }
                });
            }
            Command::Events { channel, sender } => {
                self.with_channel(&channel, None, |record, _, _| record.add_event_stream(sender));
            }
            Command::Inbound(message) => self.route_inbound(message),
            Command::ConnectionState(state) => self.connection_changed(state),
            Command::TimerFired { channel, token } => match self.channels.get_mut(&channel) {
                Some(record) => record.on_timer(&mut self.ctx, token),
                None => self.ctx.cancel(token),
            },
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Run `f` on the named record, or fail `reply` if it no longer exists.
    fn with_channel<F>(&mut self, name: &str, reply: Option<Responder<()>>, f: F)
    where
        F: FnOnce(&mut ChannelRecord, &mut ChannelContext, Option<Responder<()>>),
    {
        match self.channels.get_mut(name) {
            Some(record) => f(record, &mut self.ctx, reply),
            None => {
                tracing::debug!("Command for unknown channel {}", name);
                if let Some(reply) = reply {
                    resolve(reply, Err(released(name)));
                }
            }
        }
    }

    fn route_inbound(&mut self, message: ProtocolMessage) {
        match message.action {
            Action::Ack => {
                let settled = self
                    .ctx
                    .acks
                    .ack(message.msg_serial.unwrap_or_default(), message.count.unwrap_or(1));
                tracing::debug!("ACK settled {} publishes", settled);
                return;
            }
            Action::Nack => {
                let error = message
                    .error
                    .unwrap_or_else(|| ErrorInfo::server_error("Publish rejected by the server"));
                let settled = self.ctx.acks.nack(
                    message.msg_serial.unwrap_or_default(),
                    message.count.unwrap_or(1),
                    error,
                );
                tracing::debug!("NACK settled {} publishes", settled);
                return;
            }
            _ => {}
        }

        let Some(record) = self.channels.get_mut(&message.channel) else {
            tracing::debug!(
                "Dropping {} for unknown channel {:?}",
                message.action,
                message.channel
            );
            return;
        };

        match message.action {
            Action::Attached => record.on_attached(&mut self.ctx, message),
            Action::Detached => record.on_detached(&mut self.ctx, message),
            Action::Error => record.on_error(&mut self.ctx, message),
            Action::Message => record.on_message(message),
            Action::Presence => record.on_presence(message),
            other => tracing::debug!("Channel {}: ignoring {}", record.name(), other),
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        if state == self.ctx.connection {
            return;
        }
        tracing::debug!("Connection {} -> {}", self.ctx.connection, state);
        self.ctx.connection = state;

        for record in self.channels.values_mut() {
            record.on_connection_state(&mut self.ctx, state);
        }

        if matches!(state, ConnectionState::Closed | ConnectionState::Failed) {
            let failed = self.ctx.acks.fail_all(&state.error());
            if failed > 0 {
                tracing::debug!("Failed {} publishes awaiting acknowledgement", failed);
            }
        }
    }

    fn shutdown(&mut self) {
        let error = client_closed();
        for (_, mut record) in self.channels.drain() {
            record.discard(&mut self.ctx, &error);
        }
        self.ctx.acks.fail_all(&error);
    }
}

fn released(name: &str) -> ErrorInfo {
    ErrorInfo::invalid_state(format!("Channel {name} has been released"))
}
