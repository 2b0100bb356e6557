//! Publish path and inbound message delivery.

use realtime_protocol::{ErrorInfo, Message, PresenceMessage, ProtocolMessage};

use super::ChannelRecord;
use crate::completion::{resolve, Responder};
use crate::dispatcher::ChannelContext;
use crate::queue::Payload;
use crate::state::ChannelState;
use crate::subscriptions::Listener;

impl ChannelRecord {
    /// Send now when attached, otherwise queue (and attach) or refuse.
    pub fn publish(&mut self, ctx: &mut ChannelContext, payload: Payload, reply: Responder<()>) {
        match self.state {
            ChannelState::Attached => self.send_publish(ctx, payload, reply),
            ChannelState::Failed => {
                let error = self
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| ErrorInfo::invalid_state("Unable to publish; channel state = failed"));
                resolve(reply, Err(error));
            }
            ChannelState::Detaching => resolve(
                reply,
                Err(ErrorInfo::invalid_state("Unable to publish; channel state = detaching")),
            ),
            ChannelState::Initialized
            | ChannelState::Detached
            | ChannelState::Attaching
            | ChannelState::Suspended => {
                if !ctx.options.queue_messages {
                    resolve(
                        reply,
                        Err(ErrorInfo::invalid_state(
                            "Cannot publish messages while channel is not attached",
                        )),
                    );
                    return;
                }
                if !ctx.connection.can_attach() {
                    resolve(reply, Err(ctx.connection.error()));
                    return;
                }

                self.queue.push(payload, reply);
                tracing::debug!(
                    "Channel {}: queued publish ({} waiting, state {})",
                    self.name,
                    self.queue.len(),
                    self.state
                );
                if matches!(self.state, ChannelState::Initialized | ChannelState::Detached) {
                    self.attach(ctx, None);
                }
            }
        }
    }

    fn send_publish(&mut self, ctx: &mut ChannelContext, payload: Payload, reply: Responder<()>) {
        let serial = ctx.acks.next_serial();
        let message = payload.into_protocol_message(&self.name, serial);
        match ctx.send(message) {
            Ok(()) => ctx.acks.track(serial, reply),
            Err(error) => resolve(reply, Err(ErrorInfo::from(&error))),
        }
    }

    /// Send every queued publish, oldest first.
    pub(super) fn flush_queue(&mut self, ctx: &mut ChannelContext) {
        if self.queue.is_empty() {
            return;
        }
        let queued: Vec<_> = self.queue.drain().collect();
        tracing::debug!("Channel {}: flushing {} queued publishes", self.name, queued.len());
        for entry in queued {
            self.send_publish(ctx, entry.payload, entry.reply);
        }
    }

    pub fn subscribe(&mut self, filter: Option<String>, listener: Listener<Message>) {
        self.messages.add(filter, listener);
    }

    pub fn unsubscribe(&mut self, filter: Option<&str>, listener: Option<&Listener<Message>>) {
        let removed = self.messages.remove(filter, listener);
        tracing::debug!(
            "Channel {}: removed {} message listeners, {} left",
            self.name,
            removed,
            self.messages.len()
        );
    }

    pub fn subscribe_presence(&mut self, filter: Option<String>, listener: Listener<PresenceMessage>) {
        self.presence.add(filter, listener);
    }

    pub fn unsubscribe_presence(
        &mut self,
        filter: Option<&str>,
        listener: Option<&Listener<PresenceMessage>>,
    ) {
        let removed = self.presence.remove(filter, listener);
        tracing::debug!(
            "Channel {}: removed {} presence listeners, {} left",
            self.name,
            removed,
            self.presence.len()
        );
    }

    /// Deliver inbound MESSAGE contents; dropped unless attached.
    pub fn on_message(&mut self, message: ProtocolMessage) {
        if self.state != ChannelState::Attached {
            tracing::debug!(
                "Channel {}: dropping {} messages received while {}",
                self.name,
                message.messages.len(),
                self.state
            );
            return;
        }
        for item in &message.messages {
            self.messages.dispatch(item.name.as_deref(), item);
        }
    }

    /// Deliver inbound PRESENCE contents, keyed by action name.
    pub fn on_presence(&mut self, message: ProtocolMessage) {
        if self.state != ChannelState::Attached {
            tracing::debug!(
                "Channel {}: dropping {} presence events received while {}",
                self.name,
                message.presence.len(),
                self.state
            );
            return;
        }
        for item in &message.presence {
            self.presence.dispatch(Some(item.action.as_str()), item);
        }
    }
}
