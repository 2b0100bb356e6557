//! The per-channel record owned by the dispatcher.
//!
//! `ChannelRecord` holds the authoritative state of one channel. It is only
//! touched from the dispatcher task, so no locking is involved; application
//! code sees it through the snapshot published after every mutation.
//!
//! The behavior is split by concern:
//! - [`attachment`]: attach/detach requests, timers, server ATTACHED /
//!   DETACHED / ERROR and connection transitions
//! - [`negotiation`]: channel options changes
//! - [`messaging`]: publish, queue flushing and inbound delivery

mod attachment;
mod messaging;
mod negotiation;

use std::collections::BTreeMap;
use std::time::Duration;

use realtime_protocol::{ChannelMode, ErrorInfo, Message, PresenceMessage};
use tokio::sync::{mpsc, watch};

use crate::completion::{resolve, Responder};
use crate::dispatcher::ChannelContext;
use crate::options::{ChannelOptions, NormalizedOptions};
use crate::queue::OutboundQueue;
use crate::state::{ChannelEvent, ChannelSnapshot, ChannelState, ChannelStateChange};
use crate::subscriptions::Subscriptions;
use crate::timers::{ArmedTimer, TimerKind};

pub(crate) struct ChannelRecord {
    name: String,
    state: ChannelState,
    error_reason: Option<ErrorInfo>,

    /// Options in force, as requested and normalized
    options: ChannelOptions,
    normalized: NormalizedOptions,
    /// Options sent with an ATTACH from an attached channel, applied on ATTACHED
    pending_options: Option<(ChannelOptions, NormalizedOptions)>,

    /// Granted by the last ATTACHED
    params: BTreeMap<String, String>,
    modes: Vec<ChannelMode>,

    attach_replies: Vec<Responder<()>>,
    detach_replies: Vec<Responder<()>>,
    options_replies: Vec<Responder<()>>,
    state_waiters: Vec<(ChannelState, Responder<()>)>,

    timer: Option<ArmedTimer>,
    /// ATTACH must be sent once the connection is connected
    awaiting_connection: bool,

    queue: OutboundQueue,
    messages: Subscriptions<Message>,
    presence: Subscriptions<PresenceMessage>,
    event_streams: Vec<mpsc::UnboundedSender<ChannelEvent>>,
    snapshot: watch::Sender<ChannelSnapshot>,
}

impl ChannelRecord {
    pub fn new(name: impl Into<String>, snapshot: watch::Sender<ChannelSnapshot>) -> Self {
        Self {
            name: name.into(),
            state: ChannelState::Initialized,
            error_reason: None,
            options: ChannelOptions::default(),
            normalized: NormalizedOptions::default(),
            pending_options: None,
            params: BTreeMap::new(),
            modes: ChannelMode::defaults(),
            attach_replies: Vec::new(),
            detach_replies: Vec::new(),
            options_replies: Vec::new(),
            state_waiters: Vec::new(),
            timer: None,
            awaiting_connection: false,
            queue: OutboundQueue::default(),
            messages: Subscriptions::default(),
            presence: Subscriptions::default(),
            event_streams: Vec::new(),
            snapshot,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Resolve `reply` once the channel is in `target`.
    pub fn when_state(&mut self, target: ChannelState, reply: Responder<()>) {
        if self.state == target {
            resolve(reply, Ok(()));
        } else {
            self.state_waiters.push((target, reply));
        }
    }

    pub fn add_event_stream(&mut self, sender: mpsc::UnboundedSender<ChannelEvent>) {
        self.event_streams.push(sender);
    }

    /// Fail everything outstanding; the record is about to be dropped.
    pub fn discard(&mut self, ctx: &mut ChannelContext, error: &ErrorInfo) {
        self.clear_timer(ctx);
        self.pending_options = None;
        fail_all(&mut self.attach_replies, error);
        fail_all(&mut self.detach_replies, error);
        fail_all(&mut self.options_replies, error);
        for (_, reply) in self.state_waiters.drain(..) {
            resolve(reply, Err(error.clone()));
        }
        self.queue.fail_all(error);
        self.event_streams.clear();
    }

    /// Move to `to`, running the side effects of entering that state.
    ///
    /// The snapshot is republished and the event emitted before any
    /// completion is resolved, so a resumed caller sees the new state.
    pub(crate) fn transition(
        &mut self,
        ctx: &mut ChannelContext,
        to: ChannelState,
        reason: Option<ErrorInfo>,
        resumed: bool,
    ) {
        self.clear_timer(ctx);
        self.awaiting_connection = false;

        let previous = self.state;
        self.state = to;
        match &reason {
            Some(error) => self.error_reason = Some(error.clone()),
            None if to == ChannelState::Attached => self.error_reason = None,
            None => {}
        }

        match &reason {
            Some(error) => tracing::debug!("Channel {}: {} -> {} ({})", self.name, previous, to, error),
            None => tracing::debug!("Channel {}: {} -> {}", self.name, previous, to),
        }

        self.publish_snapshot();
        self.emit(ChannelEvent::StateChange(ChannelStateChange {
            previous,
            current: to,
            reason: reason.clone(),
            resumed,
        }));
        self.resolve_state_waiters();

        match to {
            ChannelState::Initialized => {}
            ChannelState::Attaching => {
                let error = ErrorInfo::operation_failed(
                    "Detach request superseded by a subsequent attach request",
                );
                fail_all(&mut self.detach_replies, &error);
            }
            ChannelState::Attached => {
                for reply in self.attach_replies.drain(..) {
                    resolve(reply, Ok(()));
                }
                self.flush_queue(ctx);
                for reply in self.options_replies.drain(..) {
                    resolve(reply, Ok(()));
                }
            }
            ChannelState::Detaching => {
                let error = ErrorInfo::operation_failed(
                    "Attach request superseded by a subsequent detach request",
                );
                fail_all(&mut self.attach_replies, &error);
                self.abandon_options(&error);
            }
            ChannelState::Detached => {
                let error = reason.unwrap_or_else(|| ErrorInfo::invalid_state("Channel detached"));
                fail_all(&mut self.attach_replies, &error);
                for reply in self.detach_replies.drain(..) {
                    resolve(reply, Ok(()));
                }
                self.abandon_options(&error);
                self.fail_queue(&error);
            }
            ChannelState::Suspended => {
                let error = reason.unwrap_or_else(ErrorInfo::connection_suspended);
                fail_all(&mut self.attach_replies, &error);
                self.abandon_options(&error);
            }
            ChannelState::Failed => {
                let error = reason.unwrap_or_else(|| ErrorInfo::server_error("Channel failed"));
                fail_all(&mut self.attach_replies, &error);
                fail_all(&mut self.detach_replies, &error);
                self.abandon_options(&error);
                self.fail_queue(&error);
            }
        }
    }

    /// Attached self-transition: the server re-confirmed the attachment.
    fn emit_update(&mut self, reason: Option<ErrorInfo>, resumed: bool) {
        if let Some(error) = &reason {
            self.error_reason = Some(error.clone());
        }
        tracing::debug!(
            "Channel {}: update (resumed: {}, error: {:?})",
            self.name,
            resumed,
            reason.as_ref().map(|e| e.code)
        );

        self.publish_snapshot();
        self.emit(ChannelEvent::Update(ChannelStateChange {
            previous: self.state,
            current: self.state,
            reason,
            resumed,
        }));
        for reply in self.options_replies.drain(..) {
            resolve(reply, Ok(()));
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(ChannelSnapshot {
            state: self.state,
            error_reason: self.error_reason.clone(),
            params: self.params.clone(),
            modes: self.modes.clone(),
            options: self.options.clone(),
        });
    }

    fn emit(&mut self, event: ChannelEvent) {
        self.event_streams.retain(|stream| stream.send(event.clone()).is_ok());
    }

    fn resolve_state_waiters(&mut self) {
        let state = self.state;
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state_waiters)
            .into_iter()
            .partition(|(target, _)| *target == state);
        self.state_waiters = waiting;
        for (_, reply) in ready {
            resolve(reply, Ok(()));
        }
    }

    fn abandon_options(&mut self, error: &ErrorInfo) {
        self.pending_options = None;
        fail_all(&mut self.options_replies, error);
    }

    fn fail_queue(&mut self, error: &ErrorInfo) {
        let failed = self.queue.fail_all(error);
        if failed > 0 {
            tracing::debug!("Channel {}: failed {} queued publishes", self.name, failed);
        }
    }

    fn arm_timer(&mut self, ctx: &mut ChannelContext, kind: TimerKind, delay: Duration) {
        self.clear_timer(ctx);
        let token = ctx.schedule(&self.name, delay);
        self.timer = Some(ArmedTimer { token, kind });
    }

    fn clear_timer(&mut self, ctx: &mut ChannelContext) {
        if let Some(timer) = self.timer.take() {
            ctx.cancel(timer.token);
        }
    }
}

fn fail_all(replies: &mut Vec<Responder<()>>, error: &ErrorInfo) {
    for reply in replies.drain(..) {
        resolve(reply, Err(error.clone()));
    }
}
