//! Attachment controller: drives ATTACH/DETACH, their timers and the
//! channel's reaction to server responses and connection transitions.

use realtime_protocol::{ChannelMode, ErrorInfo, ProtocolMessage};

use super::ChannelRecord;
use crate::completion::{resolve, Responder};
use crate::dispatcher::ChannelContext;
use crate::state::ChannelState;
use crate::timers::{TimerKind, TimerToken};
use crate::transport::ConnectionState;

impl ChannelRecord {
    /// Application attach request. Concurrent requests share one ATTACH.
    pub fn attach(&mut self, ctx: &mut ChannelContext, reply: Option<Responder<()>>) {
        match self.state {
            ChannelState::Attached => {
                if let Some(reply) = reply {
                    resolve(reply, Ok(()));
                }
            }
            ChannelState::Attaching => self.attach_replies.extend(reply),
            _ => {
                if !ctx.connection.can_attach() {
                    tracing::debug!(
                        "Channel {}: attach rejected, connection is {}",
                        self.name,
                        ctx.connection
                    );
                    if let Some(reply) = reply {
                        resolve(reply, Err(ctx.connection.error()));
                    }
                    return;
                }
                self.attach_replies.extend(reply);
                self.start_attach(ctx, None);
            }
        }
    }

    /// Application detach request.
    pub fn detach(&mut self, ctx: &mut ChannelContext, reply: Responder<()>) {
        match self.state {
            ChannelState::Initialized | ChannelState::Detached => resolve(reply, Ok(())),
            ChannelState::Failed => resolve(
                reply,
                Err(ErrorInfo::invalid_state("Unable to detach; channel state = failed")),
            ),
            ChannelState::Detaching => self.detach_replies.push(reply),
            ChannelState::Suspended => {
                self.detach_replies.push(reply);
                self.transition(ctx, ChannelState::Detached, None, false);
            }
            ChannelState::Attaching | ChannelState::Attached => {
                self.detach_replies.push(reply);
                if !ctx.connection.is_connected() {
                    // nothing to tell the server while the connection is down
                    self.transition(ctx, ChannelState::Detached, None, false);
                    return;
                }
                self.transition(ctx, ChannelState::Detaching, None, false);
                // a failed send is settled by the detach timeout armed below
                let _ = ctx.send(ProtocolMessage::detach(&self.name));
                let timeout = ctx.options.realtime_request_timeout;
                self.arm_timer(ctx, TimerKind::DetachTimeout, timeout);
            }
        }
    }

    /// Enter attaching, send ATTACH (or wait for the connection) and arm the
    /// attach timeout.
    pub(super) fn start_attach(&mut self, ctx: &mut ChannelContext, reason: Option<ErrorInfo>) {
        self.transition(ctx, ChannelState::Attaching, reason, false);
        self.send_attach(ctx);
        let timeout = ctx.options.realtime_request_timeout;
        self.arm_timer(ctx, TimerKind::AttachTimeout, timeout);
    }

    /// Send ATTACH with the newest requested options, or defer it until the
    /// connection is connected. A lost send is settled by the armed timer.
    pub(super) fn send_attach(&mut self, ctx: &mut ChannelContext) {
        if !ctx.connection.is_connected() {
            tracing::debug!(
                "Channel {}: connection is {}, ATTACH deferred",
                self.name,
                ctx.connection
            );
            self.awaiting_connection = true;
            return;
        }

        self.awaiting_connection = false;
        let normalized = self
            .pending_options
            .as_ref()
            .map(|(_, normalized)| normalized)
            .unwrap_or(&self.normalized);
        let message = ProtocolMessage::attach(
            self.name.as_str(),
            normalized.params.clone(),
            normalized.request_modes().map(<[ChannelMode]>::to_vec),
        );
        // logged by the context; the armed timeout settles a lost ATTACH
        let _ = ctx.send(message);
    }

    /// Arm the suspended retry, only while the connection can carry it.
    fn schedule_retry(&mut self, ctx: &mut ChannelContext) {
        if ctx.connection.is_connected() {
            let delay = ctx.options.channel_retry_timeout;
            tracing::debug!("Channel {}: retrying attach in {:?}", self.name, delay);
            self.arm_timer(ctx, TimerKind::RetryAttach, delay);
        }
    }

    pub fn on_timer(&mut self, ctx: &mut ChannelContext, token: TimerToken) {
        let timer = match self.timer {
            Some(timer) if timer.token == token => timer,
            _ => {
                tracing::debug!("Channel {}: ignoring stale timer {:?}", self.name, token);
                return;
            }
        };
        self.clear_timer(ctx);

        match (timer.kind, self.state) {
            (TimerKind::AttachTimeout, ChannelState::Attaching) => {
                self.transition(
                    ctx,
                    ChannelState::Suspended,
                    Some(ErrorInfo::timeout("Channel attach")),
                    false,
                );
                self.schedule_retry(ctx);
            }
            (TimerKind::DetachTimeout, ChannelState::Detaching) => {
                self.transition(
                    ctx,
                    ChannelState::Detached,
                    Some(ErrorInfo::timeout("Channel detach")),
                    false,
                );
            }
            (TimerKind::RetryAttach, ChannelState::Suspended) => self.start_attach(ctx, None),
            (TimerKind::OptionsTimeout, ChannelState::Attached) => {
                tracing::debug!("Channel {}: options update timed out", self.name);
                self.abandon_options(&ErrorInfo::timeout("Channel options update"));
            }
            (kind, state) => {
                tracing::debug!("Channel {}: {:?} no longer applies in state {}", self.name, kind, state);
            }
        }
    }

    pub fn on_attached(&mut self, ctx: &mut ChannelContext, message: ProtocolMessage) {
        let resumed = message.is_resumed();
        match self.state {
            ChannelState::Attaching | ChannelState::Suspended => {
                self.apply_attached(&message);
                self.transition(ctx, ChannelState::Attached, message.error, resumed);
            }
            ChannelState::Attached => {
                let options_pending =
                    self.pending_options.is_some() || !self.options_replies.is_empty();
                self.apply_attached(&message);
                if !resumed || message.error.is_some() || options_pending {
                    self.clear_timer(ctx);
                    self.emit_update(message.error, resumed);
                }
            }
            ChannelState::Detaching => {
                tracing::debug!("Channel {}: ATTACHED while detaching, re-sending DETACH", self.name);
                // the detach timeout is still armed
                let _ = ctx.send(ProtocolMessage::detach(&self.name));
            }
            state => {
                tracing::debug!("Channel {}: ignoring ATTACHED in state {}", self.name, state);
            }
        }
    }

    /// Record what the server granted, falling back to what was requested.
    fn apply_attached(&mut self, message: &ProtocolMessage) {
        if let Some((options, normalized)) = self.pending_options.take() {
            self.options = options;
            self.normalized = normalized;
        }
        self.params = message
            .params
            .clone()
            .or_else(|| self.normalized.params.clone())
            .unwrap_or_default();
        self.modes = message
            .modes
            .clone()
            .or_else(|| self.normalized.request_modes().map(<[ChannelMode]>::to_vec))
            .unwrap_or_else(ChannelMode::defaults);
    }

    pub fn on_detached(&mut self, ctx: &mut ChannelContext, message: ProtocolMessage) {
        match self.state {
            ChannelState::Detaching => {
                self.transition(ctx, ChannelState::Detached, message.error, false);
            }
            ChannelState::Attached => {
                let reason = message
                    .error
                    .unwrap_or_else(|| ErrorInfo::server_error("Channel detached by the server"));
                tracing::debug!("Channel {}: detached by the server, reattaching", self.name);
                self.start_attach(ctx, Some(reason));
            }
            ChannelState::Attaching => {
                let reason = message
                    .error
                    .unwrap_or_else(|| ErrorInfo::server_error("Attach rejected by the server"));
                self.transition(ctx, ChannelState::Suspended, Some(reason), false);
                self.schedule_retry(ctx);
            }
            state => {
                tracing::debug!("Channel {}: ignoring DETACHED in state {}", self.name, state);
            }
        }
    }

    /// Channel-scoped ERROR: fatal until the application attaches again.
    pub fn on_error(&mut self, ctx: &mut ChannelContext, message: ProtocolMessage) {
        if self.state == ChannelState::Failed {
            tracing::debug!("Channel {}: ignoring ERROR, already failed", self.name);
            return;
        }
        let reason = message
            .error
            .unwrap_or_else(|| ErrorInfo::server_error("Channel error"));
        self.transition(ctx, ChannelState::Failed, Some(reason), false);
    }

    /// React to a connection transition. `ctx.connection` already holds `connection`.
    pub fn on_connection_state(&mut self, ctx: &mut ChannelContext, connection: ConnectionState) {
        match connection {
            ConnectionState::Connected => {
                if self.awaiting_connection {
                    self.send_attach(ctx);
                } else if self.state == ChannelState::Suspended {
                    self.start_attach(ctx, None);
                }
            }
            ConnectionState::Connecting => {
                if self.state == ChannelState::Suspended {
                    self.start_attach(ctx, None);
                }
            }
            ConnectionState::Disconnected => match self.state {
                ChannelState::Suspended => self.clear_timer(ctx),
                ChannelState::Attaching => self.awaiting_connection = true,
                ChannelState::Attached if self.pending_options.is_some() => {
                    self.awaiting_connection = true
                }
                _ => {}
            },
            ConnectionState::Suspended => match self.state {
                ChannelState::Attaching | ChannelState::Attached => self.transition(
                    ctx,
                    ChannelState::Suspended,
                    Some(ErrorInfo::connection_suspended()),
                    false,
                ),
                ChannelState::Detaching => {
                    self.transition(ctx, ChannelState::Detached, None, false)
                }
                ChannelState::Suspended => self.clear_timer(ctx),
                _ => {}
            },
            ConnectionState::Closed => {
                if self.holds_connection_resources() {
                    self.transition(
                        ctx,
                        ChannelState::Detached,
                        Some(ErrorInfo::connection_closed()),
                        false,
                    );
                }
            }
            ConnectionState::Failed => {
                if self.holds_connection_resources() {
                    self.transition(
                        ctx,
                        ChannelState::Failed,
                        Some(ErrorInfo::connection_failed()),
                        false,
                    );
                }
            }
            ConnectionState::Initialized | ConnectionState::Closing => {}
        }
    }

    fn holds_connection_resources(&self) -> bool {
        matches!(
            self.state,
            ChannelState::Attaching
                | ChannelState::Attached
                | ChannelState::Suspended
                | ChannelState::Detaching
        )
    }
}
