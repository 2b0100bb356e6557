//! Options negotiator: applies channel options locally or through a reattach.

use realtime_protocol::ErrorInfo;

use super::ChannelRecord;
use crate::completion::{resolve, Responder};
use crate::dispatcher::ChannelContext;
use crate::options::{ChannelOptions, NormalizedOptions};
use crate::state::ChannelState;
use crate::timers::TimerKind;

/// Rejection message for registry lookups that would force a reattach.
pub(crate) const REATTACH_VIA_GET: &str = "Channels::get_with_options cannot change options in a way \
     that would reattach the channel; use RealtimeChannel::set_options instead";

/// Whether applying `requested` needs a server round trip.
///
/// Only a live attachment is renegotiated, only when the request names
/// server-visible fields, and only when their normalized form changes.
pub(crate) fn requires_reattach(
    state: ChannelState,
    current: &NormalizedOptions,
    requested: &ChannelOptions,
    normalized: &NormalizedOptions,
) -> bool {
    state.is_attachment_live() && requested.has_server_fields() && normalized != current
}

impl ChannelRecord {
    /// Apply new options.
    ///
    /// `local_only` requests (registry lookups) are refused when they would
    /// need a reattach. `reply` is `None` when the caller already got its answer.
    pub fn set_options(
        &mut self,
        ctx: &mut ChannelContext,
        options: ChannelOptions,
        local_only: bool,
        reply: Option<Responder<()>>,
    ) {
        let normalized = match options.normalize() {
            Ok(normalized) => normalized,
            Err(error) => {
                if let Some(reply) = reply {
                    resolve(reply, Err(error));
                }
                return;
            }
        };

        let current = self
            .pending_options
            .as_ref()
            .map(|(_, normalized)| normalized)
            .unwrap_or(&self.normalized);

        if !requires_reattach(self.state, current, &options, &normalized) {
            if let Some(pending) = self.pending_options.as_mut() {
                *pending = (options.clone(), normalized.clone());
            }
            self.options = options;
            self.normalized = normalized;
            self.publish_snapshot();
            if let Some(reply) = reply {
                resolve(reply, Ok(()));
            }
            return;
        }

        if local_only {
            tracing::debug!("Channel {}: {}", self.name, REATTACH_VIA_GET);
            if let Some(reply) = reply {
                resolve(reply, Err(ErrorInfo::invalid_options(REATTACH_VIA_GET)));
            }
            return;
        }

        tracing::debug!("Channel {}: options changed, reattaching", self.name);
        self.options_replies.extend(reply);
        let timeout = ctx.options.realtime_request_timeout;

        if self.state == ChannelState::Attaching {
            // no attachment to keep yet, so the new options apply straight away
            self.options = options;
            self.normalized = normalized;
            self.publish_snapshot();
            self.send_attach(ctx);
            self.arm_timer(ctx, TimerKind::AttachTimeout, timeout);
        } else {
            self.pending_options = Some((options, normalized));
            self.send_attach(ctx);
            self.arm_timer(ctx, TimerKind::OptionsTimeout, timeout);
        }
    }
}
