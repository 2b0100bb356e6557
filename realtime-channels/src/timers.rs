//! Channel timers: attach/detach timeouts and the suspended retry.
//!
//! The dispatcher never sleeps itself. It asks a [`Scheduler`] to deliver a
//! `TimerFired` command later and matches the token on arrival; a token that
//! is no longer armed is ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::worker::Command;

/// Identifies one arming of a timer.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub(crate) struct TimerToken(pub u64);

/// What an armed timer is waiting for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum TimerKind {
    /// ATTACH sent, waiting for ATTACHED
    AttachTimeout,
    /// DETACH sent, waiting for DETACHED
    DetachTimeout,
    /// Suspended, waiting to try attaching again
    RetryAttach,
    /// Options reattach sent from an attached channel
    OptionsTimeout,
}

/// The single timer a channel may have armed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct ArmedTimer {
    pub token: TimerToken,
    pub kind: TimerKind,
}

/// Source of delayed `TimerFired` commands.
pub(crate) trait Scheduler: Send {
    fn schedule(&mut self, channel: &str, token: TimerToken, delay: Duration);
    fn cancel(&mut self, token: TimerToken);
}

/// Scheduler backed by tokio sleeps.
pub(crate) struct TokioScheduler {
    commands: mpsc::UnboundedSender<Command>,
    handles: HashMap<TimerToken, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            handles: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, channel: &str, token: TimerToken, delay: Duration) {
        let commands = self.commands.clone();
        let channel = channel.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::TimerFired { channel, token });
        });
        self.handles.insert(token, handle);
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.handles.remove(&token) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
