//! Channel registry: get-or-create channel handles by name.

use std::sync::Arc;

use dashmap::DashMap;
use realtime_protocol::ErrorInfo;
use tokio::sync::{mpsc, watch};

use crate::handle::RealtimeChannel;
use crate::options::ChannelOptions;
use crate::state::ChannelSnapshot;
use crate::worker::Command;

/// The channels of one client, keyed by name.
#[derive(Clone)]
pub struct Channels {
    channels: Arc<DashMap<String, RealtimeChannel>>,
    commands: mpsc::UnboundedSender<Command>,
    client_id: Option<Arc<str>>,
}

impl Channels {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, client_id: Option<&str>) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            commands,
            client_id: client_id.map(Arc::from),
        }
    }

    /// Get the channel called `name`, creating it (initialized) if needed.
    pub fn get(&self, name: &str) -> RealtimeChannel {
        if let Some(channel) = self.channels.get(name).map(|entry| entry.value().clone()) {
            return channel;
        }

        self.channels
            .entry(name.to_string())
            .or_insert_with(|| self.create(name))
            .value()
            .clone()
    }

    /// Get the channel and apply `options` to it.
    ///
    /// Fails with a bad-request error, leaving the channel untouched, when
    /// the options are invalid or would require the channel to reattach. The
    /// channel's dispatcher makes that call after every operation queued
    /// before this one, so an attach still in flight counts.
    pub async fn get_with_options(
        &self,
        name: &str,
        options: ChannelOptions,
    ) -> Result<RealtimeChannel, ErrorInfo> {
        options.normalize()?;
        let channel = self.get(name);
        channel.apply_options_locally(options).await?;
        Ok(channel)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Names of all channels, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove a channel that is neither attached nor attaching.
    ///
    /// Outstanding operations on the released channel fail; existing handles
    /// stop working.
    pub fn release(&self, name: &str) -> Result<(), ErrorInfo> {
        let Some(channel) = self.channels.get(name).map(|entry| entry.value().clone()) else {
            return Ok(());
        };

        let state = channel.state();
        if state.is_attachment_live() {
            return Err(ErrorInfo::invalid_state(format!(
                "Unable to release channel {name}; channel state = {state}"
            )));
        }

        self.channels.remove(name);
        tracing::debug!("Released channel {}", name);
        channel.send(Command::Release {
            name: name.to_string(),
        })
    }

    fn create(&self, name: &str) -> RealtimeChannel {
        let (snapshot_tx, snapshot_rx) = watch::channel(ChannelSnapshot::default());
        if self
            .commands
            .send(Command::Register {
                name: name.to_string(),
                snapshot: snapshot_tx,
            })
            .is_err()
        {
            tracing::warn!("Channel {} created after the client closed", name);
        }
        RealtimeChannel::new(name, self.commands.clone(), snapshot_rx, self.client_id.clone())
    }
}

impl std::fmt::Debug for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channels").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChannelState;
    use futures::FutureExt;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_get_creates_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channels = Channels::new(tx, None);

        let first = channels.get("room");
        let second = channels.get("room");
        assert_eq!(first.name(), second.name());
        assert_eq!(first.state(), ChannelState::Initialized);
        assert!(channels.exists("room"));
        assert!(!channels.exists("lobby"));

        assert!(matches!(rx.try_recv(), Ok(Command::Register { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_names_sorted() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let channels = Channels::new(tx, None);
        channels.get("b");
        channels.get("a");
        assert_eq!(channels.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_get_with_invalid_options() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let channels = Channels::new(tx, None);
        let options = ChannelOptions::new().with_param("modes", "nope");
        let error = channels
            .get_with_options("room", options)
            .now_or_never()
            .unwrap()
            .unwrap_err();
        assert_eq!(error.code, realtime_protocol::codes::BAD_REQUEST);
        assert!(!channels.exists("room"));
    }

    #[test]
    fn test_get_with_options_waits_for_dispatcher_verdict() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channels = Channels::new(tx, None);
        let options = ChannelOptions::new().with_param("delta", "vcdiff");
        let mut lookup = task::spawn(channels.get_with_options("room", options));
        assert_pending!(lookup.poll());

        assert!(matches!(rx.try_recv(), Ok(Command::Register { .. })));
        match rx.try_recv() {
            Ok(Command::SetOptions { reply: Some(reply), local_only: true, .. }) => {
                let refused = ErrorInfo::invalid_options("would reattach");
                crate::completion::resolve(reply, Err(refused));
            }
            _ => panic!("expected a local-only set options request"),
        }

        let error = assert_ready!(lookup.poll()).unwrap_err();
        assert_eq!(error.code, realtime_protocol::codes::BAD_REQUEST);
    }

    #[test]
    fn test_release_unattached_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channels = Channels::new(tx, None);
        channels.get("room");
        channels.release("room").unwrap();

        assert!(!channels.exists("room"));
        assert!(matches!(rx.try_recv(), Ok(Command::Register { .. })));
        assert!(matches!(rx.try_recv(), Ok(Command::Release { .. })));
    }
}
