//! Realtime client: owns the dispatcher task and the channel registry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientOptions;
use crate::dispatcher::Dispatcher;
use crate::error::{RealtimeError, Result};
use crate::registry::Channels;
use crate::timers::TokioScheduler;
use crate::transport::{Transport, TransportSink};
use crate::worker::{spawn_dispatcher, Command};

/// Channel side of a realtime client
///
/// The connection itself lives behind the [`Transport`]; the client routes
/// inbound traffic (fed through a [`TransportSink`]) to its channels.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use realtime_channels::{ClientOptions, RealtimeClient};
///
/// let client = RealtimeClient::new(Arc::new(my_transport), ClientOptions::default())?;
/// let sink = client.transport_sink(); // hand this to the connection
///
/// let channel = client.channels().get("room");
/// channel.attach().await?;
/// channel.publish(Some("greeting"), Some(serde_json::json!("hello"))).await?;
/// ```
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    channels: Channels,
    options: ClientOptions,
    worker: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    /// Create a client and start its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Result<Self> {
        options.validate()?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(commands.clone());
        let dispatcher = Dispatcher::new(transport, Box::new(scheduler), options.clone());
        let worker = spawn_dispatcher(dispatcher, receiver);

        tracing::debug!(
            "Realtime client created (client_id: {:?})",
            options.client_id
        );

        Ok(Self {
            channels: Channels::new(commands.clone(), options.client_id.as_deref()),
            commands,
            options,
            worker: Some(worker),
        })
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Entry point for the connection to feed inbound messages and
    /// connection state changes.
    pub fn transport_sink(&self) -> TransportSink {
        TransportSink::new(self.commands.clone())
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Stop the dispatcher, failing every outstanding operation, and wait
    /// for it to finish.
    pub async fn close(mut self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        match self.worker.take() {
            Some(worker) => worker.await.map_err(RealtimeError::from),
            None => Ok(()),
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if self.worker.is_some() {
            tracing::debug!(
                "RealtimeClient dropping, {} channels",
                self.channels.names().len()
            );
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("channels", &self.channels)
            .field("options", &self.options)
            .finish()
    }
}
