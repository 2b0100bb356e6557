//! Configuration types for the realtime-channels crate
//!
//! `ClientOptions` controls the timing of the attachment controller and the
//! publish queueing policy shared by every channel of a client.

use std::time::Duration;

/// Configuration for a [`RealtimeClient`](crate::RealtimeClient)
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait for the server to answer an ATTACH or DETACH
    /// Default: 10 seconds
    pub realtime_request_timeout: Duration,

    /// Interval between reattach attempts while a channel is suspended
    /// Default: 15 seconds
    pub channel_retry_timeout: Duration,

    /// Buffer publishes issued before the channel is attached
    /// Default: true
    pub queue_messages: bool,

    /// Client identity used for presence enter/update/leave
    /// Default: None
    pub client_id: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            realtime_request_timeout: Duration::from_secs(10),
            channel_retry_timeout: Duration::from_secs(15),
            queue_messages: true,
            client_id: None,
        }
    }
}

impl ClientOptions {
    /// Create a new ClientOptions with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ClientOptions with short timeouts, for flaky links and tests
    pub fn fast_retry() -> Self {
        Self {
            realtime_request_timeout: Duration::from_secs(2),
            channel_retry_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), crate::RealtimeError> {
        if self.realtime_request_timeout == Duration::ZERO {
            return Err(crate::RealtimeError::Configuration(
                "Realtime request timeout must be greater than 0".to_string(),
            ));
        }

        if self.channel_retry_timeout == Duration::ZERO {
            return Err(crate::RealtimeError::Configuration(
                "Channel retry timeout must be greater than 0".to_string(),
            ));
        }

        if matches!(self.client_id.as_deref(), Some("")) {
            return Err(crate::RealtimeError::Configuration(
                "Client id must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the request timeout
    pub fn with_realtime_request_timeout(mut self, timeout: Duration) -> Self {
        self.realtime_request_timeout = timeout;
        self
    }

    /// Builder method to set the suspended-channel retry interval
    pub fn with_channel_retry_timeout(mut self, timeout: Duration) -> Self {
        self.channel_retry_timeout = timeout;
        self
    }

    /// Builder method to enable or disable publish queueing
    pub fn with_queue_messages(mut self, queue: bool) -> Self {
        self.queue_messages = queue;
        self
    }

    /// Builder method to set the client id
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}
