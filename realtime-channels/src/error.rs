//! Error types for the realtime-channels crate.
//!
//! Channel operations resolve with [`ErrorInfo`], the structured error the
//! server speaks. `RealtimeError` covers the client itself: configuration
//! problems and talking to a dispatcher that has already shut down.

use realtime_protocol::ErrorInfo;

/// Errors that can occur in the realtime client.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client's dispatcher is no longer running
    #[error("Realtime client is closed")]
    Closed,

    /// A channel operation failed
    #[error("Channel error: {0}")]
    Channel(#[from] ErrorInfo),

    /// The dispatcher task panicked or was cancelled
    #[error("Dispatcher task failed: {0}")]
    Dispatcher(#[from] tokio::task::JoinError),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

/// Convenience type alias for Results using RealtimeError
pub type Result<T> = std::result::Result<T, RealtimeError>;
