//! Subscriber setup for binaries embedding the realtime client
//!
//! The crate only emits `tracing` events. Applications that already install a
//! subscriber can ignore this module.
//!
//! Environment variables:
//!
//! - `REALTIME_LOG_MODE`: `silent` (default), `development`, `debug` or `json`
//! - `REALTIME_LOG_LEVEL`: filter directives, e.g. `realtime_channels=trace`
//! - `RUST_LOG`: filter used when `REALTIME_LOG_LEVEL` is unset

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const MODE_VAR: &str = "REALTIME_LOG_MODE";
const LEVEL_VAR: &str = "REALTIME_LOG_LEVEL";

/// Output style of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Install nothing
    Silent,
    /// Compact single-line output
    Development,
    /// Channel internals at debug level, with source locations
    Debug,
    /// One JSON object per event, for log collectors
    Json,
}

impl LoggingMode {
    fn default_directives(self) -> &'static str {
        match self {
            LoggingMode::Silent => "off",
            LoggingMode::Development => "realtime_channels=info",
            LoggingMode::Debug => "realtime_channels=debug,realtime_protocol=debug",
            LoggingMode::Json => "info",
        }
    }
}

impl FromStr for LoggingMode {
    type Err = LoggingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(LoggingMode::Silent),
            "development" | "dev" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            "json" => Ok(LoggingMode::Json),
            _ => Err(LoggingError::InvalidEnv(format!("{MODE_VAR}={value}"))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid logging environment: {0}")]
    InvalidEnv(String),
}

/// Install a global subscriber for `mode`.
///
/// ```rust,ignore
/// realtime_channels::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let output = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => fmt::layer().with_target(false).compact().boxed(),
        LoggingMode::Debug => fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed(),
        LoggingMode::Json => fmt::layer().json().with_current_span(false).boxed(),
    };
    let filter = env_filter(mode.default_directives())?;

    Registry::default()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Install a subscriber chosen by `REALTIME_LOG_MODE`; unset means silent.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var(MODE_VAR) {
        Ok(value) => value.parse()?,
        Err(_) => LoggingMode::Silent,
    };
    init_logging(mode)
}

fn env_filter(default_directives: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var(LEVEL_VAR)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_directives.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidEnv(format!("{directives}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_silent_installs_nothing() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[rstest]
    #[case("silent", LoggingMode::Silent)]
    #[case("Development", LoggingMode::Development)]
    #[case(" debug ", LoggingMode::Debug)]
    #[case("json", LoggingMode::Json)]
    fn test_mode_from_str(#[case] value: &str, #[case] expected: LoggingMode) {
        assert_eq!(value.parse::<LoggingMode>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let error = "loud".parse::<LoggingMode>().unwrap_err();
        assert!(matches!(error, LoggingError::InvalidEnv(_)));
        assert!(error.to_string().contains("REALTIME_LOG_MODE=loud"));
    }
}
