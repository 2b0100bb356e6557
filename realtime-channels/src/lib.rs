//! # realtime-channels
//!
//! The channel subsystem of a realtime publish/subscribe client: named
//! channels with an attach/detach lifecycle, options negotiation with the
//! server, message and presence publishing with acknowledgements, and
//! listener-based subscriptions.
//!
//! # Architecture
//!
//! ```text
//! RealtimeChannel ─┐
//! TransportSink ───┼─ Command queue ─→ Dispatcher task ─→ Transport
//! Timers ──────────┘                   (channel records)
//! ```
//!
//! Every channel handle is a cheap view over a record owned by a single
//! dispatcher task. Operations return a [`Completion`]; reads come from a
//! snapshot the dispatcher publishes before resolving anything, so a handle
//! observes the new state as soon as its completion resolves.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use realtime_channels::{ChannelOptions, ChannelMode, ClientOptions, RealtimeClient};
//!
//! let client = RealtimeClient::new(transport, ClientOptions::default())?;
//! let connection_sink = client.transport_sink();
//!
//! let channel = client.channels().get("updates");
//! channel
//!     .subscribe(None, Arc::new(|message| println!("{:?}", message.data)))
//!     .await?;
//!
//! channel
//!     .set_options(ChannelOptions::new().with_modes(vec![ChannelMode::Subscribe]))
//!     .await?;
//! ```

mod channel;
mod client;
pub mod completion;
pub mod config;
mod dispatcher;
pub mod error;
pub mod handle;
pub mod logging;
pub mod options;
pub mod presence;
mod queue;
pub mod registry;
pub mod state;
mod subscriptions;
mod timers;
pub mod transport;
mod worker;

#[cfg(test)]
mod testing;

pub use client::RealtimeClient;
pub use completion::Completion;
pub use config::ClientOptions;
pub use error::{RealtimeError, Result};
pub use handle::{is_valid_channel_name, ChannelEvents, MessageListener, RealtimeChannel};
pub use options::{ChannelOptions, NormalizedOptions};
pub use presence::{PresenceListener, RealtimePresence};
pub use registry::Channels;
pub use state::{ChannelEvent, ChannelSnapshot, ChannelState, ChannelStateChange};
pub use subscriptions::Listener;
pub use transport::{ConnectionState, Transport, TransportError, TransportSink};

// Protocol types that appear in this crate's API
pub use realtime_protocol::{
    codes, Action, ChannelMode, ErrorInfo, Message, PresenceAction, PresenceMessage,
    ProtocolMessage,
};
