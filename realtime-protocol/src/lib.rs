//! # realtime-protocol
//!
//! Typed records for the realtime channel protocol: the protocol-message
//! envelope with its numeric actions, published and presence payloads, channel
//! modes, and the structured `ErrorInfo` with its error-code table.
//!
//! The records describe field sets only. Framing and payload encoding belong to
//! the transport; serde derives are provided so a transport (or a test) can
//! build records from their deserialized JSON form:
//!
//! ```rust
//! use realtime_protocol::{Action, ProtocolMessage};
//!
//! let message: ProtocolMessage = serde_json::from_value(serde_json::json!({
//!     "action": 13,
//!     "channel": "updates",
//!     "error": {"code": 50000, "statusCode": 500, "message": "generic serverside failure"}
//! }))
//! .unwrap();
//!
//! assert_eq!(message.action, Action::Detached);
//! ```

pub mod error;
pub mod message;
pub mod mode;

pub use error::{codes, ErrorInfo};
pub use message::{Action, Message, PresenceAction, PresenceMessage, ProtocolMessage, UnknownAction};
pub use mode::{ChannelMode, UnknownMode};
