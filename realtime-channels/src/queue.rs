//! Outbound publish queue and acknowledgement tracking.

use std::collections::{BTreeMap, VecDeque};

use realtime_protocol::{Action, ErrorInfo, Message, PresenceMessage, ProtocolMessage};

use crate::completion::{resolve, Responder};

/// Content of one publish request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Messages(Vec<Message>),
    Presence(Vec<PresenceMessage>),
}

impl Payload {
    /// Build the protocol message carrying this payload.
    pub fn into_protocol_message(self, channel: &str, msg_serial: u64) -> ProtocolMessage {
        let mut message = match self {
            Payload::Messages(messages) => ProtocolMessage {
                messages,
                ..ProtocolMessage::new(Action::Message, channel)
            },
            Payload::Presence(presence) => ProtocolMessage {
                presence,
                ..ProtocolMessage::new(Action::Presence, channel)
            },
        };
        message.msg_serial = Some(msg_serial);
        message
    }
}

/// A publish waiting for the channel to attach.
pub(crate) struct QueuedPublish {
    pub payload: Payload,
    pub reply: Responder<()>,
}

/// FIFO of publishes issued before the channel was attached.
///
/// Entries leave only by being sent or by failing their completion.
#[derive(Default)]
pub(crate) struct OutboundQueue {
    entries: VecDeque<QueuedPublish>,
}

impl OutboundQueue {
    pub fn push(&mut self, payload: Payload, reply: Responder<()>) {
        self.entries.push_back(QueuedPublish { payload, reply });
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = QueuedPublish> + '_ {
        self.entries.drain(..)
    }

    /// Fail every entry with `error`.
    pub fn fail_all(&mut self, error: &ErrorInfo) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            resolve(entry.reply, Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Publishes sent to the server and awaiting ACK or NACK.
///
/// Serials are connection-wide and assigned in send order.
#[derive(Default)]
pub(crate) struct PendingAcks {
    next_serial: u64,
    awaiting: BTreeMap<u64, Responder<()>>,
}

impl PendingAcks {
    /// Reserve the serial for the next outbound publish.
    pub fn next_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    pub fn track(&mut self, serial: u64, reply: Responder<()>) {
        self.awaiting.insert(serial, reply);
    }

    /// Resolve serials `serial..serial + count` successfully.
    pub fn ack(&mut self, serial: u64, count: u32) -> usize {
        self.settle(serial, count, Ok(()))
    }

    /// Fail serials `serial..serial + count` with the server's error.
    pub fn nack(&mut self, serial: u64, count: u32, error: ErrorInfo) -> usize {
        self.settle(serial, count, Err(error))
    }

    /// Fail everything still awaiting an answer.
    pub fn fail_all(&mut self, error: &ErrorInfo) -> usize {
        let awaiting = std::mem::take(&mut self.awaiting);
        let count = awaiting.len();
        for (_, reply) in awaiting {
            resolve(reply, Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.awaiting.len()
    }

    fn settle(&mut self, serial: u64, count: u32, result: Result<(), ErrorInfo>) -> usize {
        let end = serial.saturating_add(u64::from(count.max(1)));
        let settled: Vec<u64> = self.awaiting.range(serial..end).map(|(s, _)| *s).collect();
        for s in &settled {
            if let Some(reply) = self.awaiting.remove(s) {
                resolve(reply, result.clone());
            }
        }
        settled.len()
    }
}
