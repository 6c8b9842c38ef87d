//! Broker-side value types exchanged across the [`BrokerClient`](super::ports::BrokerClient) port.
//!
//! [`BrokerEvent`] borrows from the adapter's receive buffer for the
//! duration of one handler call.  [`QueuedEvent`] is the owned form used
//! where events have to outlive that call (adapter queues, test scripts).

use core::time::Duration;

/// Broker-assigned packet identifier.
pub type MessageId = u32;

/// Largest topic accepted from the broker.
pub const MAX_TOPIC_LEN: usize = 96;

/// Largest inbound payload an adapter will queue.  Anything above the
/// session's read buffer is still queued so the session can reject it.
pub const MAX_QUEUED_PAYLOAD: usize = 256;

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_1_1,
}

/// Everything the broker handshake needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keepalive: Duration,
    pub use_tls: bool,
    pub protocol: ProtocolVersion,
}

/// Result of waiting on the broker transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Inbound bytes are waiting.
    pub readable: bool,
    /// The transport reported an error condition.
    pub error: bool,
    /// The transport handle is no longer valid.
    pub invalid: bool,
}

impl Readiness {
    pub const IDLE: Self = Self {
        readable: false,
        error: false,
        invalid: false,
    };

    pub const READABLE: Self = Self {
        readable: true,
        error: false,
        invalid: false,
    };

    pub fn is_faulted(&self) -> bool {
        self.error || self.invalid
    }
}

/// An application message delivered by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPublish<'a> {
    pub topic: &'a str,
    pub message_id: MessageId,
    pub qos: QoS,
    pub payload: &'a [u8],
}

/// Broker events surfaced by one round of input processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent<'a> {
    ConnAck { accepted: bool },
    PubAck { message_id: MessageId },
    SubAck { message_id: MessageId, granted: Option<QoS> },
    Publish(InboundPublish<'a>),
    Disconnect { code: i32 },
}

/// Owned copy of a [`BrokerEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedEvent {
    ConnAck {
        accepted: bool,
    },
    PubAck {
        message_id: MessageId,
    },
    SubAck {
        message_id: MessageId,
        granted: Option<QoS>,
    },
    Publish {
        topic: heapless::String<MAX_TOPIC_LEN>,
        message_id: MessageId,
        qos: QoS,
        payload: heapless::Vec<u8, MAX_QUEUED_PAYLOAD>,
    },
    Disconnect {
        code: i32,
    },
}

impl QueuedEvent {
    /// Build an owned inbound publish, truncating to the queue limits.
    pub fn publish(topic: &str, message_id: MessageId, qos: QoS, payload: &[u8]) -> Self {
        let mut t = heapless::String::new();
        for c in topic.chars() {
            if t.push(c).is_err() {
                break;
            }
        }
        let mut p = heapless::Vec::new();
        let _ = p.extend_from_slice(&payload[..payload.len().min(MAX_QUEUED_PAYLOAD)]);
        Self::Publish {
            topic: t,
            message_id,
            qos,
            payload: p,
        }
    }

    pub fn as_event(&self) -> BrokerEvent<'_> {
        match self {
            Self::ConnAck { accepted } => BrokerEvent::ConnAck {
                accepted: *accepted,
            },
            Self::PubAck { message_id } => BrokerEvent::PubAck {
                message_id: *message_id,
            },
            Self::SubAck {
                message_id,
                granted,
            } => BrokerEvent::SubAck {
                message_id: *message_id,
                granted: *granted,
            },
            Self::Publish {
                topic,
                message_id,
                qos,
                payload,
            } => BrokerEvent::Publish(InboundPublish {
                topic,
                message_id: *message_id,
                qos: *qos,
                payload,
            }),
            Self::Disconnect { code } => BrokerEvent::Disconnect { code: *code },
        }
    }
}
