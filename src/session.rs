//! Steady-state cloud session loop.
//!
//! One iteration:
//!
//! 1. wait for inbound readiness, bounded by the remaining keepalive time
//! 2. drive the keepalive (`WouldBlock` is fine)
//! 3. if readable, process one round of input
//! 4. bail out on transport error flags
//!
//! Inbound QoS 1 publishes are acknowledged and then echoed unchanged on
//! the outbound topic.  Any failure ends the session; the supervisor owns
//! what happens next.

use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::events::{BrokerEvent, InboundPublish, QoS};
use crate::app::ports::BrokerClient;
use crate::error::BrokerError;

/// Size of the inbound read buffer.  Larger payloads end the session.
pub const INBOUND_CAPACITY: usize = 128;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Subscribe(BrokerError),
    Poll(BrokerError),
    Keepalive(BrokerError),
    Input(BrokerError),
    Ack(BrokerError),
    Echo(BrokerError),
    /// The readiness poll flagged the transport as broken.
    TransportFault { error: bool, invalid: bool },
    /// The broker closed the session.
    Disconnected { code: i32 },
    /// An inbound payload did not fit the read buffer.
    PayloadTooLarge { len: usize },
    /// The iteration safety cap was reached.
    IterationCap,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe(e) => write!(f, "subscribe failed: {e}"),
            Self::Poll(e) => write!(f, "poll failed: {e}"),
            Self::Keepalive(e) => write!(f, "keepalive failed: {e}"),
            Self::Input(e) => write!(f, "input failed: {e}"),
            Self::Ack(e) => write!(f, "ack failed: {e}"),
            Self::Echo(e) => write!(f, "echo failed: {e}"),
            Self::TransportFault { error, invalid } => {
                write!(f, "transport fault (err={error}, nval={invalid})")
            }
            Self::Disconnected { code } => write!(f, "broker disconnected ({code})"),
            Self::PayloadTooLarge { len } => write!(f, "inbound payload too large ({len}B)"),
            Self::IterationCap => write!(f, "iteration cap reached"),
        }
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub iterations: u32,
    pub inbound: u32,
    pub echoed: u32,
    pub pub_acks: u32,
}

/// The polling loop that runs while the supervisor is `Connected`.
pub struct CloudSession<'a, B> {
    broker: &'a B,
    pub_topic: &'a str,
    iteration_cap: u32,
    inbound: heapless::Vec<u8, INBOUND_CAPACITY>,
    stats: SessionStats,
}

impl<'a, B: BrokerClient> CloudSession<'a, B> {
    pub fn new(broker: &'a B, pub_topic: &'a str, iteration_cap: u32) -> Self {
        Self {
            broker,
            pub_topic,
            iteration_cap,
            inbound: heapless::Vec::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run one iteration.
    pub fn step(&mut self) -> Result<(), SessionError> {
        if self.stats.iterations >= self.iteration_cap {
            return Err(SessionError::IterationCap);
        }
        self.stats.iterations += 1;

        let readiness = self
            .broker
            .poll(self.broker.keepalive_remaining())
            .map_err(SessionError::Poll)?;

        match self.broker.live() {
            Ok(()) | Err(BrokerError::WouldBlock) => {}
            Err(e) => return Err(SessionError::Keepalive(e)),
        }

        if readiness.readable {
            self.process_input()?;
        }

        if readiness.is_faulted() {
            return Err(SessionError::TransportFault {
                error: readiness.error,
                invalid: readiness.invalid,
            });
        }
        Ok(())
    }

    /// Loop until the session ends, yielding `tick_ms` per iteration.
    pub fn run<D: DelayNs>(&mut self, delay: &mut D, tick_ms: u32) -> SessionError {
        info!("Session: running (cap={} iterations)", self.iteration_cap);
        loop {
            if tick_ms > 0 {
                delay.delay_ms(tick_ms);
            }
            if let Err(e) = self.step() {
                warn!("Session: ended after {} iterations: {}", self.stats.iterations, e);
                return e;
            }
        }
    }

    fn process_input(&mut self) -> Result<(), SessionError> {
        let broker = self.broker;
        let pub_topic = self.pub_topic;
        let inbound = &mut self.inbound;
        let stats = &mut self.stats;

        let mut outcome = Ok(());
        let mut handler = |event: BrokerEvent<'_>| {
            if outcome.is_ok() {
                outcome = handle_event(broker, pub_topic, inbound, stats, event);
            }
        };
        broker
            .process_input(&mut handler)
            .map_err(SessionError::Input)?;
        outcome
    }
}

fn handle_event<B: BrokerClient>(
    broker: &B,
    pub_topic: &str,
    inbound: &mut heapless::Vec<u8, INBOUND_CAPACITY>,
    stats: &mut SessionStats,
    event: BrokerEvent<'_>,
) -> Result<(), SessionError> {
    match event {
        BrokerEvent::ConnAck { accepted } => {
            debug!("Session: late CONNACK (accepted={})", accepted);
            Ok(())
        }
        BrokerEvent::PubAck { message_id } => {
            stats.pub_acks = stats.pub_acks.wrapping_add(1);
            debug!("Session: PUBACK #{}", message_id);
            Ok(())
        }
        BrokerEvent::SubAck {
            message_id,
            granted,
        } => {
            info!("Session: SUBACK #{} (granted {:?})", message_id, granted);
            Ok(())
        }
        BrokerEvent::Publish(p) => echo(broker, pub_topic, inbound, stats, &p),
        BrokerEvent::Disconnect { code } => Err(SessionError::Disconnected { code }),
    }
}

fn echo<B: BrokerClient>(
    broker: &B,
    pub_topic: &str,
    inbound: &mut heapless::Vec<u8, INBOUND_CAPACITY>,
    stats: &mut SessionStats,
    p: &InboundPublish<'_>,
) -> Result<(), SessionError> {
    inbound.clear();
    if inbound.extend_from_slice(p.payload).is_err() {
        return Err(SessionError::PayloadTooLarge {
            len: p.payload.len(),
        });
    }
    stats.inbound = stats.inbound.wrapping_add(1);
    info!(
        "Session: received {}B on '{}' (msg #{}, {:?})",
        inbound.len(),
        p.topic,
        p.message_id,
        p.qos
    );

    if p.qos == QoS::AtLeastOnce {
        broker.ack(p.message_id).map_err(SessionError::Ack)?;
    }
    broker
        .publish(pub_topic, QoS::AtLeastOnce, inbound.as_slice())
        .map_err(SessionError::Echo)?;
    stats.echoed = stats.echoed.wrapping_add(1);
    Ok(())
}
