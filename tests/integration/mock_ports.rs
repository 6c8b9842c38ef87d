//! Mock port adapters for integration tests.
//!
//! Each mock plays back a script of outcomes and records every call so
//! tests can assert on the full interaction history.  Exhausted scripts
//! fall back to a fixed default documented on each mock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use cellrelay::app::events::{BrokerEvent, ConnectParams, MessageId, QoS, QueuedEvent, Readiness};
use cellrelay::app::ports::{BrokerClient, RadioLink, RestartPort, TrustStore};
use cellrelay::error::{BrokerError, LinkError, TrustError};
use embedded_hal::delay::DelayNs;

// ── MockRadio ─────────────────────────────────────────────────

/// Exhausted script: bring-up succeeds.
#[derive(Default)]
pub struct MockRadio {
    script: RefCell<VecDeque<Result<(), LinkError>>>,
    attached: Cell<bool>,
    pub bring_ups: Cell<u32>,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(n: usize) -> Self {
        let radio = Self::new();
        radio.push_failures(n);
        radio
    }

    pub fn push_failures(&self, n: usize) {
        self.script
            .borrow_mut()
            .extend(std::iter::repeat_n(Err(LinkError::Timeout), n));
    }
}

impl RadioLink for MockRadio {
    fn bring_up(&mut self) -> Result<(), LinkError> {
        self.bring_ups.set(self.bring_ups.get() + 1);
        let r = self.script.borrow_mut().pop_front().unwrap_or(Ok(()));
        self.attached.set(r.is_ok());
        r
    }

    fn is_attached(&self) -> bool {
        self.attached.get()
    }
}

// ── MockBroker ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Connect { client_id: String },
    Disconnect,
    Publish { topic: String, qos: QoS, payload: Vec<u8> },
    Subscribe { topic: String },
    Ack(MessageId),
    Poll,
    Live,
}

#[derive(Default)]
struct BrokerState {
    connect: VecDeque<Result<(), BrokerError>>,
    polls: VecDeque<Result<Readiness, BrokerError>>,
    inbound: VecDeque<Vec<QueuedEvent>>,
    live: Option<BrokerError>,
    publish_error: Option<BrokerError>,
    subscribe_error: Option<BrokerError>,
    ack_error: Option<BrokerError>,
    next_id: MessageId,
    calls: Vec<BrokerCall>,
}

/// Exhausted scripts: connect succeeds, poll fails with
/// `Transport(-1)` (which ends any session), `live` would block.
pub struct MockBroker {
    state: Mutex<BrokerState>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl MockBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState {
                live: Some(BrokerError::WouldBlock),
                ..Default::default()
            }),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut BrokerState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn script_connect(&self, outcomes: impl IntoIterator<Item = Result<(), BrokerError>>) {
        self.with(|s| s.connect.extend(outcomes));
    }

    pub fn script_polls(&self, outcomes: impl IntoIterator<Item = Result<Readiness, BrokerError>>) {
        self.with(|s| s.polls.extend(outcomes));
    }

    /// Queue one batch of events for the next `process_input`.
    pub fn push_inbound(&self, batch: Vec<QueuedEvent>) {
        self.with(|s| s.inbound.push_back(batch));
    }

    pub fn set_live(&self, result: Result<(), BrokerError>) {
        self.with(|s| s.live = result.err());
    }

    pub fn fail_publish(&self, e: Option<BrokerError>) {
        self.with(|s| s.publish_error = e);
    }

    pub fn fail_subscribe(&self, e: Option<BrokerError>) {
        self.with(|s| s.subscribe_error = e);
    }

    pub fn fail_ack(&self, e: Option<BrokerError>) {
        self.with(|s| s.ack_error = e);
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&BrokerCall) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    BrokerCall::Publish { topic, payload, .. } => {
                        Some((topic.clone(), payload.clone()))
                    }
                    _ => None,
                })
                .collect()
        })
    }

    fn next_id(s: &mut BrokerState) -> MessageId {
        s.next_id += 1;
        s.next_id
    }
}

impl BrokerClient for MockBroker {
    fn connect(&self, params: &ConnectParams<'_>) -> Result<(), BrokerError> {
        self.with(|s| {
            s.calls.push(BrokerCall::Connect {
                client_id: params.client_id.to_owned(),
            });
            s.connect.pop_front().unwrap_or(Ok(()))
        })
    }

    fn disconnect(&self) -> Result<(), BrokerError> {
        self.with(|s| s.calls.push(BrokerCall::Disconnect));
        Ok(())
    }

    fn publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<MessageId, BrokerError> {
        self.with(|s| {
            s.calls.push(BrokerCall::Publish {
                topic: topic.to_owned(),
                qos,
                payload: payload.to_vec(),
            });
            match s.publish_error {
                Some(e) => Err(e),
                None => Ok(Self::next_id(s)),
            }
        })
    }

    fn subscribe(&self, topic: &str, _qos: QoS) -> Result<MessageId, BrokerError> {
        self.with(|s| {
            s.calls.push(BrokerCall::Subscribe {
                topic: topic.to_owned(),
            });
            match s.subscribe_error {
                Some(e) => Err(e),
                None => Ok(Self::next_id(s)),
            }
        })
    }

    fn ack(&self, message_id: MessageId) -> Result<(), BrokerError> {
        self.with(|s| {
            s.calls.push(BrokerCall::Ack(message_id));
            s.ack_error.map_or(Ok(()), Err)
        })
    }

    fn poll(&self, _timeout: Duration) -> Result<Readiness, BrokerError> {
        self.with(|s| {
            s.calls.push(BrokerCall::Poll);
            s.polls
                .pop_front()
                .unwrap_or(Err(BrokerError::Transport(-1)))
        })
    }

    fn keepalive_remaining(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn live(&self) -> Result<(), BrokerError> {
        self.with(|s| {
            s.calls.push(BrokerCall::Live);
            s.live.map_or(Ok(()), Err)
        })
    }

    fn process_input(&self, handler: &mut dyn FnMut(BrokerEvent<'_>)) -> Result<(), BrokerError> {
        // Release the lock first: handlers call back into publish/ack.
        let batch = self.with(|s| s.inbound.pop_front()).unwrap_or_default();
        for ev in &batch {
            handler(ev.as_event());
        }
        Ok(())
    }
}

// ── MockTrust ─────────────────────────────────────────────────

/// Exhausted script: provisioning succeeds.
#[derive(Default)]
pub struct MockTrust {
    pub script: VecDeque<Result<(), TrustError>>,
    pub calls: u32,
}

impl TrustStore for MockTrust {
    fn provision(&mut self) -> Result<(), TrustError> {
        self.calls += 1;
        self.script.pop_front().unwrap_or(Ok(()))
    }
}

// ── MockRestart ───────────────────────────────────────────────

/// Records every restart request and returns (reboot disabled).
#[derive(Default)]
pub struct MockRestart {
    pub reasons: Vec<String>,
}

impl RestartPort for MockRestart {
    fn restart(&mut self, reason: &str) {
        self.reasons.push(reason.to_owned());
    }
}

// ── MockDelay ─────────────────────────────────────────────────

/// Records requested sleeps without sleeping.
#[derive(Default)]
pub struct MockDelay {
    pub sleeps_ms: Vec<u32>,
    pub total_ns: u64,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sleeps_ms.push(ms);
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}
