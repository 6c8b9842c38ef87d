//! MQTT broker client adapter.
//!
//! Implements [`BrokerClient`] on top of ESP-MQTT (`esp_idf_svc::mqtt`).
//!
//! ESP-MQTT runs its own task and reports everything through an event
//! connection.  A small pump thread drains that connection into a bounded
//! [`EventQueue`] as owned [`QueuedEvent`]s; when the queue is full the
//! event is dropped and counted.  `poll` moves queued events into a
//! fixed-size inbox and `process_input` hands them to the session without
//! holding any lock, so handlers may publish from inside the callback.
//!
//! ```text
//!  ESP-MQTT task ──▶ pump thread ──▶ EventQueue ──▶ poll / process_input
//!        ▲                                               │
//!        └────────────── publish / subscribe ◀───────────┘ (session, relay)
//! ```
//!
//! ESP-MQTT acknowledges inbound QoS 1 publishes and sends keepalive pings
//! on its own, so `ack` and `live` only keep bookkeeping.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspMqttClient` over TCP or TLS using
//!   the global CA store.
//! - **all other targets**: a loopback broker that echoes publishes on
//!   subscribed topics back to the client, for host-side tests.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal::delay::DelayNs;
use heapless::Deque;
use log::{debug, info, warn};

use crate::app::events::{BrokerEvent, ConnectParams, MessageId, QoS, QueuedEvent, Readiness};
use crate::app::ports::BrokerClient;
use crate::error::BrokerError;

/// How long `connect` waits for CONNACK.
pub const CONNACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Events buffered between the MQTT task and the session.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Sleep between queue checks while waiting for an event.
const RECV_POLL_MS: u32 = 1;

/// QoS reported for inbound publishes.  ESP-MQTT does not surface the
/// per-message QoS; the control subscription is QoS 1.
const INBOUND_QOS: QoS = QoS::AtLeastOnce;

/// Bounded hand-off from the MQTT event task to the session.
pub struct EventQueue {
    chan: Channel<CriticalSectionRawMutex, QueuedEvent, EVENT_QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            chan: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue an event; a full queue drops it.
    pub fn push(&self, event: QueuedEvent) -> bool {
        match self.chan.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!("MQTT: event queue full, dropped event ({} total)", n);
                }
                false
            }
        }
    }

    /// Events dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    fn try_pop(&self) -> Option<QueuedEvent> {
        self.chan.try_receive().ok()
    }

    /// Wait up to `timeout` for the next event.
    fn pop_within(&self, timeout: Duration) -> Option<QueuedEvent> {
        let deadline = Instant::now() + timeout;
        let mut delay = poll_delay();
        loop {
            if let Some(ev) = self.try_pop() {
                return Some(ev);
            }
            if Instant::now() >= deadline {
                return None;
            }
            delay.delay_ms(RECV_POLL_MS);
        }
    }

    fn clear(&self) {
        while self.try_pop().is_some() {}
    }
}

#[cfg(target_os = "espidf")]
fn poll_delay() -> impl DelayNs {
    esp_idf_hal::delay::FreeRtos
}

#[cfg(not(target_os = "espidf"))]
fn poll_delay() -> impl DelayNs {
    crate::adapters::time::StdDelay
}

type Inbox = Deque<QueuedEvent, EVENT_QUEUE_DEPTH>;

/// ESP-MQTT backed [`BrokerClient`].
pub struct MqttBroker {
    events: Arc<EventQueue>,
    inbox: Mutex<Inbox>,
    faulted: Arc<AtomicBool>,
    connected: AtomicBool,
    keepalive: Mutex<Duration>,
    last_activity: Mutex<Instant>,
    pings: AtomicU32,
    #[cfg(target_os = "espidf")]
    client: Mutex<Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>>,
    #[cfg(not(target_os = "espidf"))]
    sim: Mutex<SimBroker>,
}

impl Default for MqttBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttBroker {
    pub fn new() -> Self {
        Self {
            events: Arc::new(EventQueue::new()),
            inbox: Mutex::new(Deque::new()),
            faulted: Arc::new(AtomicBool::new(false)),
            connected: AtomicBool::new(false),
            keepalive: Mutex::new(Duration::from_secs(60)),
            last_activity: Mutex::new(Instant::now()),
            pings: AtomicU32::new(0),
            #[cfg(target_os = "espidf")]
            client: Mutex::new(None),
            #[cfg(not(target_os = "espidf"))]
            sim: Mutex::new(SimBroker::default()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Keepalive pings sent since boot.
    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::Relaxed)
    }

    /// Inbound events lost to a full queue since boot.
    pub fn dropped_events(&self) -> u32 {
        self.events.dropped()
    }

    fn touch(&self) {
        if let Ok(mut t) = self.last_activity.lock() {
            *t = Instant::now();
        }
    }

    fn require_connected(&self) -> Result<(), BrokerError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn clear_inbox(&self) {
        if let Ok(mut inbox) = self.inbox.lock() {
            inbox.clear();
        }
        self.events.clear();
    }

    /// Move queued events into the inbox until it is full.
    fn fill_inbox(&self, inbox: &mut Inbox) {
        while !inbox.is_full() {
            let Some(ev) = self.events.try_pop() else {
                break;
            };
            if inbox.push_back(ev).is_err() {
                break;
            }
        }
    }

    /// Block until CONNACK arrives; everything else received meanwhile is
    /// kept for the session.
    fn await_connack(&self, timeout: Duration) -> Result<(), BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox.lock().map_err(|_| BrokerError::Protocol(-1))?;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.pop_within(left) {
                Some(QueuedEvent::ConnAck { accepted: true }) => return Ok(()),
                Some(QueuedEvent::ConnAck { accepted: false }) => return Err(BrokerError::Refused(0)),
                Some(QueuedEvent::Disconnect { code }) => return Err(BrokerError::Refused(code)),
                Some(other) => {
                    if inbox.push_back(other).is_err() {
                        warn!("MQTT: inbox full while awaiting CONNACK, event dropped");
                    }
                }
                None => return Err(BrokerError::Timeout),
            }
        }
    }

    fn reset_session_state(&self, keepalive: Duration) {
        self.faulted.store(false, Ordering::Release);
        self.clear_inbox();
        if let Ok(mut k) = self.keepalive.lock() {
            *k = keepalive;
        }
        self.touch();
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use super::*;
    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration,
        MqttProtocolVersion, QoS as EspQoS,
    };

    const PUMP_STACK_SIZE: usize = 6 * 1024;

    pub(super) fn to_esp_qos(qos: QoS) -> EspQoS {
        match qos {
            QoS::AtMostOnce => EspQoS::AtMostOnce,
            QoS::AtLeastOnce => EspQoS::AtLeastOnce,
            QoS::ExactlyOnce => EspQoS::ExactlyOnce,
        }
    }

    pub(super) fn broker_url(params: &ConnectParams<'_>) -> heapless::String<96> {
        use core::fmt::Write;
        let mut url = heapless::String::new();
        let scheme = if params.use_tls { "mqtts" } else { "mqtt" };
        let _ = write!(url, "{}://{}:{}", scheme, params.host, params.port);
        url
    }

    pub(super) fn create(
        params: &ConnectParams<'_>,
    ) -> Result<(EspMqttClient<'static>, EspMqttConnection), BrokerError> {
        let conf = MqttClientConfiguration {
            client_id: Some(params.client_id),
            username: params.username,
            password: params.password,
            keep_alive_interval: Some(params.keepalive),
            protocol_version: Some(MqttProtocolVersion::V3_1_1),
            use_global_ca_store: params.use_tls,
            ..Default::default()
        };
        let url = broker_url(params);
        EspMqttClient::new(&url, &conf).map_err(|e| BrokerError::Transport(e.code()))
    }

    /// Forward ESP-MQTT events until the client is destroyed.
    pub(super) fn spawn_pump(
        mut conn: EspMqttConnection,
        events: Arc<EventQueue>,
        faulted: Arc<AtomicBool>,
    ) -> Result<(), BrokerError> {
        std::thread::Builder::new()
            .name("mqtt-pump".into())
            .stack_size(PUMP_STACK_SIZE)
            .spawn(move || {
                while let Ok(event) = conn.next() {
                    let queued = match event.payload() {
                        EventPayload::Connected(_) => Some(QueuedEvent::ConnAck { accepted: true }),
                        EventPayload::Disconnected => Some(QueuedEvent::Disconnect { code: 0 }),
                        EventPayload::Subscribed(id) => Some(QueuedEvent::SubAck {
                            message_id: id,
                            granted: Some(INBOUND_QOS),
                        }),
                        EventPayload::Published(id) => Some(QueuedEvent::PubAck { message_id: id }),
                        EventPayload::Received {
                            id,
                            topic,
                            data,
                            details: Details::Complete,
                        } => Some(QueuedEvent::publish(topic.unwrap_or(""), id, INBOUND_QOS, data)),
                        EventPayload::Received { id, .. } => {
                            warn!("MQTT: dropping chunked message #{}", id);
                            None
                        }
                        EventPayload::Error(e) => {
                            warn!("MQTT: transport error: {:?}", e);
                            faulted.store(true, Ordering::Release);
                            None
                        }
                        _ => None,
                    };
                    if let Some(q) = queued {
                        events.push(q);
                    }
                }
                debug!("MQTT: event pump exiting");
            })
            .map(|_| ())
            .map_err(|_| BrokerError::Transport(-1))
    }
}

#[cfg(target_os = "espidf")]
impl MqttBroker {
    fn platform_connect(&self, params: &ConnectParams<'_>) -> Result<(), BrokerError> {
        let mut slot = self.client.lock().map_err(|_| BrokerError::Protocol(-1))?;
        // Destroying the previous client also ends its pump thread.
        *slot = None;
        let (client, conn) = esp::create(params)?;
        esp::spawn_pump(conn, self.events.clone(), self.faulted.clone())?;
        *slot = Some(client);
        drop(slot);

        let result = self.await_connack(CONNACK_TIMEOUT);
        if result.is_err() {
            if let Ok(mut slot) = self.client.lock() {
                *slot = None;
            }
        }
        result
    }

    fn platform_disconnect(&self) -> Result<(), BrokerError> {
        let mut slot = self.client.lock().map_err(|_| BrokerError::Protocol(-1))?;
        *slot = None;
        Ok(())
    }

    fn platform_publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<MessageId, BrokerError> {
        let mut slot = self.client.lock().map_err(|_| BrokerError::Protocol(-1))?;
        let client = slot.as_mut().ok_or(BrokerError::NotConnected)?;
        client
            .publish(topic, esp::to_esp_qos(qos), false, payload)
            .map_err(|e| BrokerError::Transport(e.code()))
    }

    fn platform_subscribe(&self, topic: &str, qos: QoS) -> Result<MessageId, BrokerError> {
        let mut slot = self.client.lock().map_err(|_| BrokerError::Protocol(-1))?;
        let client = slot.as_mut().ok_or(BrokerError::NotConnected)?;
        client
            .subscribe(topic, esp::to_esp_qos(qos))
            .map_err(|e| BrokerError::Transport(e.code()))
    }

    fn platform_ping(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimBroker {
    refuse_next: u32,
    next_id: MessageId,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
}

#[cfg(not(target_os = "espidf"))]
impl SimBroker {
    fn next_id(&mut self) -> MessageId {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttBroker {
    /// Simulation: refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: u32) {
        if let Ok(mut sim) = self.sim.lock() {
            sim.refuse_next = n;
        }
    }

    /// Simulation: deliver an event as if the broker had sent it.
    pub fn inject(&self, event: QueuedEvent) {
        self.events.push(event);
    }

    /// Simulation: raise the transport error flag.
    pub fn inject_fault(&self) {
        self.faulted.store(true, Ordering::Release);
    }

    /// Simulation: every publish seen so far.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.sim.lock().map(|s| s.published.clone()).unwrap_or_default()
    }

    fn platform_connect(&self, params: &ConnectParams<'_>) -> Result<(), BrokerError> {
        {
            let mut sim = self.sim.lock().map_err(|_| BrokerError::Protocol(-1))?;
            sim.subscriptions.clear();
            if sim.refuse_next > 0 {
                sim.refuse_next -= 1;
                info!("MQTT(sim): refusing '{}'", params.client_id);
                self.inject(QueuedEvent::ConnAck { accepted: false });
            } else {
                info!("MQTT(sim): accepting '{}'", params.client_id);
                self.inject(QueuedEvent::ConnAck { accepted: true });
            }
        }
        self.await_connack(CONNACK_TIMEOUT)
    }

    fn platform_disconnect(&self) -> Result<(), BrokerError> {
        if let Ok(mut sim) = self.sim.lock() {
            sim.subscriptions.clear();
        }
        Ok(())
    }

    fn platform_publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<MessageId, BrokerError> {
        let mut sim = self.sim.lock().map_err(|_| BrokerError::Protocol(-1))?;
        let id = sim.next_id();
        sim.published.push((topic.to_owned(), payload.to_vec()));
        if qos != QoS::AtMostOnce {
            self.inject(QueuedEvent::PubAck { message_id: id });
        }
        if sim.subscriptions.iter().any(|s| s == topic) {
            let echo_id = sim.next_id();
            self.inject(QueuedEvent::publish(topic, echo_id, qos, payload));
        }
        Ok(id)
    }

    fn platform_subscribe(&self, topic: &str, qos: QoS) -> Result<MessageId, BrokerError> {
        let mut sim = self.sim.lock().map_err(|_| BrokerError::Protocol(-1))?;
        let id = sim.next_id();
        sim.subscriptions.push(topic.to_owned());
        self.inject(QueuedEvent::SubAck {
            message_id: id,
            granted: Some(qos),
        });
        Ok(id)
    }

    fn platform_ping(&self) -> Result<(), BrokerError> {
        debug!("MQTT(sim): PINGREQ");
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// BrokerClient
// ───────────────────────────────────────────────────────────────

impl BrokerClient for MqttBroker {
    fn connect(&self, params: &ConnectParams<'_>) -> Result<(), BrokerError> {
        info!(
            "MQTT: connecting to {}:{} as '{}' (tls={})",
            params.host, params.port, params.client_id, params.use_tls
        );
        self.connected.store(false, Ordering::Release);
        self.reset_session_state(params.keepalive);

        self.platform_connect(params)?;
        self.connected.store(true, Ordering::Release);
        self.touch();
        info!("MQTT: CONNACK accepted");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BrokerError> {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        self.platform_disconnect()?;
        self.clear_inbox();
        if was_connected {
            info!("MQTT: disconnected");
        }
        Ok(())
    }

    fn publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<MessageId, BrokerError> {
        self.require_connected()?;
        let id = self.platform_publish(topic, qos, payload)?;
        self.touch();
        Ok(id)
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<MessageId, BrokerError> {
        self.require_connected()?;
        let id = self.platform_subscribe(topic, qos)?;
        self.touch();
        Ok(id)
    }

    fn ack(&self, message_id: MessageId) -> Result<(), BrokerError> {
        self.require_connected()?;
        debug!("MQTT: PUBACK #{} sent by stack", message_id);
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> Result<Readiness, BrokerError> {
        let mut inbox = self.inbox.lock().map_err(|_| BrokerError::Poll(-1))?;
        if inbox.is_empty() {
            if let Some(ev) = self.events.pop_within(timeout) {
                // Cannot fail: the inbox was empty.
                let _ = inbox.push_back(ev);
            }
        }
        self.fill_inbox(&mut inbox);

        Ok(Readiness {
            readable: !inbox.is_empty(),
            error: self.faulted.load(Ordering::Acquire),
            invalid: !self.is_connected(),
        })
    }

    fn keepalive_remaining(&self) -> Duration {
        let keepalive = self.keepalive.lock().map(|k| *k).unwrap_or_default();
        let idle = self
            .last_activity
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        keepalive.saturating_sub(idle)
    }

    fn live(&self) -> Result<(), BrokerError> {
        self.require_connected()?;
        if !self.keepalive_remaining().is_zero() {
            return Err(BrokerError::WouldBlock);
        }
        self.platform_ping()?;
        self.pings.fetch_add(1, Ordering::Relaxed);
        self.touch();
        Ok(())
    }

    fn process_input(&self, handler: &mut dyn FnMut(BrokerEvent<'_>)) -> Result<(), BrokerError> {
        let batch = {
            let mut inbox = self.inbox.lock().map_err(|_| BrokerError::Protocol(-1))?;
            core::mem::replace(&mut *inbox, Deque::new())
        };
        for ev in batch.iter() {
            if let QueuedEvent::Disconnect { .. } = ev {
                self.connected.store(false, Ordering::Release);
            }
            handler(ev.as_event());
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
