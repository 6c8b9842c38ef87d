//! Relay configuration parameters
//!
//! Broker identity, topics, retry policy and session timing.
//! Values are persisted in NVS and fall back to [`RelayConfig::default`].

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::events::{ConnectParams, ProtocolVersion};
use crate::app::ports::ConfigError;

pub type HostString = heapless::String<64>;
pub type ClientIdString = heapless::String<32>;
pub type TopicString = heapless::String<96>;

/// Core relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    // --- Broker ---
    /// Broker hostname
    pub broker_host: HostString,
    /// Broker TCP port
    pub broker_port: u16,
    /// Install the CA chain and connect over TLS
    pub use_tls: bool,
    /// MQTT client identifier; empty means derive one from the MAC
    pub client_id: ClientIdString,
    pub username: heapless::String<128>,
    pub password: heapless::String<256>,
    /// Keepalive interval announced in CONNECT (seconds)
    pub keepalive_secs: u16,

    // --- Topics ---
    /// Outbound telemetry and echo topic
    pub pub_topic: TopicString,
    /// Inbound control topic
    pub sub_topic: TopicString,

    // --- Retry policy ---
    /// Radio bring-up attempts before restart (first bring-up only)
    pub link_max_attempts: u8,
    /// Delay between radio bring-up attempts (seconds)
    pub link_retry_delay_secs: u16,
    /// Broker handshake attempts before restart (first bring-up only)
    pub broker_max_attempts: u8,
    /// Delay between broker handshake attempts (seconds)
    pub reconnect_delay_secs: u16,

    // --- Session ---
    /// Loop iterations before the session is recycled
    pub session_iteration_cap: u32,
    /// Yield at the top of every session iteration (milliseconds)
    pub session_tick_ms: u32,
    /// Settle time before the first bring-up (seconds)
    pub startup_delay_secs: u16,

    // --- Serial ---
    /// Readiness announcement from the co-processor; empty skips the handshake
    pub ready_phrase: heapless::String<32>,

    /// Reboot on fatal faults; disabled on debug builds
    pub reboot_on_fault: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            // Broker
            broker_host: str_field("mqtt.example.com"),
            broker_port: 8883,
            use_tls: true,
            client_id: heapless::String::new(),
            username: heapless::String::new(),
            password: heapless::String::new(),
            keepalive_secs: 60,

            // Topics
            pub_topic: str_field("gateway/telemetry"),
            sub_topic: str_field("gateway/control"),

            // Retry policy
            link_max_attempts: 10,
            link_retry_delay_secs: 5,
            broker_max_attempts: 10,
            reconnect_delay_secs: 5,

            // Session
            session_iteration_cap: 300_000,
            session_tick_ms: 1,
            startup_delay_secs: 6,

            // Serial
            ready_phrase: str_field("READY"),

            reboot_on_fault: !cfg!(debug_assertions),
        }
    }
}

impl RelayConfig {
    /// Range-check every field that the relay cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_host.is_empty() {
            return Err(ConfigError::ValidationFailed("broker_host must not be empty"));
        }
        if self.broker_port == 0 {
            return Err(ConfigError::ValidationFailed("broker_port must be non-zero"));
        }
        if self.keepalive_secs == 0 {
            return Err(ConfigError::ValidationFailed("keepalive_secs must be non-zero"));
        }
        if self.pub_topic.is_empty() || self.sub_topic.is_empty() {
            return Err(ConfigError::ValidationFailed("topics must not be empty"));
        }
        if self.pub_topic == self.sub_topic {
            // Echoes would be delivered back to us forever.
            return Err(ConfigError::ValidationFailed(
                "pub_topic and sub_topic must differ",
            ));
        }
        if self.link_max_attempts == 0 || self.broker_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed("attempt limits must be at least 1"));
        }
        if self.session_iteration_cap == 0 {
            return Err(ConfigError::ValidationFailed(
                "session_iteration_cap must be non-zero",
            ));
        }
        if self.ready_phrase.contains(['\r', '\n']) {
            return Err(ConfigError::ValidationFailed(
                "ready_phrase must not contain line terminators",
            ));
        }
        Ok(())
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keepalive_secs))
    }

    pub fn link_retry_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.link_retry_delay_secs))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.reconnect_delay_secs))
    }

    /// Borrowed handshake parameters for [`BrokerClient::connect`](crate::app::ports::BrokerClient::connect).
    pub fn connect_params(&self) -> ConnectParams<'_> {
        ConnectParams {
            host: &self.broker_host,
            port: self.broker_port,
            client_id: &self.client_id,
            username: non_empty(&self.username),
            password: non_empty(&self.password),
            keepalive: self.keepalive(),
            use_tls: self.use_tls,
            protocol: ProtocolVersion::V3_1_1,
        }
    }

    /// Fill an empty client id with the device identity.
    pub fn ensure_client_id(&mut self, device_id: &str) {
        if self.client_id.is_empty() {
            let _ = self.client_id.push_str(device_id);
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

fn str_field<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(s);
    out
}
