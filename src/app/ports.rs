//! Port traits: the hexagonal boundary between relay logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Supervisor / CloudSession / RelayDispatcher
//! ```
//!
//! Driven adapters (radio, broker, trust store, restart, storage, UART)
//! implement these traits.  The domain consumes them via generics, so the
//! connection logic never touches the modem or the MQTT stack directly.
//!
//! ## Concurrency notes
//!
//! - **BrokerClient** methods take `&self`: the relay task publishes while
//!   the session loop polls.  Implementations serialise internally.
//! - **BrokerClient::process_input** must not hold internal locks while the
//!   handler runs; handlers publish from inside the callback.
//! - **SerialRx / SerialTx** are called from the serial receive context and
//!   must never block.

use core::time::Duration;

use super::events::{BrokerEvent, ConnectParams, MessageId, QoS, Readiness};
use crate::config::RelayConfig;
use crate::error::{BrokerError, LinkError, SerialError, TrustError};

// ───────────────────────────────────────────────────────────────
// Radio link port (driven adapter: domain → cellular modem)
// ───────────────────────────────────────────────────────────────

/// Packet-data link provided by the cellular modem.
pub trait RadioLink {
    /// Bring the radio up.  Blocks until attached or failed.
    fn bring_up(&mut self) -> Result<(), LinkError>;

    /// Whether the network currently reports the device as attached.
    fn is_attached(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Broker client port (driven adapter: domain ↔ MQTT stack)
// ───────────────────────────────────────────────────────────────

/// Opaque MQTT 3.1.1 client.  Wire encoding and TLS live behind it.
pub trait BrokerClient {
    /// Perform the broker handshake.  Returns once CONNACK was accepted.
    fn connect(&self, params: &ConnectParams<'_>) -> Result<(), BrokerError>;

    fn disconnect(&self) -> Result<(), BrokerError>;

    fn publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<MessageId, BrokerError>;

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<MessageId, BrokerError>;

    /// Acknowledge an inbound QoS 1 publish.
    fn ack(&self, message_id: MessageId) -> Result<(), BrokerError>;

    /// Wait until inbound data is ready or `timeout` elapses.
    fn poll(&self, timeout: Duration) -> Result<Readiness, BrokerError>;

    /// Time left before a keepalive ping must be sent.
    fn keepalive_remaining(&self) -> Duration;

    /// Send a keepalive ping if one is due.  `WouldBlock` is not a failure.
    fn live(&self) -> Result<(), BrokerError>;

    /// Process one round of inbound data, invoking `handler` per event.
    fn process_input(&self, handler: &mut dyn FnMut(BrokerEvent<'_>)) -> Result<(), BrokerError>;
}

// ───────────────────────────────────────────────────────────────
// Trust store port (driven adapter: domain → TLS credential store)
// ───────────────────────────────────────────────────────────────

/// Installs the CA chain used to authenticate the broker.
pub trait TrustStore {
    fn provision(&mut self) -> Result<(), TrustError>;
}

// ───────────────────────────────────────────────────────────────
// Restart port (driven adapter: domain → system reset)
// ───────────────────────────────────────────────────────────────

/// Final escalation for unrecoverable connectivity failures.
///
/// Implementations reboot the device and never return, unless rebooting
/// is disabled (debug builds), in which case they log and return so the
/// caller can start another reconnect cycle.
pub trait RestartPort {
    fn restart(&mut self, reason: &str);
}

// ───────────────────────────────────────────────────────────────
// Serial ports (driven adapter: co-processor UART)
// ───────────────────────────────────────────────────────────────

/// Receive side of the co-processor link.
pub trait SerialRx {
    /// Copy whatever bytes are available into `buf`.  Never blocks.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;
}

/// Transmit side of the co-processor link.
pub trait SerialTx {
    /// Push as much of `data` as the FIFO accepts.  Never blocks.
    fn fill_fifo(&mut self, data: &[u8]) -> Result<usize, SerialError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists relay configuration.
///
/// Implementations MUST validate before persisting.  Invalid values are
/// rejected with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`RelayConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<RelayConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &RelayConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for config, CA material and the restart log.
///
/// Keys are namespaced to prevent collisions between subsystems.  Writes
/// MUST be atomic; the ESP-IDF NVS API guarantees this per commit.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
