//! Unified error types for the relay firmware.
//!
//! Each port reports failures through its own small `Copy` enum so the
//! supervisor and session loop can carry them around without allocation.
//! The top-level [`Error`] wraps all of them for `main`, where `anyhow`
//! takes over.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible boot-time operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The cellular radio could not be brought up.
    Link(LinkError),
    /// The broker client rejected an operation.
    Broker(BrokerError),
    /// Trust material could not be installed.
    Trust(TrustError),
    /// The serial link to the co-processor failed.
    Serial(SerialError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Persistent storage failed.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Broker(e) => write!(f, "broker: {e}"),
            Self::Trust(e) => write!(f, "trust: {e}"),
            Self::Serial(e) => write!(f, "serial: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Radio link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Bring-up returned but the network never reported attachment.
    NotAttached,
    /// Attachment did not complete within the bring-up window.
    Timeout,
    /// The modem driver returned an error code.
    Modem(i32),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAttached => write!(f, "radio not attached"),
            Self::Timeout => write!(f, "attach timed out"),
            Self::Modem(code) => write!(f, "modem error {code}"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Broker errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// The operation could not complete right now; try again later.
    WouldBlock,
    /// The broker refused the connection (CONNACK return code).
    Refused(i32),
    /// The underlying socket or TLS session failed.
    Transport(i32),
    /// The readiness poll itself failed.
    Poll(i32),
    /// No session is established.
    NotConnected,
    /// The broker sent something the client could not decode.
    Protocol(i32),
    /// The broker did not answer in time.
    Timeout,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "would block"),
            Self::Refused(code) => write!(f, "connection refused ({code})"),
            Self::Transport(code) => write!(f, "transport error {code}"),
            Self::Poll(code) => write!(f, "poll error {code}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Protocol(code) => write!(f, "protocol error {code}"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        Self::Broker(e)
    }
}

// ---------------------------------------------------------------------------
// Trust material errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustError {
    /// No CA chain is stored on the device.
    MaterialMissing,
    /// The stored CA chain does not fit the provisioning buffer.
    TooLarge,
    /// The TLS stack rejected the CA chain.
    Install(i32),
}

impl fmt::Display for TrustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaterialMissing => write!(f, "CA chain missing"),
            Self::TooLarge => write!(f, "CA chain too large"),
            Self::Install(code) => write!(f, "CA install failed ({code})"),
        }
    }
}

impl From<TrustError> for Error {
    fn from(e: TrustError) -> Self {
        Self::Trust(e)
    }
}

// ---------------------------------------------------------------------------
// Serial errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// The UART driver returned an error code.
    Driver(i32),
    /// Receive FIFO overran before it was drained.
    Overrun,
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(code) => write!(f, "UART driver error {code}"),
            Self::Overrun => write!(f, "receive overrun"),
        }
    }
}

impl From<SerialError> for Error {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
