//! cellrelay firmware library.
//!
//! Exposes the relay, framing and connectivity logic for integration
//! testing.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod framing;
pub mod relay;
pub mod serial;
pub mod session;
pub mod supervisor;

// Platform adapters; simulation backends are compiled on the host.
pub mod adapters;
pub mod drivers;
