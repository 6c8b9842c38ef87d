//! Cellular modem link adapter.
//!
//! Implements [`RadioLink`].  The modem itself is driven by the ESP-IDF
//! `esp_modem` component, which dials out and registers a PPP network
//! interface under the `PPP_DEF` key.  This adapter only answers the
//! question the supervisor cares about: is there an IP path to the
//! broker yet?
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: polls the PPP netif until it reports up
//!   or the attach timeout expires.
//! - **all other targets**: a scripted simulation for host-side tests.

use core::time::Duration;
use log::{info, warn};

use crate::app::ports::RadioLink;
use crate::error::LinkError;

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

/// How long one bring-up attempt waits for network registration.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(target_os = "espidf")]
const ATTACH_POLL_MS: u32 = 250;

#[cfg(target_os = "espidf")]
const PPP_IFKEY: &[u8] = b"PPP_DEF\0";

pub struct CellularLink {
    attach_timeout: Duration,
    attached: bool,
    attempts: u32,
    #[cfg(not(target_os = "espidf"))]
    script: VecDeque<Result<(), LinkError>>,
}

impl Default for CellularLink {
    fn default() -> Self {
        Self::new(DEFAULT_ATTACH_TIMEOUT)
    }
}

impl CellularLink {
    pub fn new(attach_timeout: Duration) -> Self {
        Self {
            attach_timeout,
            attached: false,
            attempts: 0,
            #[cfg(not(target_os = "espidf"))]
            script: VecDeque::new(),
        }
    }

    /// Simulation: queue bring-up outcomes.  Once the script runs dry
    /// every attempt succeeds.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_script(mut self, outcomes: impl IntoIterator<Item = Result<(), LinkError>>) -> Self {
        self.script.extend(outcomes);
        self
    }

    /// Bring-up attempts since boot.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_attach(&mut self) -> Result<(), LinkError> {
        use esp_idf_hal::delay::FreeRtos;
        use esp_idf_svc::sys::{esp_netif_get_handle_from_ifkey, esp_netif_is_netif_up};

        let polls = (self.attach_timeout.as_millis() / u128::from(ATTACH_POLL_MS)).max(1);
        let mut seen_netif = false;
        for _ in 0..polls {
            // SAFETY: PPP_IFKEY is NUL-terminated; the handle is owned by
            // esp_netif and only queried here.
            let up = unsafe {
                let netif = esp_netif_get_handle_from_ifkey(PPP_IFKEY.as_ptr() as *const _);
                if netif.is_null() {
                    false
                } else {
                    seen_netif = true;
                    esp_netif_is_netif_up(netif)
                }
            };
            if up {
                return Ok(());
            }
            FreeRtos::delay_ms(ATTACH_POLL_MS);
        }

        if seen_netif {
            Err(LinkError::Timeout)
        } else {
            Err(LinkError::NotAttached)
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_attached(&self) -> bool {
        use esp_idf_svc::sys::{esp_netif_get_handle_from_ifkey, esp_netif_is_netif_up};
        // SAFETY: see platform_attach.
        unsafe {
            let netif = esp_netif_get_handle_from_ifkey(PPP_IFKEY.as_ptr() as *const _);
            !netif.is_null() && esp_netif_is_netif_up(netif)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_attach(&mut self) -> Result<(), LinkError> {
        self.script.pop_front().unwrap_or(Ok(()))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_attached(&self) -> bool {
        self.attached
    }
}

// ───────────────────────────────────────────────────────────────
// RadioLink
// ───────────────────────────────────────────────────────────────

impl RadioLink for CellularLink {
    fn bring_up(&mut self) -> Result<(), LinkError> {
        self.attempts = self.attempts.wrapping_add(1);
        info!(
            "Modem: waiting for network registration (attempt {}, timeout {}s)",
            self.attempts,
            self.attach_timeout.as_secs()
        );

        match self.platform_attach() {
            Ok(()) => {
                self.attached = true;
                info!("Modem: attached");
                Ok(())
            }
            Err(e) => {
                self.attached = false;
                warn!("Modem: attach failed: {}", e);
                Err(e)
            }
        }
    }

    fn is_attached(&self) -> bool {
        self.attached && self.platform_is_attached()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
