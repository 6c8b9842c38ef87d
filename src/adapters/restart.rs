//! System restart adapter.
//!
//! Persists a [`RestartRecord`] before rebooting so the next boot can
//! report why the previous one ended.  With `reboot_on_fault` disabled
//! (the default for debug builds) the record is still written but the
//! call returns, leaving the supervisor to start a fresh cycle.

use log::{error, warn};

use crate::adapters::time::UptimeClock;
use crate::app::ports::{RestartPort, StoragePort};
use crate::diagnostics::{RestartLog, RestartRecord};

pub struct SystemRestart<S: StoragePort> {
    storage: S,
    log: RestartLog,
    clock: UptimeClock,
    reboot: bool,
    requests: u32,
}

impl<S: StoragePort> SystemRestart<S> {
    pub fn new(storage: S, reboot: bool) -> Self {
        let mut log = RestartLog::new();
        log.init(&storage);
        Self {
            storage,
            log,
            clock: UptimeClock::new(),
            reboot,
            requests: 0,
        }
    }

    /// Number of restart requests seen since boot.
    pub fn requests(&self) -> u32 {
        self.requests
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn records(&self) -> heapless::Vec<RestartRecord, 4> {
        self.log.read_all(&self.storage)
    }

    #[cfg(target_os = "espidf")]
    fn reboot_now(&self) {
        // Give the UART log a moment to drain.
        esp_idf_hal::delay::FreeRtos::delay_ms(100);
        esp_idf_hal::reset::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn reboot_now(&self) {
        warn!("SystemRestart(sim): reboot requested, returning to caller");
    }
}

impl<S: StoragePort> RestartPort for SystemRestart<S> {
    fn restart(&mut self, reason: &str) {
        self.requests = self.requests.wrapping_add(1);
        let record = RestartRecord::new(self.clock.uptime_secs(), self.requests, reason);
        if let Err(e) = self.log.write_record(&mut self.storage, &record) {
            error!("SystemRestart: restart record not persisted ({})", e);
        }

        if self.reboot {
            error!("SystemRestart: rebooting ({})", reason);
            self.reboot_now();
        } else {
            warn!("SystemRestart: reboot disabled, ignoring ({})", reason);
        }
    }
}
