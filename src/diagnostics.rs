//! Restart log.
//!
//! Stores the last 4 supervisor-initiated restarts in an NVS ring buffer
//! under the "restart" namespace.  Each record captures uptime, the
//! reconnect cycle number and the fatal reason.  Records are written just
//! before the reboot and logged on the next boot.

use serde::{Deserialize, Serialize};

use log::warn;

use crate::app::ports::{StorageError, StoragePort};

const RESTART_RING_SLOTS: usize = 4;
const RESTART_NAMESPACE: &str = "restart";
const RESTART_INDEX_KEY: &str = "rst_idx";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRecord {
    pub uptime_secs: u64,
    pub cycle: u32,
    pub reason: heapless::String<64>,
}

impl RestartRecord {
    pub fn new(uptime_secs: u64, cycle: u32, reason: &str) -> Self {
        let mut r = heapless::String::new();
        for c in reason.chars() {
            if r.push(c).is_err() {
                break;
            }
        }
        Self {
            uptime_secs,
            cycle,
            reason: r,
        }
    }
}

/// NVS-backed ring buffer for restart records.
#[derive(Default)]
pub struct RestartLog {
    write_index: usize,
}

impl RestartLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from NVS, or default to 0.
    pub fn init(&mut self, nvs: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(RESTART_NAMESPACE, RESTART_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % RESTART_RING_SLOTS;
        }
    }

    /// Write a record to the next ring slot and advance the index.
    ///
    /// The index only advances once the record itself is stored.
    pub fn write_record(
        &mut self,
        nvs: &mut dyn StoragePort,
        record: &RestartRecord,
    ) -> Result<(), StorageError> {
        let slot_key = Self::slot_key(self.write_index);
        let bytes = postcard::to_allocvec(record).map_err(|e| {
            warn!("Diagnostics: restart record encode failed: {}", e);
            StorageError::IoError
        })?;
        nvs.write(RESTART_NAMESPACE, &slot_key, &bytes)
            .inspect_err(|e| warn!("Diagnostics: restart record {} not stored: {}", slot_key, e))?;

        self.write_index = (self.write_index + 1) % RESTART_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        nvs.write(RESTART_NAMESPACE, RESTART_INDEX_KEY, &idx_bytes)
            .inspect_err(|e| warn!("Diagnostics: restart index not stored: {}", e))
    }

    /// Read all stored records, oldest first.
    pub fn read_all(&self, nvs: &dyn StoragePort) -> heapless::Vec<RestartRecord, RESTART_RING_SLOTS> {
        let mut records = heapless::Vec::new();
        for offset in 0..RESTART_RING_SLOTS {
            let slot_key = Self::slot_key((self.write_index + offset) % RESTART_RING_SLOTS);
            let mut buf = [0u8; 128];
            if let Ok(len) = nvs.read(RESTART_NAMESPACE, &slot_key, &mut buf) {
                if let Ok(record) = postcard::from_bytes::<RestartRecord>(&buf[..len]) {
                    let _ = records.push(record);
                }
            }
        }
        records
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("r{}", index));
        s
    }
}

/// Log the records left by previous restarts.
pub fn report_previous_restarts(nvs: &dyn StoragePort) {
    let mut log = RestartLog::new();
    log.init(nvs);
    let records = log.read_all(nvs);
    if records.is_empty() {
        log::info!("Diagnostics: no restarts recorded");
        return;
    }
    for r in &records {
        log::info!(
            "Diagnostics: restart at {}s uptime, cycle {}: {}",
            r.uptime_secs,
            r.cycle,
            r.reason
        );
    }
}
