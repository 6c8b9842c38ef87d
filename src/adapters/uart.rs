//! Co-processor UART adapter.
//!
//! Implements [`SerialRx`] and [`SerialTx`] without ever blocking: reads
//! return whatever the driver's RX ring holds, writes go straight into
//! the TX FIFO and report how much was accepted.
//!
//! - **`target_os = "espidf"`**: `esp_idf_hal::uart::UartDriver`.
//! - **all other targets**: in-memory queues shared with a [`UartProbe`]
//!   so tests can play the co-processor's side.

use crate::app::ports::{SerialRx, SerialTx};
use crate::error::SerialError;

/// Link speed used by the co-processor firmware.
pub const BAUD_RATE: u32 = 115_200;

#[cfg(target_os = "espidf")]
pub struct UartLink {
    driver: esp_idf_hal::uart::UartDriver<'static>,
}

#[cfg(target_os = "espidf")]
impl UartLink {
    pub fn new(driver: esp_idf_hal::uart::UartDriver<'static>) -> Self {
        Self { driver }
    }
}

#[cfg(target_os = "espidf")]
impl SerialRx for UartLink {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.driver
            .read(buf, esp_idf_hal::delay::NON_BLOCK)
            .map_err(|e| SerialError::Driver(e.code()))
    }
}

#[cfg(target_os = "espidf")]
impl SerialTx for UartLink {
    fn fill_fifo(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        self.driver
            .write_nb(data)
            .map_err(|e| SerialError::Driver(e.code()))
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;
#[cfg(not(target_os = "espidf"))]
use std::sync::{Arc, Mutex};

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimLine {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    fifo_space: Option<usize>,
}

#[cfg(not(target_os = "espidf"))]
pub struct UartLink {
    line: Arc<Mutex<SimLine>>,
}

/// Test handle for the far end of a simulated [`UartLink`].
#[cfg(not(target_os = "espidf"))]
#[derive(Clone)]
pub struct UartProbe {
    line: Arc<Mutex<SimLine>>,
}

#[cfg(not(target_os = "espidf"))]
impl UartLink {
    pub fn simulated() -> (Self, UartProbe) {
        let line = Arc::new(Mutex::new(SimLine::default()));
        (Self { line: line.clone() }, UartProbe { line })
    }
}

#[cfg(not(target_os = "espidf"))]
impl UartProbe {
    /// Queue bytes as if the co-processor had sent them.
    pub fn send(&self, bytes: &[u8]) {
        if let Ok(mut l) = self.line.lock() {
            l.rx.extend(bytes);
        }
    }

    /// Take everything written by the gateway so far.
    pub fn take_written(&self) -> Vec<u8> {
        self.line
            .lock()
            .map(|mut l| core::mem::take(&mut l.tx))
            .unwrap_or_default()
    }

    /// Limit how many bytes each `fill_fifo` call accepts.
    pub fn set_fifo_space(&self, space: Option<usize>) {
        if let Ok(mut l) = self.line.lock() {
            l.fifo_space = space;
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl SerialRx for UartLink {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut l = self.line.lock().map_err(|_| SerialError::Driver(-1))?;
        let n = buf.len().min(l.rx.len());
        for (dst, src) in buf.iter_mut().zip(l.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

#[cfg(not(target_os = "espidf"))]
impl SerialTx for UartLink {
    fn fill_fifo(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        let mut l = self.line.lock().map_err(|_| SerialError::Driver(-1))?;
        let n = l.fifo_space.map_or(data.len(), |s| s.min(data.len()));
        l.tx.extend_from_slice(&data[..n]);
        Ok(n)
    }
}
