//! Serial frame reader.
//!
//! Accumulates bytes from the co-processor UART and yields validated
//! telemetry payloads.  Runs in the serial receive context: no blocking,
//! no allocation, bounded work per byte.
//!
//! ```text
//!   bytes ──▶ RawFrameBuffer ──▶ classify ──┬─ Incomplete ─▶ (keep going)
//!                                           ├─ Valid ──────▶ offer(payload), clear
//!                                           └─ Garbage ────▶ clear
//! ```
//!
//! Before the co-processor announces itself the reader is in handshake
//! mode and only looks for the readiness phrase.

pub mod buffer;
pub mod classify;

use core::time::Duration;

use burster::Limiter;
use log::{info, warn};

pub use buffer::RawFrameBuffer;
pub use classify::{Classification, classify_frame, classify_handshake, frame_payload};

/// Receive buffer size in bytes.
pub const FRAME_CAPACITY: usize = 128;

/// Frames are only judged once the buffer holds more than this many bytes.
pub const MIN_FRAME_LEN: usize = 100;

/// Handshake lines must be longer than this.
pub const MIN_HANDSHAKE_LEN: usize = 15;

pub const FRAME_PREAMBLE: &[u8] = b"\r\n{";
pub const FRAME_TRAILER: &[u8] = b"}\r\n";

/// Framing bytes stripped from every frame.
pub const FRAME_OVERHEAD: usize = FRAME_PREAMBLE.len() + FRAME_TRAILER.len();

/// Largest payload a frame can carry.
pub const PAYLOAD_CAPACITY: usize = FRAME_CAPACITY - FRAME_OVERHEAD;

const MAX_PHRASE_LEN: usize = 32;

/// Which classifier is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    Handshake,
    Streaming,
}

/// Outcome counters for one [`FrameReader::feed`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    /// Payloads the sink accepted.
    pub accepted: u32,
    /// Valid payloads the sink refused (slot busy).
    pub dropped: u32,
    /// Terminated lines that failed validation.
    pub garbage: u32,
    /// Buffer filled without a terminator.
    pub overflows: u32,
    /// The readiness phrase was seen during this call.
    pub handshake_complete: bool,
}

/// Running totals since the reader was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub accepted: u32,
    pub dropped: u32,
    pub garbage: u32,
    pub overflows: u32,
}

impl FrameStats {
    fn absorb(&mut self, r: &FeedReport) {
        self.accepted = self.accepted.wrapping_add(r.accepted);
        self.dropped = self.dropped.wrapping_add(r.dropped);
        self.garbage = self.garbage.wrapping_add(r.garbage);
        self.overflows = self.overflows.wrapping_add(r.overflows);
    }
}

/// Streaming frame reader with rate-limited diagnostics.
pub struct FrameReader {
    buf: RawFrameBuffer,
    mode: ReaderMode,
    phrase: heapless::Vec<u8, MAX_PHRASE_LEN>,
    stats: FrameStats,
    log_limiter: burster::TokenBucket<fn() -> Duration>,
}

impl FrameReader {
    /// Create a reader that waits for `ready_phrase` before streaming.
    /// An empty phrase starts directly in streaming mode.
    pub fn new(ready_phrase: &str) -> Self {
        let mut phrase = heapless::Vec::new();
        let bytes = ready_phrase.as_bytes();
        let _ = phrase.extend_from_slice(&bytes[..bytes.len().min(MAX_PHRASE_LEN)]);
        let mode = if phrase.is_empty() {
            ReaderMode::Streaming
        } else {
            ReaderMode::Handshake
        };
        Self {
            buf: RawFrameBuffer::new(),
            mode,
            phrase,
            stats: FrameStats::default(),
            log_limiter: burster::TokenBucket::new_with_time_provider(
                1,
                5, // 1 line per second, 5 burst capacity
                crate::adapters::time::platform_now as fn() -> Duration,
            ),
        }
    }

    /// Reader that skips the handshake.
    pub fn streaming() -> Self {
        Self::new("")
    }

    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed newly received bytes.
    ///
    /// `offer` receives each validated payload and returns whether it was
    /// accepted.  The buffer is cleared after every verdict regardless.
    pub fn feed<F>(&mut self, bytes: &[u8], mut offer: F) -> FeedReport
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut report = FeedReport::default();

        for &byte in bytes {
            self.buf.push(byte);

            let verdict = match self.mode {
                ReaderMode::Handshake => classify_handshake(self.buf.as_slice(), &self.phrase),
                ReaderMode::Streaming => classify_frame(self.buf.as_slice()),
            };

            match verdict {
                Classification::Incomplete => {
                    if self.buf.is_full() {
                        report.overflows += 1;
                        let len = self.buf.len();
                        self.rate_limited_warn(format_args!(
                            "Serial: {} bytes without terminator, discarding",
                            len
                        ));
                        self.buf.clear();
                    }
                }
                Classification::Valid => {
                    match self.mode {
                        ReaderMode::Handshake => {
                            info!("Serial: co-processor ready, streaming frames");
                            self.mode = ReaderMode::Streaming;
                            report.handshake_complete = true;
                        }
                        ReaderMode::Streaming => {
                            let payload = frame_payload(self.buf.as_slice());
                            let len = payload.len();
                            if offer(payload) {
                                report.accepted += 1;
                            } else {
                                report.dropped += 1;
                                self.rate_limited_warn(format_args!(
                                    "Serial: relay busy, dropping {}B frame",
                                    len
                                ));
                            }
                        }
                    }
                    self.buf.clear();
                }
                Classification::Garbage => {
                    report.garbage += 1;
                    let len = self.buf.len();
                    self.rate_limited_warn(format_args!(
                        "Serial: malformed line ({}B), discarding",
                        len
                    ));
                    self.buf.clear();
                }
            }
        }

        self.stats.absorb(&report);
        report
    }

    /// Drop any partial line, e.g. after a UART error.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn rate_limited_warn(&mut self, args: core::fmt::Arguments<'_>) {
        if self.log_limiter.try_consume(1).is_ok() {
            warn!("{}", args);
        }
    }
}
