//! Serial receive context.
//!
//! Pulls bytes from the co-processor UART, runs them through the
//! [`FrameReader`] and offers every validated payload to the relay
//! pipeline.  The same context drains the outbound [`SerialTxQueue`]
//! into the TX FIFO, keeping whatever the FIFO refused for the next pass.
//!
//! Nothing here blocks: a full pending slot drops the frame, a full TX
//! queue rejects the chunk.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::ports::{SerialRx, SerialTx};
use crate::error::SerialError;
use crate::framing::{FeedReport, FrameReader, ReaderMode};
use crate::relay::RelayPipeline;

/// Largest outbound chunk.
pub const TX_CHUNK: usize = 64;

/// Outbound chunks that may wait for the FIFO.
pub const TX_QUEUE_DEPTH: usize = 4;

/// Bytes read from the UART per read call.
const RX_CHUNK: usize = 64;

/// Read calls per service pass.  Bounds the work done in one wake.
const MAX_READS_PER_PASS: usize = 8;

pub type TxChunk = heapless::Vec<u8, TX_CHUNK>;

/// Bounded queue of bytes waiting to go out to the co-processor.
///
/// Reserved for serial acknowledgements back to the co-processor.  The
/// relay path does not produce into it yet, so in firmware it stays empty
/// and [`SerialLink::drain_tx`] returns immediately.
pub struct SerialTxQueue {
    chan: Channel<CriticalSectionRawMutex, TxChunk, TX_QUEUE_DEPTH>,
}

impl Default for SerialTxQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTxQueue {
    pub const fn new() -> Self {
        Self {
            chan: Channel::new(),
        }
    }

    /// Queue `data` for transmission.  Returns `false` when it is larger
    /// than one chunk or the queue is full.
    pub fn enqueue(&self, data: &[u8]) -> bool {
        let Ok(chunk) = TxChunk::from_slice(data) else {
            return false;
        };
        self.chan.try_send(chunk).is_ok()
    }

    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    fn next(&self) -> Option<TxChunk> {
        self.chan.try_receive().ok()
    }
}

/// Co-processor link: UART plus frame reader plus TX draining.
pub struct SerialLink<U> {
    uart: U,
    reader: FrameReader,
    pipeline: Arc<RelayPipeline>,
    tx_queue: Arc<SerialTxQueue>,
    tx_pending: TxChunk,
    tx_offset: usize,
}

impl<U: SerialRx + SerialTx> SerialLink<U> {
    pub fn new(
        uart: U,
        reader: FrameReader,
        pipeline: Arc<RelayPipeline>,
        tx_queue: Arc<SerialTxQueue>,
    ) -> Self {
        Self {
            uart,
            reader,
            pipeline,
            tx_queue,
            tx_pending: TxChunk::new(),
            tx_offset: 0,
        }
    }

    pub fn reader(&self) -> &FrameReader {
        &self.reader
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    /// Bytes taken from the TX queue that the FIFO has not accepted yet.
    pub fn tx_backlog(&self) -> usize {
        self.tx_pending.len() - self.tx_offset
    }

    /// One receive-and-transmit pass.
    pub fn service(&mut self) -> Result<FeedReport, SerialError> {
        let mut total = FeedReport::default();
        let mut buf = [0u8; RX_CHUNK];
        let pipeline = &self.pipeline;

        for _ in 0..MAX_READS_PER_PASS {
            let n = self.uart.read_available(&mut buf)?;
            if n == 0 {
                break;
            }
            let r = self.reader.feed(&buf[..n], |payload| pipeline.offer(payload));
            total.accepted += r.accepted;
            total.dropped += r.dropped;
            total.garbage += r.garbage;
            total.overflows += r.overflows;
            total.handshake_complete |= r.handshake_complete;
        }

        self.drain_tx()?;
        Ok(total)
    }

    /// Push queued bytes into the FIFO until it stops accepting.
    pub fn drain_tx(&mut self) -> Result<usize, SerialError> {
        let mut written = 0;
        loop {
            if self.tx_offset >= self.tx_pending.len() {
                match self.tx_queue.next() {
                    Some(chunk) => {
                        self.tx_pending = chunk;
                        self.tx_offset = 0;
                    }
                    None => break,
                }
            }
            let n = self.uart.fill_fifo(&self.tx_pending[self.tx_offset..])?;
            if n == 0 {
                break;
            }
            self.tx_offset += n;
            written += n;
        }
        Ok(written)
    }

    /// Service the link forever, sleeping `poll_ms` between passes.
    pub fn run<D: DelayNs>(&mut self, delay: &mut D, poll_ms: u32) -> ! {
        info!(
            "Serial: receive loop started ({})",
            match self.reader.mode() {
                ReaderMode::Handshake => "waiting for ready phrase",
                ReaderMode::Streaming => "streaming",
            }
        );
        loop {
            if let Err(e) = self.service() {
                warn!("Serial: {}", e);
            }
            delay.delay_ms(poll_ms);
        }
    }
}
