//! Relay pipeline: serial frames in, broker publishes out.
//!
//! ```text
//! ┌──────────────┐ try_publish ┌─────────────┐  signal  ┌──────────────────┐
//! │ FrameReader  │────────────▶│ PendingSlot │─────────▶│ RelayDispatcher  │──▶ publish
//! │ (serial rx)  │             │  (1 entry)  │   take   │ (edge-executor)  │
//! └──────────────┘             └─────────────┘◀─────────└──────────────────┘
//! ```
//!
//! The pipeline is shared through `Arc` between the serial receive task
//! and the relay task.  Offering never blocks.

pub mod dispatcher;
pub mod slot;

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

pub use dispatcher::RelayDispatcher;
pub use slot::{PendingSlot, Payload};

/// Counters shared by the producer and consumer sides.
#[derive(Default)]
pub struct RelayStats {
    offered: AtomicU32,
    dropped: AtomicU32,
    published: AtomicU32,
    failed: AtomicU32,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub offered: u32,
    pub dropped: u32,
    pub published: u32,
    pub failed: u32,
}

impl RelayStats {
    pub const fn new() -> Self {
        Self {
            offered: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            published: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    pub fn record_publish(&self, ok: bool) {
        if ok {
            self.published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            offered: self.offered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Pending slot plus the wake signal for the relay task.
pub struct RelayPipeline {
    slot: PendingSlot,
    wake: Signal<CriticalSectionRawMutex, ()>,
    stats: RelayStats,
}

impl RelayPipeline {
    pub const fn new() -> Self {
        Self {
            slot: PendingSlot::new(),
            wake: Signal::new(),
            stats: RelayStats::new(),
        }
    }

    /// Offer a validated payload from the receive context.
    ///
    /// Signals the relay task on success.  Returns `false` when the slot
    /// is still occupied and the payload was dropped.
    pub fn offer(&self, payload: &[u8]) -> bool {
        self.stats.offered.fetch_add(1, Ordering::Relaxed);
        if self.slot.try_publish(payload) {
            self.wake.signal(());
            true
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Wait for the next offer.
    pub async fn wait(&self) {
        self.wake.wait().await;
    }

    /// Whether a wake is pending (consumes nothing).
    pub fn signaled(&self) -> bool {
        self.wake.signaled()
    }

    pub fn slot(&self) -> &PendingSlot {
        &self.slot
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}

impl Default for RelayPipeline {
    fn default() -> Self {
        Self::new()
    }
}
