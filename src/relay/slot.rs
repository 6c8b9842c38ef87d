//! Single-message mailbox between the serial receive context and the relay task.
//!
//! At most one unpublished payload exists.  A write never overwrites an
//! occupied slot; the newer payload is the one that gets dropped.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::framing::PAYLOAD_CAPACITY;

/// Owned copy of a pending payload.
pub type Payload = heapless::Vec<u8, PAYLOAD_CAPACITY>;

struct SlotState {
    payload: Payload,
    occupied: bool,
}

/// Critical-section guarded pending-message slot.
pub struct PendingSlot {
    state: Mutex<CriticalSectionRawMutex, RefCell<SlotState>>,
}

impl PendingSlot {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SlotState {
                payload: heapless::Vec::new(),
                occupied: false,
            })),
        }
    }

    /// Store `payload` if the slot is free.
    ///
    /// Returns `false` without touching the slot when it is occupied or
    /// the payload exceeds [`PAYLOAD_CAPACITY`].
    pub fn try_publish(&self, payload: &[u8]) -> bool {
        self.state.lock(|cell| {
            let mut s = cell.borrow_mut();
            if s.occupied {
                return false;
            }
            s.payload.clear();
            if s.payload.extend_from_slice(payload).is_err() {
                s.payload.clear();
                return false;
            }
            s.occupied = true;
            true
        })
    }

    /// Copy out and clear the pending payload, if any.
    pub fn take(&self) -> Option<Payload> {
        self.state.lock(|cell| {
            let mut s = cell.borrow_mut();
            if !s.occupied {
                return None;
            }
            s.occupied = false;
            Some(core::mem::take(&mut s.payload))
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.state.lock(|cell| cell.borrow().occupied)
    }
}

impl Default for PendingSlot {
    fn default() -> Self {
        Self::new()
    }
}
