//! Fixed-capacity line buffer owned by the frame reader.

use super::FRAME_CAPACITY;

/// Byte accumulator with a write cursor that never exceeds capacity.
pub struct RawFrameBuffer {
    data: [u8; FRAME_CAPACITY],
    len: usize,
}

impl RawFrameBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; FRAME_CAPACITY],
            len: 0,
        }
    }

    /// Append one byte.  Returns `false` (and drops the byte) when full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len == FRAME_CAPACITY {
            return false;
        }
        self.data[self.len] = byte;
        self.len += 1;
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == FRAME_CAPACITY
    }

    /// Reset in place: cursor to zero, contents zeroed.
    pub fn clear(&mut self) {
        self.data[..self.len].fill(0);
        self.len = 0;
    }
}

impl Default for RawFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
