//! Framing classifier.
//!
//! Steady-state frames look like:
//! ```text
//! ┌──────────┬───────────────────────────────┬──────────┐
//! │ \r \n {  │ payload (no \r, \n, {, or })  │ } \r \n  │
//! └──────────┴───────────────────────────────┴──────────┘
//! ```
//! and are only judged once the buffer holds more than
//! [`MIN_FRAME_LEN`](super::MIN_FRAME_LEN) bytes.

use super::{FRAME_PREAMBLE, FRAME_TRAILER, MIN_FRAME_LEN, MIN_HANDSHAKE_LEN};

/// Verdict for the current buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Keep accumulating.
    Incomplete,
    /// A complete, well-formed frame (or handshake line).
    Valid,
    /// Terminated but malformed; discard.
    Garbage,
}

/// Classify a steady-state frame.
pub fn classify_frame(buf: &[u8]) -> Classification {
    if buf.len() <= MIN_FRAME_LEN || !buf.ends_with(b"\r\n") {
        return Classification::Incomplete;
    }
    if !buf.starts_with(FRAME_PREAMBLE) || !buf.ends_with(FRAME_TRAILER) {
        return Classification::Garbage;
    }

    let mut open = 0usize;
    let mut close = 0usize;
    let mut cr = 0usize;
    let mut lf = 0usize;
    for &b in buf {
        match b {
            b'{' => open += 1,
            b'}' => close += 1,
            b'\r' => cr += 1,
            b'\n' => lf += 1,
            _ => {}
        }
    }

    if open == 1 && close == 1 && cr == 2 && lf == 2 {
        Classification::Valid
    } else {
        Classification::Garbage
    }
}

/// Classify a line while waiting for the peer's readiness announcement.
///
/// A `\n`-terminated line longer than [`MIN_HANDSHAKE_LEN`] is `Valid`
/// when it contains `phrase` and `Garbage` otherwise.
pub fn classify_handshake(buf: &[u8], phrase: &[u8]) -> Classification {
    if buf.len() <= MIN_HANDSHAKE_LEN || buf.last() != Some(&b'\n') {
        return Classification::Incomplete;
    }
    if contains(buf, phrase) {
        Classification::Valid
    } else {
        Classification::Garbage
    }
}

/// Strip the preamble and trailer from a frame already classified `Valid`.
pub fn frame_payload(buf: &[u8]) -> &[u8] {
    let start = FRAME_PREAMBLE.len();
    let end = buf.len().saturating_sub(FRAME_TRAILER.len());
    if end <= start {
        return &[];
    }
    &buf[start..end]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
