//! Fuzz target: `FrameReader::feed`
//!
//! Drives arbitrary byte sequences through the serial frame reader in
//! both handshake and streaming mode and asserts that it never panics,
//! never offers a payload larger than the pending slot, and never keeps
//! more bytes buffered than the receive buffer holds.
//!
//! cargo fuzz run fuzz_frame_reader

#![no_main]

use cellrelay::framing::{FRAME_CAPACITY, FrameReader, PAYLOAD_CAPACITY, classify_frame};
use cellrelay::relay::RelayPipeline;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let pipeline = RelayPipeline::new();

    for mut reader in [FrameReader::streaming(), FrameReader::new("READY")] {
        // First byte picks a chunk size so fragmentation is fuzzed too.
        let chunk = usize::from(data.first().copied().unwrap_or(1)).max(1);
        for part in data.chunks(chunk) {
            reader.feed(part, |payload| {
                assert!(payload.len() <= PAYLOAD_CAPACITY, "payload exceeds slot");
                assert!(!payload.contains(&b'{') && !payload.contains(&b'}'));
                pipeline.offer(payload)
            });
            assert!(reader.buffered() < FRAME_CAPACITY, "buffer never rests full");
            let _ = pipeline.slot().take();
        }
    }

    // The classifier alone must accept any buffer up to capacity.
    let _ = classify_frame(&data[..data.len().min(FRAME_CAPACITY)]);
});
