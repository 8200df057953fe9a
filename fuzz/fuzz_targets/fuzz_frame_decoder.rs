//! Fuzz the streaming SRPC frame decoder: arbitrary byte streams in
//! arbitrary fragmentation must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use libsupla::rpc::FrameDecoder;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();

    // Whole-buffer feed.
    let _ = decoder.feed(data);
    while decoder.pop().is_some() {}

    // Byte-at-a-time feed exercises every resume point.
    decoder.reset();
    for byte in data {
        if decoder.feed(std::slice::from_ref(byte)).is_err() {
            break;
        }
    }
    while decoder.pop().is_some() {}
});
