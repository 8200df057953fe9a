//! Fuzz the typed payload decoders for both call directions.

#![no_main]

use libfuzzer_sys::fuzz_target;
use libsupla::proto::messages::{DeviceMessage, ServerMessage};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let call_id = u32::from_le_bytes(data[..4].try_into().unwrap());
    let payload = &data[4..];

    let _ = ServerMessage::decode(call_id, payload);
    let _ = DeviceMessage::decode(call_id, payload);
});
