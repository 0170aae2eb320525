//! Fuzz target: `thingsboard::decode`
//!
//! Drives arbitrary topics and payloads into the inbound decoder and
//! asserts that it never panics and that whatever it accepts is consistent
//! with the bytes it was given.
//!
//! cargo fuzz run fuzz_inbound_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use smarthome::adapters::thingsboard::decode;
use smarthome::app::commands::Inbound;

const TOPIC_PREFIXES: [&str; 5] = [
    "v1/devices/me/attributes",
    "v1/devices/me/attributes/response/",
    "v1/devices/me/rpc/request/",
    "v2/fw/response/",
    "",
];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    // Topic suffix runs up to the first NUL, the payload is what follows.
    let split = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let suffix = String::from_utf8_lossy(&rest[..split]);
    let payload = rest.get(split + 1..).unwrap_or_default();

    let prefix = TOPIC_PREFIXES[usize::from(selector) % TOPIC_PREFIXES.len()];
    let topic = format!("{}{}", prefix, suffix);

    match decode(&topic, payload) {
        Some(Inbound::FirmwareChunk { data, .. }) => {
            assert_eq!(data, payload, "chunk data must be the raw payload");
        }
        Some(Inbound::Rpc { method, .. }) => {
            assert!(payload.len() >= method.len(), "method longer than payload");
        }
        _ => {}
    }
});
