//! Feeds raw bytes to `Packet::decode`.
//!
//! Inbound frames are untrusted, so bad magic, truncated headers, and
//! lying length fields all have to come back as errors, not panics or
//! over-reads.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::Packet;

fuzz_target!(|data: &[u8]| {
    let _ = Packet::decode(data);
});
