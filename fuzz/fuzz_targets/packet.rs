#![no_main]

use libfuzzer_sys::fuzz_target;
use qrsl_core::SecurePacket;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, and anything accepted must re-encode.
    if let Ok(packet) = SecurePacket::decode(data) {
        let wire = packet.encode().expect("decoded packet re-encodes");
        assert!(SecurePacket::decode(&wire).is_ok());
    }
});
