#![no_main]

use libfuzzer_sys::fuzz_target;
use qrsl_core::HybridCredential;

fuzz_target!(|data: &[u8]| {
    if let Ok(credential) = HybridCredential::from_bytes(data) {
        assert_eq!(credential.to_bytes().expect("parsed credential re-encodes"), data);
    }
});
