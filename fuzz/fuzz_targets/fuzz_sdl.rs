#![no_main]

use libfuzzer_sys::fuzz_target;
use moula_server::sdl::SdlBlob;

fuzz_target!(|data: &[u8]| {
    if let Ok(blob) = SdlBlob::from_bytes(data) {
        // Hints longer than the writer allows still decode, so encoding may fail
        if let Ok(encoded) = blob.to_bytes() {
            let _ = SdlBlob::from_bytes(&encoded);
        }
    }
});
