#![no_main]

use bytes::{Bytes, BytesMut};
use libfuzzer_sys::fuzz_target;
use moula_server::message::{read_creatable, write_creatable, MessageRegistry};

fuzz_target!(|data: &[u8]| {
    let registry = MessageRegistry::builtin().expect("builtin registry");
    let mut buf = Bytes::copy_from_slice(data);

    if let Ok(message) = read_creatable(&registry, &mut buf) {
        let mut first = BytesMut::new();
        if write_creatable(&mut first, message.as_ref()).is_err() {
            return;
        }
        // compare bytes, not values: NaN floats never compare equal
        let decoded = read_creatable(&registry, &mut first.clone().freeze()).expect("re-encoded message must decode");
        let mut second = BytesMut::new();
        write_creatable(&mut second, decoded.as_ref()).expect("decoded message must encode");
        assert_eq!(first, second);
    }
});
