#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use moula_server::core::StreamRead;
use moula_server::protocol::connect::PREFIX_LEN;
use moula_server::protocol::{setup, ConnectHeader, RoleConnectData};

fuzz_target!(|data: &[u8]| {
    // Walk the handshake the way a connection reads it
    let mut buf = Bytes::copy_from_slice(data);
    let Ok(prefix) = buf.read_array::<PREFIX_LEN>() else { return };
    let Ok(role) = ConnectHeader::check_prefix(prefix) else { return };
    let Ok(_header) = ConnectHeader::read_tail(role, &mut buf) else { return };
    let Ok(declared) = buf.read_u32() else { return };
    if RoleConnectData::check_len(role, declared).is_err() {
        return;
    }
    let Ok(connect_data) = RoleConnectData::read_payload(role, &mut buf) else { return };
    assert_eq!(connect_data.role(), role);

    let Ok(setup_header) = buf.read_array::<{ setup::SETUP_HEADER_LEN }>() else { return };
    if let Ok(payload_len) = setup::check_header(setup_header) {
        assert!(payload_len <= 253);
        let _ = setup::reply_for(payload_len);
    }
});
