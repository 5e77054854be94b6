//! Property-based tests using proptest
//!
//! Decoders must reject hostile input with an error rather than a panic, and
//! records the writer produces must be recovered by the guesser.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use moula_server::core::stream::truncate_utf16;
use moula_server::core::{StreamRead, StreamWrite};
use moula_server::message::{read_creatable, MessageRegistry};
use moula_server::protocol::ConnectHeader;
use moula_server::sdl::{save_flags, NestedElement, NestedVar, SdlBlob, SdlRecord, SimpleVar};
use proptest::prelude::*;

// Property: the SDL guesser never panics, whatever it is fed
proptest! {
    #[test]
    fn prop_sdl_decode_total(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = SdlBlob::from_bytes(&data);
    }
}

fn variable_data() -> impl Strategy<Value = Vec<u8>> {
    // bytes that cannot form a variable or blob marker
    prop::collection::vec(0x10u8..0x80, 1..24)
}

// Property: records of plain variables survive the guesser
proptest! {
    #[test]
    fn prop_flat_records_round_trip(
        values in prop::collection::vec(prop::option::of(variable_data()), 1..20),
        descriptor in "[a-zA-Z]{1,16}",
        version in any::<u16>(),
    ) {
        let simple_vars = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| SimpleVar {
                index: i as u8,
                hint: String::new(),
                save_flags: if value.is_some() { 0 } else { save_flags::SAME_AS_DEFAULT },
                timestamp: None,
                data: value.unwrap_or_default(),
            })
            .collect();
        let blob = SdlBlob {
            header: Some(moula_server::sdl::StreamHeader {
                descriptor_name: descriptor,
                descriptor_version: version,
                uoid: None,
            }),
            record: SdlRecord {
                flags: 0,
                indexed: false,
                simple_vars,
                nested_vars: Vec::new(),
            },
        };

        let bytes = blob.to_bytes().unwrap();
        let decoded = SdlBlob::from_bytes(&bytes).unwrap();
        prop_assert_eq!(decoded, blob);
    }
}

fn marker_free_byte() -> impl Strategy<Value = u8> {
    0x10u8..0x80
}

fn plain_var(index: u8, data: Vec<u8>) -> SimpleVar {
    SimpleVar {
        index,
        hint: String::new(),
        save_flags: 0,
        timestamp: None,
        data,
    }
}

fn leaf_record(indexed: bool) -> impl Strategy<Value = SdlRecord> {
    prop::collection::vec((marker_free_byte(), variable_data()), 0..4).prop_map(move |vars| {
        // a record with no variables always reads back as implicit
        let indexed = indexed && !vars.is_empty();
        let simple_vars = vars
            .into_iter()
            .enumerate()
            .map(|(pos, (index, data))| plain_var(if indexed { index } else { pos as u8 }, data))
            .collect();
        SdlRecord {
            flags: 0,
            indexed,
            simple_vars,
            nested_vars: Vec::new(),
        }
    })
}

fn nested_array() -> impl Strategy<Value = NestedVar> {
    let count = prop_oneof![1usize..=8, 1usize..=255];
    (any::<bool>(), any::<bool>(), any::<bool>(), count, 0u32..100).prop_flat_map(
        |(variable_length, elements_indexed, leaves_indexed, count, spare)| {
            prop::collection::vec((marker_free_byte(), leaf_record(leaves_indexed)), count).prop_map(
                move |elements| {
                    let elements: Vec<NestedElement> = elements
                        .into_iter()
                        .enumerate()
                        .map(|(pos, (index, record))| NestedElement {
                            index: if elements_indexed { index } else { pos as u8 },
                            record,
                        })
                        .collect();
                    let count = elements.len() as u32;
                    // explicit element indices stay below the declared length
                    let array_len = variable_length.then(|| {
                        if elements_indexed {
                            count.max(0x80) + spare
                        } else {
                            count
                        }
                    });
                    NestedVar {
                        index: 0,
                        hint: String::new(),
                        save_flags: 0,
                        array_len,
                        elements_indexed,
                        elements,
                    }
                },
            )
        },
    )
}

fn nested_record() -> impl Strategy<Value = SdlRecord> {
    (
        any::<bool>(),
        prop::collection::vec((marker_free_byte(), variable_data()), 0..3),
        prop::collection::vec((marker_free_byte(), nested_array()), 1..3),
    )
        .prop_map(|(indexed, vars, arrays)| {
            let slot = |pos: usize, index: u8| if indexed { index } else { pos as u8 };
            SdlRecord {
                flags: 0,
                indexed,
                simple_vars: vars
                    .into_iter()
                    .enumerate()
                    .map(|(pos, (index, data))| plain_var(slot(pos, index), data))
                    .collect(),
                nested_vars: arrays
                    .into_iter()
                    .enumerate()
                    .map(|(pos, (index, array))| NestedVar {
                        index: slot(pos, index),
                        ..array
                    })
                    .collect(),
            }
        })
}

// Property: nested arrays of every shape survive the guesser
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn prop_nested_records_round_trip(record in nested_record()) {
        let blob = SdlBlob { header: None, record };
        let bytes = blob.to_bytes().unwrap();
        let decoded = SdlBlob::from_bytes(&bytes).unwrap();
        prop_assert_eq!(decoded, blob);
    }
}

// Property: creatable decoding never panics on arbitrary bodies
proptest! {
    #[test]
    fn prop_creatable_decode_total(
        class_index in prop::sample::select(vec![0x0206u16, 0x0207, 0x020C, 0x0253, 0x026F, 0x0298, 0x02ED, 0x0347, 0x03B1, 0x8000, 0x1234]),
        body in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let registry = MessageRegistry::builtin().unwrap();
        let mut buf = BytesMut::new();
        buf.write_u16(class_index);
        buf.extend_from_slice(&body);
        let _ = read_creatable(&registry, &mut buf.freeze());
    }
}

// Property: only the fixed header length with a known role passes the prefix check
proptest! {
    #[test]
    fn prop_connect_prefix_rejects_other_lengths(role in any::<u8>(), len in any::<u16>()) {
        let [lo, hi] = len.to_le_bytes();
        let result = ConnectHeader::check_prefix([role, lo, hi]);
        if len != 31 {
            prop_assert!(result.is_err());
        } else {
            prop_assert_eq!(result.is_ok(), matches!(role, 10 | 11 | 22));
        }
    }
}

// Property: UTF-16 strings within the limit read back unchanged
proptest! {
    #[test]
    fn prop_string16_round_trip(value in "\\PC{0,40}") {
        let units = value.encode_utf16().count();
        let mut buf = BytesMut::new();
        buf.write_string16(&value, 128).unwrap();
        prop_assert_eq!(buf.len(), 2 + units * 2);
        let mut read: Bytes = buf.freeze();
        prop_assert_eq!(read.read_string16(128).unwrap(), value);
    }
}

// Property: truncation respects the unit budget and keeps a prefix
proptest! {
    #[test]
    fn prop_truncate_utf16(value in "\\PC{0,40}", max in 0usize..48) {
        let cut = truncate_utf16(&value, max);
        prop_assert!(cut.encode_utf16().count() <= max);
        prop_assert!(value.starts_with(&cut));
        if value.encode_utf16().count() <= max {
            prop_assert_eq!(cut, value);
        }
    }
}
