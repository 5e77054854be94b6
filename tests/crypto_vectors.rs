//! Known-answer and parity tests for the legacy crypto primitives

#![allow(clippy::expect_used, clippy::unwrap_used)]

use moula_server::crypto::{
    byte_swap, challenge_hash, password_hash_legacy, password_hash_modern, sha0, sha1, LegacySha, Rc4,
    TextEncoding,
};
use proptest::prelude::*;
use sha1::{Digest, Sha1};

#[test]
fn test_sha0_vectors() {
    assert_eq!(hex::encode(sha0(b"")), "f96cea198ad1dd5617ac084a3d92c6107708c0ef");
    assert_eq!(hex::encode(sha0(b"abc")), "0164b8a914cd2a5e74c4f7ff082c4d97f1edf880");
    assert_eq!(
        hex::encode(sha0(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq")),
        "d2516ee1acfa5baf33dfc1c471e438449ef134c8"
    );
}

#[test]
fn test_sha0_million_a_incremental() {
    let mut hasher = LegacySha::sha0();
    let chunk = [b'a'; 1000];
    for _ in 0..1000 {
        hasher.update(&chunk);
    }
    assert_eq!(hex::encode(hasher.finalize()), "3232affa48628a26653b5aaa44541fd90d690603");
}

#[test]
fn test_sha1_vectors() {
    assert_eq!(hex::encode(sha1(b"")), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    assert_eq!(
        hex::encode(sha1(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq")),
        "84983e441c3bd26ebaae4aa1f95129e5e54670f1"
    );
}

#[test]
fn test_legacy_hash_truncation_bug() {
    // only the last code unit of each string differs
    assert_eq!(
        password_hash_legacy("player@example.com", "secret"),
        password_hash_legacy("Player@Example.coX", "secreX")
    );
    assert_ne!(
        password_hash_legacy("player@example.com", "secret"),
        password_hash_legacy("player@example.com", "Xecret")
    );
}

#[test]
fn test_legacy_hash_long_account_name() {
    // 63-character local part; the input spans several SHA-0 blocks
    let name = "LongAssAccountName0123456789012345678901234567890123456789abcde@example.com";
    let digest = password_hash_legacy(name, "correct horse battery staple");
    assert_eq!(hex::encode(digest), "7a48246b68e5fab9c2185ec101c9e9a92ac88d32");
    assert_eq!(
        digest,
        password_hash_legacy(
            "longassaccountname0123456789012345678901234567890123456789abcde@example.coX",
            "correct horse battery staplX"
        )
    );

    let mut input: Vec<u8> = "correct horse battery stapl\0longassaccountname0123456789012345678901234567890123456789abcde@example.co\0"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    assert_eq!(digest, sha0(&input));
    input.truncate(input.len() - 2);
    assert_ne!(digest, sha0(&input));
}

#[test]
fn test_modern_hash_encodings_differ() {
    let utf8 = password_hash_modern("pässword", TextEncoding::Utf8);
    let latin1 = password_hash_modern("pässword", TextEncoding::Latin1);
    assert_ne!(utf8, latin1);
    assert_eq!(byte_swap(utf8), sha1("pässword".as_bytes()));
}

#[test]
fn test_challenge_hash_depends_on_both_challenges() {
    let digest = password_hash_legacy("player@example.com", "secret");
    let reference = challenge_hash(1, 2, &digest);
    assert_ne!(reference, challenge_hash(2, 1, &digest));
    assert_ne!(reference, challenge_hash(1, 3, &digest));
}

fn rc4_hex(key: &[u8], plaintext: &[u8]) -> String {
    let mut data = plaintext.to_vec();
    Rc4::new(key).apply_keystream(&mut data);
    hex::encode(data)
}

#[test]
fn test_rc4_vectors() {
    assert_eq!(rc4_hex(b"Key", b"Plaintext"), "bbf316e8d940af0ad3");
    assert_eq!(rc4_hex(b"Wiki", b"pedia"), "1021bf0420");
    assert_eq!(rc4_hex(b"Secret", b"Attack at dawn"), "45a01f645fc35b383552544b9bf5");
}

#[test]
fn test_rc4_byte_at_a_time() {
    let mut one_shot = b"Attack at dawn".to_vec();
    Rc4::new(b"Secret").apply_keystream(&mut one_shot);

    let mut cipher = Rc4::new(b"Secret");
    let mut streamed = b"Attack at dawn".to_vec();
    for byte in streamed.chunks_mut(1) {
        cipher.apply_keystream(byte);
    }
    assert_eq!(streamed, one_shot);
}

proptest! {
    #[test]
    fn prop_sha1_matches_reference(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let expected: [u8; 20] = Sha1::digest(&data).into();
        prop_assert_eq!(sha1(&data), expected);
    }

    #[test]
    fn prop_byte_swap_involution(digest in any::<[u8; 20]>()) {
        prop_assert_eq!(byte_swap(byte_swap(digest)), digest);
    }

    #[test]
    fn prop_rc4_round_trip(
        key in prop::collection::vec(any::<u8>(), 0..64),
        data in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut buf = data.clone();
        Rc4::new(&key).apply_keystream(&mut buf);
        Rc4::new(&key).apply_keystream(&mut buf);
        prop_assert_eq!(buf, data);
    }
}
