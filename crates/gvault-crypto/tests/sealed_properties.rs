//! Property tests for the sealed blob codec: round-trip, passphrase
//! authentication, tamper detection, and framing robustness.

use gvault_core::VaultError;
use gvault_crypto::sealed::{SealedBlob, LENGTH_PREFIX_SIZE};
use gvault_crypto::{seal, unseal, KdfParams, PlainFile};
use proptest::prelude::*;
use secrecy::SecretString;

fn fast() -> KdfParams {
    KdfParams::new(1_000)
}

fn pass(s: &str) -> SecretString {
    SecretString::from(s)
}

fn header_len(sealed: &[u8]) -> usize {
    u32::from_be_bytes(sealed[..LENGTH_PREFIX_SIZE].try_into().unwrap()) as usize
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_roundtrip_any_bytes(
        data in proptest::collection::vec(any::<u8>(), 0..=2048),
        passphrase in "[ -~]{1,24}",
    ) {
        let file = PlainFile::new("blob.bin", "application/octet-stream", data.clone());
        let sealed = seal(&file, &pass(&passphrase), &fast()).unwrap();
        let opened = unseal(&sealed, &pass(&passphrase)).unwrap();
        prop_assert_eq!(opened.bytes, data);
        prop_assert_eq!(opened.name, "blob.bin");
    }

    #[test]
    fn test_wrong_passphrase_fails_authentication(
        data in proptest::collection::vec(any::<u8>(), 1..=512),
        k1 in "[a-z]{1,12}",
        k2 in "[a-z]{1,12}",
    ) {
        prop_assume!(k1 != k2);
        let file = PlainFile::new("f", "", data);
        let sealed = seal(&file, &pass(&k1), &fast()).unwrap();
        let result = unseal(&sealed, &pass(&k2));
        prop_assert!(matches!(result, Err(VaultError::Integrity(_))));
    }

    #[test]
    fn test_single_bit_flip_in_ciphertext_is_detected(
        data in proptest::collection::vec(any::<u8>(), 1..=512),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let file = PlainFile::new("f", "", data);
        let mut sealed = seal(&file, &pass("k"), &fast()).unwrap();
        let start = LENGTH_PREFIX_SIZE + header_len(&sealed);
        let offset = start + pick.index(sealed.len() - start);
        sealed[offset] ^= 1 << bit;

        let result = unseal(&sealed, &pass("k"));
        prop_assert!(matches!(result, Err(VaultError::Integrity(_))));
    }

    #[test]
    fn test_truncation_inside_header_is_format_error(
        data in proptest::collection::vec(any::<u8>(), 0..=256),
        pick in any::<prop::sample::Index>(),
    ) {
        let file = PlainFile::new("f", "", data);
        let sealed = seal(&file, &pass("k"), &fast()).unwrap();
        let cut = pick.index(LENGTH_PREFIX_SIZE + header_len(&sealed));

        let result = unseal(&sealed[..cut], &pass("k"));
        prop_assert!(matches!(result, Err(VaultError::Format(_))));
    }

    #[test]
    fn test_arbitrary_garbage_never_panics(data in proptest::collection::vec(any::<u8>(), 0..=128)) {
        let _ = SealedBlob::from_bytes(&data);
    }
}

#[test]
fn test_empty_file_roundtrip() {
    let file = PlainFile::new("empty.txt", "text/plain", Vec::new());
    let sealed = seal(&file, &pass("correct-horse"), &fast()).unwrap();
    let opened = unseal(&sealed, &pass("correct-horse")).unwrap();

    assert_eq!(opened.name, "empty.txt");
    assert_eq!(opened.mime_type, "text/plain");
    assert!(opened.bytes.is_empty());
}

#[test]
fn test_notes_wrong_then_right_passphrase() {
    let file = PlainFile::new("notes.txt", "text/plain", b"hello".to_vec());
    let sealed = seal(&file, &pass("p1"), &fast()).unwrap();

    let wrong = unseal(&sealed, &pass("p2"));
    assert!(matches!(wrong, Err(VaultError::Integrity(_))));

    let right = unseal(&sealed, &pass("p1")).unwrap();
    assert_eq!(right.bytes, b"hello");
    assert_eq!(right.name, "notes.txt");
}

#[test]
fn test_default_iterations_roundtrip() {
    let file = PlainFile::new("slow.txt", "text/plain", b"full strength".to_vec());
    let sealed = seal(&file, &pass("k"), &KdfParams::default()).unwrap();

    let blob = SealedBlob::from_bytes(&sealed).unwrap();
    assert_eq!(blob.iterations, 100_000);
    assert_eq!(unseal(&sealed, &pass("k")).unwrap(), file);
}
