//! AES-256-GCM authenticated encryption of raw bytes
//!
//! Output is `ciphertext || 16-byte tag`; the nonce travels separately in the
//! sealed header.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use gvault_core::{VaultError, VaultResult};

use crate::kdf::FileKey;
use crate::NONCE_SIZE;

/// Encrypt `plaintext` under `key` and `nonce`.
///
/// Returns `plaintext.len() + TAG_SIZE` bytes. Callers must never reuse a
/// nonce with the same key.
pub fn encrypt(plaintext: &[u8], key: &FileKey, nonce: &[u8; NONCE_SIZE]) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| VaultError::Other(anyhow::anyhow!("AES-256-GCM encryption failed: {e}")))
}

/// Decrypt and authenticate `ciphertext` (which includes the tag).
///
/// Any wrong key, wrong nonce, or modified byte yields
/// [`VaultError::Integrity`]; no partial plaintext is ever returned.
pub fn decrypt(ciphertext: &[u8], key: &FileKey, nonce: &[u8; NONCE_SIZE]) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| {
        VaultError::Integrity("authentication failed: wrong passphrase or corrupted data".into())
    })
}
