//! Key derivation: PBKDF2-HMAC-SHA256 passphrase → file key

use gvault_core::config::MIN_PBKDF2_ITERATIONS;
use gvault_core::{VaultError, VaultResult};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE};

/// A 256-bit AES-GCM key derived from a passphrase.
///
/// The raw bytes never leave this crate; the key can only be used through
/// [`crate::encrypt`] and [`crate::decrypt`]. Zeroized on drop.
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters for sealing new blobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Iteration count (default: 100 000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

/// Derive a 256-bit key from a passphrase and salt using PBKDF2-HMAC-SHA256.
///
/// The salt is random per blob and stored in the sealed header (it does not
/// need to be secret).
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> VaultResult<FileKey> {
    if params.iterations == 0 {
        return Err(VaultError::Config("PBKDF2 iteration count is zero".into()));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        params.iterations,
        &mut key,
    );
    Ok(FileKey::from_bytes(key))
}

/// Fresh random salt from the OS CSPRNG.
pub fn random_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Fresh random nonce from the OS CSPRNG.
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

const PASSPHRASE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Length of generated passphrases
pub const GENERATED_PASSPHRASE_LEN: usize = 32;

/// Generate a random 32-character passphrase for a single file.
pub fn generate_passphrase() -> SecretString {
    let mut rng = OsRng;
    let s: String = (0..GENERATED_PASSPHRASE_LEN)
        .map(|_| PASSPHRASE_ALPHABET[rng.gen_range(0..PASSPHRASE_ALPHABET.len())] as char)
        .collect();
    SecretString::from(s)
}
