//! gvault-crypto: client-side encryption for gvault
//!
//! Pipeline: passphrase + random salt → PBKDF2-HMAC-SHA256 → 256-bit key →
//! AES-256-GCM (random 96-bit nonce) → sealed blob.
//!
//! Sealed blob wire format (big-endian length prefix):
//! ```text
//! [4 bytes: header length N][N bytes: UTF-8 JSON header][ciphertext || 16-byte GCM tag]
//! ```
//! The header carries everything needed to decrypt except the passphrase:
//! salt, nonce, iteration count, and the original file name, MIME type and size.

pub mod cipher;
pub mod kdf;
pub mod sealed;

pub use cipher::{decrypt, encrypt};
pub use kdf::{derive_key, generate_passphrase, random_nonce, random_salt, FileKey, KdfParams};
pub use sealed::{seal, unseal, PlainFile, SealedBlob};

/// Size of a derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the per-blob KDF salt
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
