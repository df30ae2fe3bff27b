//! Sealed blob codec
//!
//! A sealed blob is one self-describing object: a length-prefixed JSON header
//! followed immediately by the AES-GCM ciphertext. The header keys match the
//! blobs written by the browser client (`fileName`, `fileType`,
//! `fileSize`, `encryptedSize`, `timestamp`, `salt`, `iv`), plus an optional
//! `iterations` that defaults to 100 000 when absent.

use gvault_core::config::MIN_PBKDF2_ITERATIONS;
use gvault_core::types::now_millis;
use gvault_core::{VaultError, VaultResult};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cipher::{decrypt, encrypt};
use crate::kdf::{derive_key, random_nonce, random_salt, KdfParams};
use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Size of the big-endian header length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Upper bound on the JSON header; anything larger is treated as corrupt.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Upper bound on the iteration count a header may request.
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// A plaintext file: the input to [`seal`] and the output of [`unseal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PlainFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// JSON header as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHeader {
    file_name: String,
    #[serde(default)]
    file_type: String,
    file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_size: Option<u64>,
    #[serde(default)]
    timestamp: u64,
    salt: Vec<u8>,
    iv: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
}

/// Parsed sealed blob: encryption parameters, original file facts, and the
/// ciphertext. Parsing never touches key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub iterations: u32,
    pub original_name: String,
    pub original_mime_type: String,
    pub original_size: u64,
    pub created_at_millis: u64,
    /// AES-GCM ciphertext including the trailing tag
    pub ciphertext: Vec<u8>,
}

impl SealedBlob {
    /// Serialize to `[u32 BE header len][header JSON][ciphertext]`.
    pub fn to_bytes(&self) -> VaultResult<Vec<u8>> {
        let header = WireHeader {
            file_name: self.original_name.clone(),
            file_type: self.original_mime_type.clone(),
            file_size: self.original_size,
            encrypted_size: Some(self.ciphertext.len() as u64),
            timestamp: self.created_at_millis,
            salt: self.salt.to_vec(),
            iv: self.nonce.to_vec(),
            iterations: Some(self.iterations),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| VaultError::Format(format!("serializing sealed header: {e}")))?;
        if header_json.len() > MAX_HEADER_LEN {
            return Err(VaultError::Format(format!(
                "sealed header is {} bytes (limit {MAX_HEADER_LEN})",
                header_json.len()
            )));
        }

        let mut out =
            Vec::with_capacity(LENGTH_PREFIX_SIZE + header_json.len() + self.ciphertext.len());
        out.extend_from_slice(&(header_json.len() as u32).to_be_bytes());
        out.extend_from_slice(&header_json);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Parse the framing and header. All failures are [`VaultError::Format`].
    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        if data.len() < LENGTH_PREFIX_SIZE {
            return Err(VaultError::Format(format!(
                "sealed blob too short: {} bytes, no length prefix",
                data.len()
            )));
        }
        let (prefix, rest) = data.split_at(LENGTH_PREFIX_SIZE);
        let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

        if header_len == 0 || header_len > MAX_HEADER_LEN {
            return Err(VaultError::Format(format!(
                "implausible sealed header length: {header_len}"
            )));
        }
        if rest.len() < header_len {
            return Err(VaultError::Format(format!(
                "sealed blob truncated: header declares {header_len} bytes, {} present",
                rest.len()
            )));
        }
        let (header_bytes, ciphertext) = rest.split_at(header_len);

        let header: WireHeader = serde_json::from_slice(header_bytes)
            .map_err(|e| VaultError::Format(format!("parsing sealed header: {e}")))?;

        let salt: [u8; SALT_SIZE] = header.salt.as_slice().try_into().map_err(|_| {
            VaultError::Format(format!(
                "salt must be {SALT_SIZE} bytes, header has {}",
                header.salt.len()
            ))
        })?;
        let nonce: [u8; NONCE_SIZE] = header.iv.as_slice().try_into().map_err(|_| {
            VaultError::Format(format!(
                "nonce must be {NONCE_SIZE} bytes, header has {}",
                header.iv.len()
            ))
        })?;

        let iterations = header.iterations.unwrap_or(MIN_PBKDF2_ITERATIONS);
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(VaultError::Format(format!(
                "iteration count {iterations} out of range"
            )));
        }

        if ciphertext.len() < TAG_SIZE {
            return Err(VaultError::Format(format!(
                "ciphertext is {} bytes, shorter than the {TAG_SIZE}-byte tag",
                ciphertext.len()
            )));
        }
        if let Some(declared) = header.encrypted_size {
            if declared != ciphertext.len() as u64 {
                return Err(VaultError::Format(format!(
                    "header declares {declared} ciphertext bytes, {} present",
                    ciphertext.len()
                )));
            }
        }

        Ok(Self {
            salt,
            nonce,
            iterations,
            original_name: header.file_name,
            original_mime_type: header.file_type,
            original_size: header.file_size,
            created_at_millis: header.timestamp,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt `file` under `passphrase` into a single sealed buffer.
///
/// A fresh salt and nonce are drawn for every call.
pub fn seal(file: &PlainFile, passphrase: &SecretString, params: &KdfParams) -> VaultResult<Vec<u8>> {
    let salt = random_salt();
    let nonce = random_nonce();
    let key = derive_key(passphrase, &salt, params)?;
    let ciphertext = encrypt(&file.bytes, &key, &nonce)?;

    let blob = SealedBlob {
        salt,
        nonce,
        iterations: params.iterations,
        original_name: file.name.clone(),
        original_mime_type: file.mime_type.clone(),
        original_size: file.size(),
        created_at_millis: now_millis(),
        ciphertext,
    };

    let bytes = blob.to_bytes()?;
    debug!(
        name = %file.name,
        plain_bytes = file.size(),
        sealed_bytes = bytes.len(),
        "sealed"
    );
    Ok(bytes)
}

/// Parse, derive the key from the embedded salt, and decrypt.
///
/// Wrong passphrase or tampered ciphertext → [`VaultError::Integrity`];
/// broken framing or a size mismatch → [`VaultError::Format`].
pub fn unseal(data: &[u8], passphrase: &SecretString) -> VaultResult<PlainFile> {
    let blob = SealedBlob::from_bytes(data)?;
    let key = derive_key(passphrase, &blob.salt, &KdfParams::new(blob.iterations))?;
    let bytes = decrypt(&blob.ciphertext, &key, &blob.nonce)?;

    if bytes.len() as u64 != blob.original_size {
        return Err(VaultError::Format(format!(
            "decrypted {} bytes but header declares {}",
            bytes.len(),
            blob.original_size
        )));
    }

    debug!(name = %blob.original_name, bytes = bytes.len(), "unsealed");
    Ok(PlainFile {
        name: blob.original_name,
        mime_type: blob.original_mime_type,
        bytes,
    })
}
