//! Subkey wrappers and HKDF-based expansion.
//!
//! The Argon2id subsystem yields two independent subkeys:
//! - an **encryption key** (32 bytes) that protects secret fields;
//! - an **integrity key** (16 bytes) that authenticates the vault file.
//!
//! The field cipher needs two keys of its own (AES and tag). Both are
//! expanded from the encryption key with HKDF-SHA256 under distinct
//! `info` strings so neither can be derived from the other.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

/// Length of the encryption subkey (AES-256).
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Length of the integrity subkey (HMAC key).
pub const INTEGRITY_KEY_LEN: usize = 16;

/// Length of the HKDF-expanded cipher and tag keys.
const FIELD_KEY_LEN: usize = 32;

/// The encryption subkey, zeroed when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct EncryptionKey {
    bytes: [u8; ENCRYPTION_KEY_LEN],
}

impl EncryptionKey {
    pub fn new(bytes: [u8; ENCRYPTION_KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_LEN] {
        &self.bytes
    }

    /// Expand into the AES-256 key used by the field cipher.
    pub fn derive_cipher_key(&self) -> Result<[u8; FIELD_KEY_LEN]> {
        hkdf_derive(&self.bytes, b"credvault-field-cipher")
    }

    /// Expand into the HMAC key that tags field tokens.
    pub fn derive_tag_key(&self) -> Result<[u8; FIELD_KEY_LEN]> {
        hkdf_derive(&self.bytes, b"credvault-field-tag")
    }
}

/// The integrity subkey, zeroed when dropped.
///
/// Derived once when the vault is created, then persisted encrypted
/// under the field cipher. Loads decrypt it instead of re-deriving.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct IntegrityKey {
    bytes: [u8; INTEGRITY_KEY_LEN],
}

impl IntegrityKey {
    pub fn new(bytes: [u8; INTEGRITY_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Rebuild a key from decrypted bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; INTEGRITY_KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultError::InvalidFormat(format!(
                "integrity key must be {INTEGRITY_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(array))
    }

    pub fn as_bytes(&self) -> &[u8; INTEGRITY_KEY_LEN] {
        &self.bytes
    }
}

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The extract step uses no salt: the input already came out of
/// Argon2id and carries full entropy.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; FIELD_KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; FIELD_KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}
