//! Authenticated field cipher.
//!
//! Every secret field is stored as a self-contained text token:
//!
//! ```text
//! base64url( version: 1 | timestamp: 8 BE | iv: 12 | ciphertext | tag: 32 )
//! ```
//!
//! - **version** is `0x80`; any other value is rejected.
//! - **timestamp** is the Unix time of encryption (seconds).
//! - **iv** is a fresh random AES-256-GCM nonce per call, so the same
//!   plaintext never encrypts to the same token twice.
//! - **tag** is HMAC-SHA256 over everything before it, keyed with a tag
//!   key expanded from the encryption subkey. It is checked in constant
//!   time before any decryption is attempted.
//!
//! All failures collapse into `DecryptionFailed` so callers cannot tell
//! a wrong key from corrupted data.

use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::keys::EncryptionKey;
use crate::errors::{Result, VaultError};

/// Token format marker.
const VERSION: u8 = 0x80;

/// Size of the AES-256-GCM nonce in bytes.
const IV_LEN: usize = 12;

/// Size of the big-endian timestamp.
const TIMESTAMP_LEN: usize = 8;

/// Size of the HMAC-SHA256 tag.
const TAG_LEN: usize = 32;

/// Version + timestamp.
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN;

/// Smallest possible token: header, IV, GCM tag (16) and HMAC tag.
const MIN_TOKEN_LEN: usize = HEADER_LEN + IV_LEN + 16 + TAG_LEN;

/// Tolerated clock skew for tokens stamped in the future.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Encrypts and decrypts single field values under one encryption key.
pub struct FieldCipher {
    cipher_key: [u8; 32],
    tag_key: [u8; 32],
    ttl: Option<Duration>,
}

impl FieldCipher {
    /// Build a cipher from the encryption subkey.
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        Ok(Self {
            cipher_key: key.derive_cipher_key()?,
            tag_key: key.derive_tag_key()?,
            ttl: None,
        })
    }

    /// Reject tokens older than `ttl` on decryption.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Encrypt `plaintext` into a URL-safe base64 token.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.encrypt_at(plaintext, Utc::now().timestamp())
    }

    fn encrypt_at(&self, plaintext: &str, timestamp: i64) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.cipher_key)
            .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

        let iv = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut header = [0u8; HEADER_LEN];
        header[0] = VERSION;
        header[1..].copy_from_slice(&timestamp.to_be_bytes());

        let ciphertext = cipher
            .encrypt(
                &iv,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &header,
                },
            )
            .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

        let mut token = Vec::with_capacity(HEADER_LEN + IV_LEN + ciphertext.len() + TAG_LEN);
        token.extend_from_slice(&header);
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let tag = self.tag(&token)?;
        token.extend_from_slice(&tag);

        Ok(URL_SAFE.encode(&token))
    }

    /// Decrypt a token produced by `encrypt`.
    pub fn decrypt(&self, token: &str) -> Result<Zeroizing<String>> {
        let data = URL_SAFE
            .decode(token.trim())
            .map_err(|_| VaultError::DecryptionFailed)?;

        if data.len() < MIN_TOKEN_LEN || data[0] != VERSION {
            return Err(VaultError::DecryptionFailed);
        }

        let (signed, tag) = data.split_at(data.len() - TAG_LEN);
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.tag_key)
            .map_err(|_| VaultError::DecryptionFailed)?;
        mac.update(signed);
        mac.verify_slice(tag)
            .map_err(|_| VaultError::DecryptionFailed)?;

        let (header, rest) = signed.split_at(HEADER_LEN);
        let mut ts_bytes = [0u8; TIMESTAMP_LEN];
        ts_bytes.copy_from_slice(&header[1..]);
        self.check_timestamp(i64::from_be_bytes(ts_bytes))?;

        let (iv, ciphertext) = rest.split_at(IV_LEN);
        let cipher =
            Aes256Gcm::new_from_slice(&self.cipher_key).map_err(|_| VaultError::DecryptionFailed)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(iv),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| VaultError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|e| {
                let mut bad_bytes = e.into_bytes();
                bad_bytes.zeroize();
                VaultError::DecryptionFailed
            })
    }

    fn check_timestamp(&self, timestamp: i64) -> Result<()> {
        let Some(ttl) = self.ttl else {
            return Ok(());
        };
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        if timestamp > now.saturating_add(MAX_CLOCK_SKEW_SECS)
            || now.saturating_sub(timestamp) > ttl_secs
        {
            return Err(VaultError::DecryptionFailed);
        }
        Ok(())
    }

    fn tag(&self, data: &[u8]) -> Result<[u8; TAG_LEN]> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.tag_key)
            .map_err(|e| VaultError::EncryptionFailed(format!("invalid tag key: {e}")))?;
        mac.update(data);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }
}

impl Drop for FieldCipher {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.tag_key.zeroize();
    }
}
