//! Password hashing and subkey derivation using Argon2id.
//!
//! Two distinct uses of the same memory-hard function:
//! - a PHC-format **verification hash** of the master passphrase, used
//!   only to check a candidate passphrase;
//! - raw **subkey derivation**, where the first bytes of an Argon2id
//!   output (salted per purpose) become the encryption or integrity key.
//!
//! Costs are explicit configuration (`Argon2Params`) handed to `Kdf`,
//! never a process-wide singleton.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroize;

use super::keys::{EncryptionKey, IntegrityKey, ENCRYPTION_KEY_LEN, INTEGRITY_KEY_LEN};
use crate::errors::{Result, VaultError};

/// Length of the encryption salt in bytes.
pub const ENCRYPTION_SALT_LEN: usize = 16;

/// Length of the integrity salt in bytes.
pub const INTEGRITY_SALT_LEN: usize = 32;

/// Random salt length used inside the verification hash.
const VERIFY_SALT_LEN: usize = 16;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Minimum raw Argon2 output length in bytes.
pub const MIN_HASH_LEN: usize = 64;

/// Maximum raw Argon2 output length in bytes.
pub const MAX_HASH_LEN: usize = 1_024;

/// Configurable Argon2id parameters.
///
/// These map 1:1 to the fields in `Settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 131 072 = 128 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 6).
    pub iterations: u32,
    /// Parallelism lanes (default: 6).
    pub parallelism: u32,
    /// Raw output length in bytes (default: 64).
    pub hash_len: usize,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 131_072,
            iterations: 6,
            parallelism: 6,
            hash_len: MIN_HASH_LEN,
        }
    }
}

impl Argon2Params {
    /// Recover the costs encoded in a PHC verification hash.
    ///
    /// The output length is not taken from the hash: the vault file
    /// stores it separately as `hash_len`.
    pub fn from_verify_hash(verify_hash: &str, hash_len: usize) -> Result<Self> {
        let parsed = parse_verify_hash(verify_hash)?;
        let params = Params::try_from(&parsed)
            .map_err(|e| VaultError::InvalidFormat(format!("verify hash params: {e}")))?;
        Ok(Self {
            memory_kib: params.m_cost(),
            iterations: params.t_cost(),
            parallelism: params.p_cost(),
            hash_len,
        })
    }

    /// Enforce minimum parameters to prevent dangerously weak settings.
    fn validate(&self) -> Result<()> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(VaultError::KeyDerivationFailed(format!(
                "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                self.memory_kib
            )));
        }
        if self.iterations < 1 {
            return Err(VaultError::KeyDerivationFailed(
                "Argon2 iterations must be at least 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(VaultError::KeyDerivationFailed(
                "Argon2 parallelism must be at least 1".into(),
            ));
        }
        if !(MIN_HASH_LEN..=MAX_HASH_LEN).contains(&self.hash_len) {
            return Err(VaultError::KeyDerivationFailed(format!(
                "Argon2 hash_len must be between {MIN_HASH_LEN} and {MAX_HASH_LEN} (got {})",
                self.hash_len
            )));
        }
        Ok(())
    }
}

/// The key-derivation engine for one vault.
#[derive(Debug, Clone)]
pub struct Kdf {
    params: Argon2Params,
}

impl Kdf {
    /// Build a KDF, rejecting parameters below the safety floor.
    pub fn new(params: Argon2Params) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &Argon2Params {
        &self.params
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(self.params.hash_len),
        )
        .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash the passphrase into a PHC string (`$argon2id$...`).
    ///
    /// A fresh random salt is embedded in the string; it is unrelated to
    /// the encryption and integrity salts.
    pub fn hash_for_verification(&self, passphrase: &str) -> Result<String> {
        let mut salt_bytes = [0u8; VERIFY_SALT_LEN];
        rand::rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| VaultError::KeyDerivationFailed(format!("salt encoding: {e}")))?;

        let hash = self
            .argon2()?
            .hash_password(passphrase.as_bytes(), &salt)
            .map_err(|e| VaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

        Ok(hash.to_string())
    }

    /// Check `candidate` against a stored verification hash.
    ///
    /// Returns `Ok(false)` on mismatch and `InvalidFormat` when the hash
    /// string itself cannot be parsed. The costs embedded in the hash
    /// are used, not this KDF's configured ones.
    pub fn verify(&self, candidate: &str, verify_hash: &str) -> Result<bool> {
        let parsed = parse_verify_hash(verify_hash)?;
        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(VaultError::InvalidFormat(format!("verify hash: {e}"))),
        }
    }

    /// Derive the 32-byte AES-256 encryption subkey.
    pub fn derive_encryption_key(&self, passphrase: &str, salt: &[u8]) -> Result<EncryptionKey> {
        let mut raw = self.raw_hash(passphrase, salt, ENCRYPTION_KEY_LEN)?;
        let mut bytes = [0u8; ENCRYPTION_KEY_LEN];
        bytes.copy_from_slice(&raw[..ENCRYPTION_KEY_LEN]);
        raw.zeroize();
        let key = EncryptionKey::new(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Derive the 16-byte HMAC integrity subkey.
    pub fn derive_integrity_key(&self, passphrase: &str, salt: &[u8]) -> Result<IntegrityKey> {
        let mut raw = self.raw_hash(passphrase, salt, INTEGRITY_KEY_LEN)?;
        let mut bytes = [0u8; INTEGRITY_KEY_LEN];
        bytes.copy_from_slice(&raw[..INTEGRITY_KEY_LEN]);
        raw.zeroize();
        let key = IntegrityKey::new(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Run Argon2id with `hash_len` output bytes and make sure at least
    /// `needed` of them are available.
    fn raw_hash(&self, passphrase: &str, salt: &[u8], needed: usize) -> Result<Vec<u8>> {
        if salt.is_empty() {
            return Err(VaultError::KeyDerivationFailed("salt is missing".into()));
        }

        let argon2 = self.argon2()?;
        let mut out = vec![0u8; self.params.hash_len];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut out)
            .map_err(|e| VaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

        if out.len() < needed {
            out.zeroize();
            return Err(VaultError::KeyDerivationFailed(format!(
                "Argon2 output too short: need {needed} bytes"
            )));
        }
        Ok(out)
    }
}

/// Check that `verify_hash` is a complete Argon2id PHC string.
///
/// Runs at parse time so a malformed hash is a format error and never
/// reads as a wrong passphrase.
pub fn check_verify_hash(verify_hash: &str) -> Result<()> {
    parse_verify_hash(verify_hash).map(|_| ())
}

fn parse_verify_hash(verify_hash: &str) -> Result<PasswordHash<'_>> {
    if !verify_hash.starts_with("$argon2id$") {
        return Err(VaultError::InvalidFormat(
            "verify hash is not an argon2id PHC string".into(),
        ));
    }
    let parsed = PasswordHash::new(verify_hash)
        .map_err(|e| VaultError::InvalidFormat(format!("verify hash: {e}")))?;
    // The PHC grammar allows both segments to be absent.
    if parsed.salt.is_none() || parsed.hash.is_none() {
        return Err(VaultError::InvalidFormat(
            "verify hash has no salt or hash segment".into(),
        ));
    }
    Ok(parsed)
}

/// Generate a random 16-byte salt for the encryption subkey.
pub fn generate_encryption_salt() -> [u8; ENCRYPTION_SALT_LEN] {
    let mut salt = [0u8; ENCRYPTION_SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Generate a random 32-byte salt for the integrity subkey.
pub fn generate_integrity_salt() -> [u8; INTEGRITY_SALT_LEN] {
    let mut salt = [0u8; INTEGRITY_SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}
