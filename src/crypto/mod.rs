//! Cryptographic primitives for CredVault.
//!
//! This module provides:
//! - Argon2id passphrase verification and subkey derivation (`kdf`)
//! - Zeroizing subkey wrappers with HKDF expansion (`keys`)
//! - The authenticated field cipher for secret values (`encryption`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{FieldCipher, Kdf, Argon2Params, ...};
pub use encryption::FieldCipher;
pub use kdf::{generate_encryption_salt, generate_integrity_salt, Argon2Params, Kdf};
pub use keys::{EncryptionKey, IntegrityKey};
