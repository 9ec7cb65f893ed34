use thiserror::Error;

/// All errors that can occur in CredVault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — entry unavailable (wrong key or corrupted data)")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Vault errors ---
    #[error("Invalid vault format: {0}")]
    InvalidFormat(String),

    #[error("Master passphrase verification failed")]
    AuthFailed,

    #[error("Integrity check failed — vault file may be tampered or corrupted")]
    IntegrityMismatch,

    #[error("Entry '{0}' not found")]
    EntryNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VaultError {
    /// Returns `true` when the caller may simply re-prompt for the
    /// passphrase and try again.
    ///
    /// Format and integrity failures mean the file itself is unusable;
    /// retrying with another passphrase cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::AuthFailed)
    }
}

/// Convenience type alias for CredVault results.
pub type Result<T> = std::result::Result<T, VaultError>;
