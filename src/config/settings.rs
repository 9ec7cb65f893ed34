use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::Argon2Params;
use crate::errors::{Result, VaultError};

/// Project-level configuration, loaded from `.credvault.toml`.
///
/// Every field has a sensible default so CredVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Vault file name (relative to the project directory).
    #[serde(default = "default_vault_file")]
    pub vault_file: String,

    /// Argon2 memory cost in KiB (default: 128 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 6).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 6).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Raw Argon2 output length in bytes (default: 64).
    #[serde(default = "default_argon2_hash_len")]
    pub argon2_hash_len: usize,

    /// Maximum age of an encrypted field in seconds. Unset means
    /// fields never expire.
    #[serde(default)]
    pub token_ttl_secs: Option<u64>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_file() -> String {
    "my_key.json".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    131_072 // 128 MB
}

fn default_argon2_iterations() -> u32 {
    6
}

fn default_argon2_parallelism() -> u32 {
    6
}

fn default_argon2_hash_len() -> usize {
    64
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_file: default_vault_file(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            argon2_hash_len: default_argon2_hash_len(),
            token_ttl_secs: None,
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".credvault.toml";

    /// Load settings from `<project_dir>/.credvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Build the full path to the vault file.
    ///
    /// Example: `project_dir/my_key.json`
    pub fn vault_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.vault_file)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
            hash_len: self.argon2_hash_len,
        }
    }

    pub fn token_ttl(&self) -> Option<Duration> {
        self.token_ttl_secs.map(Duration::from_secs)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
