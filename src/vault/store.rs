//! High-level vault operations.
//!
//! `VaultStore` owns the in-memory document and the derived key
//! material, and wraps the format and crypto layers so callers work
//! with plain method calls like `store.add_entry(entry, passphrase)`.
//!
//! Every call that mutates the vault or reveals a secret takes the
//! master passphrase again and re-verifies it; opening the vault once
//! does not authorize later calls. A failed re-verification returns
//! `AuthFailed` and leaves memory and disk untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, error, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::Settings;
use crate::crypto::kdf::{generate_encryption_salt, generate_integrity_salt, Argon2Params, Kdf};
use crate::crypto::{FieldCipher, IntegrityKey};
use crate::errors::{Result, VaultError};
use crate::strength::password_level;

use super::entry::{
    Entry, EntryUpdate, NewEntry, QuickEntry, RedactedEntry, RedactedQuickEntry, RevealedEntry,
    RevealedQuickEntry,
};
use super::format::{self, CryptoParams, VaultDocument, PLACEHOLDER_MAC};

/// The main vault handle. Create one with `VaultStore::open`, then use
/// its methods to manage entries.
///
/// One store per vault file: nothing coordinates two processes writing
/// the same path, and the last writer wins.
pub struct VaultStore {
    /// Path to the vault file on disk.
    path: PathBuf,

    /// The parsed document; secrets inside are ciphertext.
    document: VaultDocument,

    /// KDF used for passphrase re-verification.
    kdf: Kdf,

    /// Field cipher keyed from the encryption subkey (zeroized on drop).
    cipher: FieldCipher,

    /// Integrity subkey (zeroized on drop).
    integrity_key: IntegrityKey,
}

impl VaultStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Open the vault at `path`, creating it if no file exists.
    ///
    /// `params` only applies to a new vault; an existing vault reopens
    /// with the costs recorded in its verification hash.
    ///
    /// Fails with `AuthFailed` on a wrong passphrase, `InvalidFormat`
    /// for a malformed file and `IntegrityMismatch` when the file was
    /// modified outside this store.
    pub fn open(path: &Path, passphrase: &str, params: &Argon2Params) -> Result<Self> {
        Self::open_with_ttl(path, passphrase, params, None)
    }

    /// Open the vault described by `settings` inside `project_dir`.
    pub fn open_with_settings(
        project_dir: &Path,
        passphrase: &str,
        settings: &Settings,
    ) -> Result<Self> {
        Self::open_with_ttl(
            &settings.vault_path(project_dir),
            passphrase,
            &settings.argon2_params(),
            settings.token_ttl(),
        )
    }

    /// Like `open`, but entry secrets older than `ttl` fail to decrypt.
    pub fn open_with_ttl(
        path: &Path,
        passphrase: &str,
        params: &Argon2Params,
        ttl: Option<Duration>,
    ) -> Result<Self> {
        if path.exists() {
            Self::load(path, passphrase, ttl)
        } else {
            Self::create(path, passphrase, params, ttl)
        }
    }

    /// Initialize a brand-new vault file.
    fn create(
        path: &Path,
        passphrase: &str,
        params: &Argon2Params,
        ttl: Option<Duration>,
    ) -> Result<Self> {
        let kdf = Kdf::new(*params)?;

        // 1. Verification hash (its own random salt, never used for keys).
        let verify_hash = kdf.hash_for_verification(passphrase)?;

        // 2. Independent salts for the two subkeys.
        let encryption_salt = generate_encryption_salt();
        let integrity_salt = generate_integrity_salt();

        // 3. Derive both subkeys.
        let encryption_key = kdf.derive_encryption_key(passphrase, &encryption_salt)?;
        let integrity_key = kdf.derive_integrity_key(passphrase, &integrity_salt)?;
        let cipher = field_cipher(FieldCipher::new(&encryption_key)?, ttl);
        drop(encryption_key);

        // 4. Persist the integrity key only in encrypted form.
        let key_b64 = Zeroizing::new(BASE64.encode(integrity_key.as_bytes()));
        let encrypted_integrity_key = cipher.encrypt(&key_b64)?;

        let document = VaultDocument {
            params: CryptoParams {
                verify_hash,
                hash_len: params.hash_len,
                encryption_salt: encryption_salt.to_vec(),
                integrity_salt: integrity_salt.to_vec(),
                encrypted_integrity_key,
                integrity_mac: PLACEHOLDER_MAC.to_string(),
            },
            items: Default::default(),
            frequent_items: Default::default(),
        };

        let mut store = Self {
            path: path.to_path_buf(),
            document: document.clone(),
            kdf,
            cipher,
            integrity_key,
        };

        // 5. Seal and write the empty vault.
        store.commit(document)?;
        debug!(path = %path.display(), "created new vault");

        Ok(store)
    }

    /// Load an existing vault, verifying passphrase and integrity.
    fn load(path: &Path, passphrase: &str, ttl: Option<Duration>) -> Result<Self> {
        // 1. Parse and validate; every params field must be present.
        let document = format::read_vault(path)?;
        let params = &document.params;

        // 2. Verify the passphrase with the costs recorded in the file.
        let stored = Argon2Params::from_verify_hash(&params.verify_hash, params.hash_len)?;
        let kdf = Kdf::new(stored).map_err(|e| VaultError::InvalidFormat(e.to_string()))?;
        if !kdf.verify(passphrase, &params.verify_hash)? {
            warn!(path = %path.display(), "master passphrase rejected");
            return Err(VaultError::AuthFailed);
        }

        // 3. Re-derive the encryption subkey from the stored salt.
        let encryption_key = kdf.derive_encryption_key(passphrase, &params.encryption_salt)?;
        let key_cipher = FieldCipher::new(&encryption_key)?;
        let cipher = field_cipher(FieldCipher::new(&encryption_key)?, ttl);
        drop(encryption_key);

        // 4. Recover the integrity key. A token that does not decrypt
        //    after the passphrase checked out has been tampered with.
        let key_b64 = key_cipher
            .decrypt(&params.encrypted_integrity_key)
            .map_err(|_| VaultError::IntegrityMismatch)?;
        let mut key_bytes = BASE64
            .decode(key_b64.as_bytes())
            .map_err(|_| VaultError::InvalidFormat("integrity key is not base64".into()))?;
        let integrity_key = IntegrityKey::from_slice(&key_bytes);
        key_bytes.zeroize();
        let integrity_key = integrity_key?;

        // 5. Verify the whole-file MAC.
        format::verify_mac(&document, &integrity_key)?;

        debug!(
            path = %path.display(),
            entries = document.items.len(),
            "opened vault"
        );

        Ok(Self {
            path: path.to_path_buf(),
            document,
            kdf,
            cipher,
            integrity_key,
        })
    }

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------

    /// Check a candidate master passphrase. No side effects.
    pub fn verify_master_key(&self, candidate: &str) -> bool {
        self.kdf
            .verify(candidate, &self.document.params.verify_hash)
            .unwrap_or(false)
    }

    fn reauthorize(&self, passphrase: &str, operation: &'static str) -> Result<()> {
        if self.verify_master_key(passphrase) {
            Ok(())
        } else {
            warn!(operation, "master passphrase re-verification failed");
            Err(VaultError::AuthFailed)
        }
    }

    // ------------------------------------------------------------------
    // Entry operations
    // ------------------------------------------------------------------

    /// Add a new entry and return its assigned ID.
    ///
    /// The ID is one past the largest existing numeric ID ("1" for an
    /// empty vault). The strength level is scored on the plaintext
    /// before it is encrypted.
    pub fn add_entry(&mut self, mut input: NewEntry, passphrase: &str) -> Result<String> {
        self.reauthorize(passphrase, "add_entry")?;

        let strength_level = password_level(&input.secret);
        let secret = self.cipher.encrypt(&input.secret);
        input.secret.zeroize();
        let secret = secret?;

        let id = self.document.next_id();
        let entry = Entry {
            id: id.clone(),
            strength_level,
            url: input.url,
            username: input.username,
            secret,
            linked_url: input.linked_url,
            note: input.note,
        };

        let mut next = self.document.clone();
        next.items.insert(id.clone(), entry);
        self.commit(next)?;

        debug!(id = %id, "added entry");
        Ok(id)
    }

    /// Update an existing entry in place.
    ///
    /// Fields left as `None` keep their stored values. A new secret is
    /// re-scored and re-encrypted; without one the old ciphertext and
    /// strength level are kept.
    pub fn update_entry(
        &mut self,
        id: &str,
        mut update: EntryUpdate,
        passphrase: &str,
    ) -> Result<String> {
        self.reauthorize(passphrase, "update_entry")?;

        let mut entry = self
            .document
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;

        if let Some(secret) = update.secret.as_mut() {
            entry.strength_level = password_level(secret);
            let token = self.cipher.encrypt(secret);
            secret.zeroize();
            entry.secret = token?;
        }
        if let Some(url) = update.url.take() {
            entry.url = url;
        }
        if let Some(username) = update.username.take() {
            entry.username = username;
        }
        if let Some(linked_url) = update.linked_url.take() {
            entry.linked_url = linked_url;
        }
        if let Some(note) = update.note.take() {
            entry.note = note;
        }

        let mut next = self.document.clone();
        next.items.insert(id.to_string(), entry);
        self.commit(next)?;

        debug!(id, "updated entry");
        Ok(id.to_string())
    }

    /// Remove an entry. Returns whether anything was removed.
    pub fn delete_entry(&mut self, id: &str, passphrase: &str) -> Result<bool> {
        self.reauthorize(passphrase, "delete_entry")?;

        if !self.document.items.contains_key(id) {
            return Ok(false);
        }

        let mut next = self.document.clone();
        next.items.remove(id);
        self.commit(next)?;

        debug!(id, "deleted entry");
        Ok(true)
    }

    /// Return a copy of the entry with its secret decrypted.
    ///
    /// A missing entry and an entry whose secret fails to decrypt both
    /// come back as `None`; the latter is logged.
    pub fn get_entry(&self, id: &str, passphrase: &str) -> Result<Option<RevealedEntry>> {
        self.reauthorize(passphrase, "get_entry")?;

        let Some(entry) = self.document.items.get(id) else {
            return Ok(None);
        };

        match self.cipher.decrypt(&entry.secret) {
            Ok(plaintext) => Ok(Some(RevealedEntry {
                id: entry.id.clone(),
                strength_level: entry.strength_level,
                url: entry.url.clone(),
                username: entry.username.clone(),
                secret: plaintext.as_str().to_owned(),
                linked_url: entry.linked_url.clone(),
                note: entry.note.clone(),
            })),
            Err(e) => {
                error!(id, error = %e, "entry secret is unavailable");
                Ok(None)
            }
        }
    }

    /// List every entry without its secret, ordered by numeric ID.
    ///
    /// Needs no passphrase: nothing secret is returned.
    pub fn list_redacted_entries(&self) -> Vec<RedactedEntry> {
        let mut list: Vec<RedactedEntry> =
            self.document.items.values().map(RedactedEntry::from).collect();
        list.sort_by_key(|e| e.id.parse::<u64>().unwrap_or(u64::MAX));
        list
    }

    // ------------------------------------------------------------------
    // Quick entries
    // ------------------------------------------------------------------

    /// List quick entries (without secrets) in the given strength tier,
    /// or all of them when `tier` is `None`.
    pub fn quick_entries(&self, tier: Option<u8>) -> Vec<RedactedQuickEntry> {
        self.document
            .frequent_items
            .iter()
            .filter(|(_, q)| tier.map_or(true, |t| q.strength_level == t))
            .map(|(key, q)| RedactedQuickEntry::new(key, q))
            .collect()
    }

    /// Store a quick entry under `key`, replacing any existing one.
    pub fn set_quick_entry(
        &mut self,
        key: &str,
        secret: &str,
        note: &str,
        passphrase: &str,
    ) -> Result<()> {
        self.reauthorize(passphrase, "set_quick_entry")?;

        if key.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "quick entry key cannot be empty".into(),
            ));
        }

        let quick = QuickEntry {
            secret: self.cipher.encrypt(secret)?,
            strength_level: password_level(secret),
            note: note.to_string(),
        };

        let mut next = self.document.clone();
        next.frequent_items.insert(key.to_string(), quick);
        self.commit(next)?;

        debug!(key, "stored quick entry");
        Ok(())
    }

    /// Return a quick entry with its secret decrypted.
    ///
    /// Same absence rules as `get_entry`.
    pub fn reveal_quick_entry(
        &self,
        key: &str,
        passphrase: &str,
    ) -> Result<Option<RevealedQuickEntry>> {
        self.reauthorize(passphrase, "reveal_quick_entry")?;

        let Some(quick) = self.document.frequent_items.get(key) else {
            return Ok(None);
        };

        match self.cipher.decrypt(&quick.secret) {
            Ok(plaintext) => Ok(Some(RevealedQuickEntry {
                key: key.to_string(),
                strength_level: quick.strength_level,
                secret: plaintext.as_str().to_owned(),
                note: quick.note.clone(),
            })),
            Err(e) => {
                error!(key, error = %e, "quick entry secret is unavailable");
                Ok(None)
            }
        }
    }

    /// Remove a quick entry. Returns whether anything was removed.
    pub fn delete_quick_entry(&mut self, key: &str, passphrase: &str) -> Result<bool> {
        self.reauthorize(passphrase, "delete_quick_entry")?;

        if !self.document.frequent_items.contains_key(key) {
            return Ok(false);
        }

        let mut next = self.document.clone();
        next.frequent_items.remove(key);
        self.commit(next)?;

        debug!(key, "deleted quick entry");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Seal `next` with a fresh MAC, write it, and only then make it the
    /// in-memory document. A failed write leaves the store unchanged.
    fn commit(&mut self, mut next: VaultDocument) -> Result<()> {
        format::seal(&mut next, &self.integrity_key)?;
        format::write_vault(&self.path, &next)?;
        self.document = next;
        debug!(path = %self.path.display(), "persisted vault");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the path to the vault file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of entries in the vault.
    pub fn entry_count(&self) -> usize {
        self.document.items.len()
    }

    /// Returns `true` if an entry with this ID exists.
    ///
    /// Metadata-only; no passphrase or decryption involved.
    pub fn contains_entry(&self, id: &str) -> bool {
        self.document.items.contains_key(id)
    }

    /// Returns the Argon2 costs this vault was opened with.
    pub fn argon2_params(&self) -> &Argon2Params {
        self.kdf.params()
    }
}

fn field_cipher(cipher: FieldCipher, ttl: Option<Duration>) -> FieldCipher {
    match ttl {
        Some(ttl) => cipher.with_ttl(ttl),
        None => cipher,
    }
}
