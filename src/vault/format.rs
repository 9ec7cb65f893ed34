//! JSON vault file format and HMAC integrity verification.
//!
//! A vault file is a single UTF-8 JSON object:
//!
//! ```text
//! {
//!     "ARGON2_PARAMS": { verify_hash, hash_len, encryption_salt,
//!                        hmac_salt, hmac_key_encrypted, integrity_check },
//!     "FrequentlyKeys": { "<key>": { Note, Password, PasswordLevel } },
//!     "ItemList": { "<id>": { Index, LinkURL, Note, Password,
//!                             PasswordLevel, URL, UserName } }
//! }
//! ```
//!
//! `integrity_check` is HMAC-SHA256 (hex) over the canonical rendering
//! of the document with `integrity_check` itself removed. The canonical
//! rendering sorts object keys, indents with four spaces, uses `": "`
//! and `","` separators and leaves non-ASCII characters unescaped. The
//! file on disk uses the same rendering.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::entry::{Entry, QuickEntry};
use crate::crypto::kdf::{
    check_verify_hash, ENCRYPTION_SALT_LEN, INTEGRITY_SALT_LEN, MAX_HASH_LEN, MIN_HASH_LEN,
};
use crate::crypto::IntegrityKey;
use crate::errors::{Result, VaultError};
use crate::strength::MAX_LEVEL;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const PARAMS_KEY: &str = "ARGON2_PARAMS";
const MAC_KEY: &str = "integrity_check";

/// Length of the hex-encoded HMAC-SHA256 digest.
const MAC_HEX_LEN: usize = 64;

/// Value written before the first real MAC is computed.
pub const PLACEHOLDER_MAC: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// Derivation and verification parameters stored in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CryptoParams {
    /// Argon2id PHC string of the master passphrase.
    pub verify_hash: String,

    /// Raw Argon2 output length used for subkey derivation.
    pub hash_len: usize,

    /// Salt for the encryption subkey (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub encryption_salt: Vec<u8>,

    /// Salt for the integrity subkey (base64 in JSON).
    #[serde(
        rename = "hmac_salt",
        serialize_with = "base64_encode",
        deserialize_with = "base64_decode"
    )]
    pub integrity_salt: Vec<u8>,

    /// The integrity key as a field-cipher token.
    #[serde(rename = "hmac_key_encrypted")]
    pub encrypted_integrity_key: String,

    /// Hex HMAC-SHA256 over the rest of the document.
    #[serde(rename = "integrity_check")]
    pub integrity_mac: String,
}

/// The whole persisted vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultDocument {
    #[serde(rename = "ARGON2_PARAMS")]
    pub params: CryptoParams,

    #[serde(rename = "ItemList")]
    pub items: BTreeMap<String, Entry>,

    #[serde(rename = "FrequentlyKeys")]
    pub frequent_items: BTreeMap<String, QuickEntry>,
}

impl VaultDocument {
    /// Check every invariant serde alone cannot express.
    ///
    /// Runs once, right after parsing.
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;

        check_verify_hash(&p.verify_hash)?;
        if !(MIN_HASH_LEN..=MAX_HASH_LEN).contains(&p.hash_len) {
            return Err(VaultError::InvalidFormat(format!(
                "hash_len must be between {MIN_HASH_LEN} and {MAX_HASH_LEN} (got {})",
                p.hash_len
            )));
        }
        if p.encryption_salt.len() != ENCRYPTION_SALT_LEN {
            return Err(VaultError::InvalidFormat(format!(
                "encryption_salt must be {ENCRYPTION_SALT_LEN} bytes (got {})",
                p.encryption_salt.len()
            )));
        }
        if p.integrity_salt.len() != INTEGRITY_SALT_LEN {
            return Err(VaultError::InvalidFormat(format!(
                "hmac_salt must be {INTEGRITY_SALT_LEN} bytes (got {})",
                p.integrity_salt.len()
            )));
        }
        if p.integrity_mac.len() != MAC_HEX_LEN
            || !p.integrity_mac.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(VaultError::InvalidFormat(
                "integrity_check must be 64 hex characters".into(),
            ));
        }

        for (key, entry) in &self.items {
            match key.parse::<u64>() {
                Ok(n) if n > 0 => {}
                _ => {
                    return Err(VaultError::InvalidFormat(format!(
                        "item key '{key}' is not a positive integer"
                    )))
                }
            }
            if entry.id != *key {
                return Err(VaultError::InvalidFormat(format!(
                    "item '{key}' has mismatched Index '{}'",
                    entry.id
                )));
            }
            if entry.strength_level > MAX_LEVEL {
                return Err(VaultError::InvalidFormat(format!(
                    "item '{key}' has PasswordLevel {} above {MAX_LEVEL}",
                    entry.strength_level
                )));
            }
        }

        for (key, quick) in &self.frequent_items {
            if quick.strength_level > MAX_LEVEL {
                return Err(VaultError::InvalidFormat(format!(
                    "quick entry '{key}' has PasswordLevel {} above {MAX_LEVEL}",
                    quick.strength_level
                )));
            }
        }

        Ok(())
    }

    /// The next free entry ID: one past the largest numeric ID, or "1".
    pub fn next_id(&self) -> String {
        let max = self
            .items
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }
}

// ---------------------------------------------------------------------------
// Canonical rendering
// ---------------------------------------------------------------------------

/// Render a JSON value with sorted keys and four-space indentation.
fn render(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut ser)
        .map_err(|e| VaultError::SerializationError(format!("vault JSON: {e}")))?;
    Ok(buf)
}

/// Bytes the integrity MAC is computed over: the document with
/// `integrity_check` removed, rendered canonically.
pub fn canonical_bytes(doc: &VaultDocument) -> Result<Vec<u8>> {
    let mut value = serde_json::to_value(doc)
        .map_err(|e| VaultError::SerializationError(format!("vault JSON: {e}")))?;
    if let Some(params) = value.get_mut(PARAMS_KEY).and_then(Value::as_object_mut) {
        params.remove(MAC_KEY);
    }
    render(&value)
}

// ---------------------------------------------------------------------------
// Integrity MAC
// ---------------------------------------------------------------------------

/// Compute the hex HMAC-SHA256 of the document (minus its MAC field).
pub fn compute_mac(doc: &VaultDocument, key: &IntegrityKey) -> Result<String> {
    let bytes = canonical_bytes(doc)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::SerializationError(format!("invalid HMAC key: {e}")))?;
    mac.update(&bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify the stored MAC using constant-time comparison.
pub fn verify_mac(doc: &VaultDocument, key: &IntegrityKey) -> Result<()> {
    let computed = compute_mac(doc, key)?;
    let stored = doc.params.integrity_mac.to_ascii_lowercase();

    if computed.as_bytes().ct_eq(stored.as_bytes()).into() {
        Ok(())
    } else {
        Err(VaultError::IntegrityMismatch)
    }
}

/// Recompute and store the MAC so the document is self-consistent.
pub fn seal(doc: &mut VaultDocument, key: &IntegrityKey) -> Result<()> {
    doc.params.integrity_mac = compute_mac(doc, key)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Read and validate a vault file. The MAC is *not* checked here: the
/// integrity key is only available after the passphrase is verified.
pub fn read_vault(path: &Path) -> Result<VaultDocument> {
    let data = fs::read_to_string(path)?;

    let doc: VaultDocument = serde_json::from_str(&data)
        .map_err(|e| VaultError::InvalidFormat(format!("vault JSON: {e}")))?;
    doc.validate()?;

    Ok(doc)
}

/// Write a vault file to disk **atomically**.
///
/// The document is rendered to a temp file in the same directory, which
/// is then renamed over the target so readers never see a half-written
/// file. Concurrent writers from separate processes are not
/// coordinated; the last rename wins.
pub fn write_vault(path: &Path, doc: &VaultDocument) -> Result<()> {
    let value = serde_json::to_value(doc)
        .map_err(|e| VaultError::SerializationError(format!("vault JSON: {e}")))?;
    let buf = render(&value)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &buf)?;

    // On Unix, restrict permissions to owner-only read/write.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc() -> VaultDocument {
        VaultDocument {
            params: CryptoParams {
                verify_hash: "$argon2id$v=19$m=8192,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA".into(),
                hash_len: 64,
                encryption_salt: vec![1; ENCRYPTION_SALT_LEN],
                integrity_salt: vec![2; INTEGRITY_SALT_LEN],
                encrypted_integrity_key: "token".into(),
                integrity_mac: PLACEHOLDER_MAC.into(),
            },
            items: BTreeMap::new(),
            frequent_items: BTreeMap::new(),
        }
    }

    fn entry(id: &str) -> Entry {
        Entry {
            id: id.into(),
            strength_level: 1,
            url: "u".into(),
            username: "n".into(),
            secret: "s".into(),
            linked_url: String::new(),
            note: String::new(),
        }
    }

    fn key() -> IntegrityKey {
        IntegrityKey::new([9; 16])
    }

    #[test]
    fn canonical_bytes_exclude_mac_and_sort_keys() {
        let text = String::from_utf8(canonical_bytes(&doc()).unwrap()).unwrap();
        assert!(!text.contains(MAC_KEY));
        let params_at = text.find(PARAMS_KEY).unwrap();
        let frequent_at = text.find("FrequentlyKeys").unwrap();
        let items_at = text.find("ItemList").unwrap();
        assert!(params_at < frequent_at && frequent_at < items_at);
        assert!(text.contains("\n    \"ARGON2_PARAMS\": {"));
    }

    #[test]
    fn mac_ignores_its_own_field() {
        let mut d = doc();
        let before = compute_mac(&d, &key()).unwrap();
        d.params.integrity_mac = "f".repeat(64);
        assert_eq!(before, compute_mac(&d, &key()).unwrap());
    }

    #[test]
    fn sealed_document_verifies_and_detects_change() {
        let mut d = doc();
        seal(&mut d, &key()).unwrap();
        assert!(verify_mac(&d, &key()).is_ok());

        d.items.insert("1".into(), entry("1"));
        assert!(matches!(verify_mac(&d, &key()), Err(VaultError::IntegrityMismatch)));
    }

    #[test]
    fn verify_fails_with_other_key() {
        let mut d = doc();
        seal(&mut d, &key()).unwrap();
        let other = IntegrityKey::new([8; 16]);
        assert!(verify_mac(&d, &other).is_err());
    }

    #[test]
    fn non_ascii_is_written_unescaped() {
        let mut d = doc();
        let mut e = entry("1");
        e.note = "工作账户".into();
        d.items.insert("1".into(), e);
        let text = String::from_utf8(canonical_bytes(&d).unwrap()).unwrap();
        assert!(text.contains("工作账户"));
    }

    #[test]
    fn next_id_is_max_plus_one() {
        let mut d = doc();
        assert_eq!(d.next_id(), "1");
        for id in ["1", "2", "5"] {
            d.items.insert(id.into(), entry(id));
        }
        assert_eq!(d.next_id(), "6");
    }

    #[test]
    fn validate_rejects_bad_item_keys() {
        let mut d = doc();
        d.items.insert("abc".into(), entry("abc"));
        assert!(d.validate().is_err());

        let mut d = doc();
        d.items.insert("2".into(), entry("3"));
        assert!(d.validate().is_err());
    }

    #[test]
    fn validate_rejects_short_mac_and_salts() {
        let mut d = doc();
        d.params.integrity_mac = "abc".into();
        assert!(d.validate().is_err());

        let mut d = doc();
        d.params.encryption_salt = vec![1; 8];
        assert!(d.validate().is_err());
    }

    #[test]
    fn validate_rejects_truncated_verify_hash_and_huge_hash_len() {
        let mut d = doc();
        d.params.verify_hash = "$argon2id$v=19$m=8192,t=1,p=1$c2FsdHNhbHQ".into();
        assert!(matches!(d.validate(), Err(VaultError::InvalidFormat(_))));

        let mut d = doc();
        d.params.hash_len = usize::MAX;
        assert!(matches!(d.validate(), Err(VaultError::InvalidFormat(_))));

        let mut d = doc();
        d.params.hash_len = MAX_HASH_LEN;
        assert!(d.validate().is_ok());
    }

    #[test]
    fn missing_param_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v.json");
        let mut value = serde_json::to_value(doc()).unwrap();
        value[PARAMS_KEY].as_object_mut().unwrap().remove("hmac_salt");
        fs::write(&path, value.to_string()).unwrap();

        let err = read_vault(&path).unwrap_err();
        assert!(matches!(err, VaultError::InvalidFormat(msg) if msg.contains("hmac_salt")));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("v.json");
        let mut d = doc();
        d.items.insert("1".into(), entry("1"));
        write_vault(&path, &d).unwrap();

        assert_eq!(read_vault(&path).unwrap(), d);
        assert!(!tmp.path().join("nested").join(".v.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v.json");
        write_vault(&path, &doc()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
