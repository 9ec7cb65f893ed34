//! Entry types stored inside a vault and handed to callers.
//!
//! `Entry` and `QuickEntry` are the persisted records; their `secret`
//! field always holds a field-cipher token, never plaintext. The other
//! types are call-level views: inputs for add/update, redacted listings,
//! and revealed copies that zero themselves when dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A stored credential (site login).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    /// Unique numeric ID, as a string (e.g. "7").
    #[serde(rename = "Index")]
    pub id: String,

    /// Strength level (0-5) of the plaintext secret at write time.
    #[serde(rename = "PasswordLevel")]
    pub strength_level: u8,

    #[serde(rename = "URL")]
    pub url: String,

    #[serde(rename = "UserName")]
    pub username: String,

    /// Field-cipher token.
    #[serde(rename = "Password")]
    pub secret: String,

    /// Related account or site.
    #[serde(rename = "LinkURL")]
    pub linked_url: String,

    #[serde(rename = "Note")]
    pub note: String,
}

/// A reusable canned secret, not tied to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickEntry {
    /// Field-cipher token.
    #[serde(rename = "Password")]
    pub secret: String,

    #[serde(rename = "PasswordLevel")]
    pub strength_level: u8,

    #[serde(rename = "Note")]
    pub note: String,
}

/// Caller input for `VaultStore::add_entry`.
///
/// The store scrubs the plaintext secret once it is encrypted.
#[derive(Clone, Default, Zeroize)]
pub struct NewEntry {
    pub url: String,
    pub username: String,
    pub secret: String,
    pub linked_url: String,
    pub note: String,
}

/// Caller input for `VaultStore::update_entry`.
///
/// `None` keeps the stored value. Leaving `secret` unset keeps both
/// the stored ciphertext and its strength level.
#[derive(Clone, Default, Zeroize)]
pub struct EntryUpdate {
    pub url: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub linked_url: Option<String>,
    pub note: Option<String>,
}

/// The non-secret view of an entry.
///
/// Built field by field from an allow-list: a new field added to
/// `Entry` does not show up here unless it is added explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedactedEntry {
    #[serde(rename = "Index")]
    pub id: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "UserName")]
    pub username: String,
    #[serde(rename = "LinkURL")]
    pub linked_url: String,
    #[serde(rename = "PasswordLevel")]
    pub strength_level: u8,
    #[serde(rename = "Note")]
    pub note: String,
}

impl From<&Entry> for RedactedEntry {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id.clone(),
            url: entry.url.clone(),
            username: entry.username.clone(),
            linked_url: entry.linked_url.clone(),
            strength_level: entry.strength_level,
            note: entry.note.clone(),
        }
    }
}

/// An entry with its secret decrypted, zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RevealedEntry {
    pub id: String,
    pub strength_level: u8,
    pub url: String,
    pub username: String,
    pub secret: String,
    pub linked_url: String,
    pub note: String,
}

impl fmt::Debug for RevealedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedEntry")
            .field("id", &self.id)
            .field("strength_level", &self.strength_level)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("linked_url", &self.linked_url)
            .field("note", &self.note)
            .finish()
    }
}

/// The non-secret view of a quick entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedactedQuickEntry {
    pub key: String,
    #[serde(rename = "PasswordLevel")]
    pub strength_level: u8,
    #[serde(rename = "Note")]
    pub note: String,
}

impl RedactedQuickEntry {
    pub(crate) fn new(key: &str, entry: &QuickEntry) -> Self {
        Self {
            key: key.to_string(),
            strength_level: entry.strength_level,
            note: entry.note.clone(),
        }
    }
}

/// A quick entry with its secret decrypted, zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RevealedQuickEntry {
    pub key: String,
    pub strength_level: u8,
    pub secret: String,
    pub note: String,
}

impl fmt::Debug for RevealedQuickEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedQuickEntry")
            .field("key", &self.key)
            .field("strength_level", &self.strength_level)
            .field("secret", &"<redacted>")
            .field("note", &self.note)
            .finish()
    }
}
