//! Vault module — encrypted credential storage.
//!
//! This module provides:
//! - Stored and caller-facing entry types (`entry`)
//! - JSON vault file format with HMAC integrity (`format`)
//! - High-level `VaultStore` with re-authenticated CRUD (`store`)

pub mod entry;
pub mod format;
pub mod store;

// Re-export the most commonly used items.
pub use entry::{
    Entry, EntryUpdate, NewEntry, QuickEntry, RedactedEntry, RedactedQuickEntry, RevealedEntry,
    RevealedQuickEntry,
};
pub use format::{CryptoParams, VaultDocument};
pub use store::VaultStore;
