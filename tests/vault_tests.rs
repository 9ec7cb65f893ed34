//! Integration tests for the CredVault vault module.

use std::fs;

use credvault::config::Settings;
use credvault::crypto::Argon2Params;
use credvault::vault::{EntryUpdate, NewEntry, VaultStore};
use credvault::VaultError;
use serde_json::Value;
use tempfile::TempDir;

const PASSWORD: &str = "master-passphrase";

/// Minimum permitted Argon2 costs so the suite stays fast.
fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 8_192,
        iterations: 1,
        parallelism: 1,
        hash_len: 64,
    }
}

/// Helper: create a temporary vault file path inside a fresh temp dir.
fn vault_path() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("my_key.json");
    (dir, path)
}

fn open(path: &std::path::Path) -> credvault::Result<VaultStore> {
    VaultStore::open(path, PASSWORD, &fast_params())
}

fn github(secret: &str) -> NewEntry {
    NewEntry {
        url: "https://github.com/login".into(),
        username: "octocat".into(),
        secret: secret.into(),
        linked_url: "https://mail.example.com".into(),
        note: "work account".into(),
    }
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn write_json(path: &std::path::Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn new_vault_file_has_expected_shape() {
    let (_dir, path) = vault_path();
    let store = open(&path).expect("create vault");
    assert_eq!(store.entry_count(), 0);

    let json = read_json(&path);
    let params = json["ARGON2_PARAMS"].as_object().unwrap();
    for key in [
        "verify_hash",
        "hash_len",
        "encryption_salt",
        "hmac_salt",
        "hmac_key_encrypted",
        "integrity_check",
    ] {
        assert!(params.contains_key(key), "missing {key}");
    }
    assert_eq!(params.len(), 6);
    assert!(params["verify_hash"].as_str().unwrap().starts_with("$argon2id$"));
    assert_eq!(params["hash_len"], 64);
    assert_eq!(params["integrity_check"].as_str().unwrap().len(), 64);
    assert!(json["ItemList"].as_object().unwrap().is_empty());
    assert!(json["FrequentlyKeys"].as_object().unwrap().is_empty());
}

#[test]
fn create_vault_and_reopen() {
    let (_dir, path) = vault_path();

    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("gh-Secret#2024"), PASSWORD).unwrap();
    drop(store);

    let store = open(&path).expect("reopen vault");
    assert_eq!(store.entry_count(), 1);
    let entry = store.get_entry(&id, PASSWORD).unwrap().expect("entry present");
    assert_eq!(entry.secret, "gh-Secret#2024");
    assert_eq!(entry.username, "octocat");
    assert_eq!(entry.note, "work account");
}

#[test]
fn reopen_uses_costs_recorded_in_file() {
    let (_dir, path) = vault_path();
    open(&path).unwrap();

    // Default params are far more expensive; they must be ignored.
    let store = VaultStore::open(&path, PASSWORD, &Argon2Params::default()).unwrap();
    assert_eq!(store.argon2_params(), &fast_params());
}

#[test]
fn open_with_settings_reads_config() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".credvault.toml"),
        "vault_file = \"book.json\"\nargon2_memory_kib = 8192\nargon2_iterations = 1\nargon2_parallelism = 1\n",
    )
    .unwrap();
    let settings = Settings::load(dir.path()).unwrap();

    let store = VaultStore::open_with_settings(dir.path(), PASSWORD, &settings).unwrap();
    assert_eq!(store.path(), dir.path().join("book.json"));
    assert!(dir.path().join("book.json").exists());
}

#[test]
fn persisted_file_never_contains_plaintext_secret() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store.add_entry(github("plain-text-marker-91!"), PASSWORD).unwrap();
    store
        .set_quick_entry("wifi", "quick-marker-77?", "home", PASSWORD)
        .unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("plain-text-marker-91!"));
    assert!(!raw.contains("quick-marker-77?"));
    assert!(!raw.contains(PASSWORD));
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[test]
fn wrong_passphrase_fails_to_open() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store.add_entry(github("s3cret!"), PASSWORD).unwrap();
    drop(store);

    let before = fs::read(&path).unwrap();
    let err = VaultStore::open(&path, "not-the-passphrase", &fast_params())
        .err()
        .expect("wrong passphrase must fail");
    assert!(matches!(err, VaultError::AuthFailed));
    assert!(err.is_retryable());

    // The file is untouched.
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn verify_master_key_has_no_side_effects() {
    let (_dir, path) = vault_path();
    let store = open(&path).unwrap();
    let before = fs::read(&path).unwrap();

    assert!(store.verify_master_key(PASSWORD));
    assert!(!store.verify_master_key("guess"));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn every_secret_call_reverifies_passphrase() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("s3cret!"), PASSWORD).unwrap();

    assert!(matches!(
        store.add_entry(github("other"), "wrong"),
        Err(VaultError::AuthFailed)
    ));
    assert!(matches!(
        store.get_entry(&id, "wrong"),
        Err(VaultError::AuthFailed)
    ));
    assert!(matches!(
        store.delete_entry(&id, "wrong"),
        Err(VaultError::AuthFailed)
    ));
    assert!(matches!(
        store.set_quick_entry("k", "v", "", "wrong"),
        Err(VaultError::AuthFailed)
    ));
    assert!(matches!(
        store.reveal_quick_entry("k", "wrong"),
        Err(VaultError::AuthFailed)
    ));

    assert_eq!(store.entry_count(), 1);
    assert!(store.contains_entry(&id));
}

#[test]
fn update_with_wrong_passphrase_leaves_ciphertext_unchanged() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("original-S3cret"), PASSWORD).unwrap();
    let before = fs::read(&path).unwrap();

    let update = EntryUpdate {
        secret: Some("replacement".into()),
        ..Default::default()
    };
    let result = store.update_entry(&id, update, "wrong");
    assert!(matches!(result, Err(VaultError::AuthFailed)));

    assert_eq!(fs::read(&path).unwrap(), before);
    let entry = store.get_entry(&id, PASSWORD).unwrap().unwrap();
    assert_eq!(entry.secret, "original-S3cret");
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

#[test]
fn edited_field_is_detected() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("s3cret!"), PASSWORD).unwrap();
    drop(store);

    let mut json = read_json(&path);
    json["ItemList"][&id]["URL"] = Value::from("https://evil.example.com");
    write_json(&path, &json);

    assert!(matches!(open(&path), Err(VaultError::IntegrityMismatch)));
}

#[test]
fn removed_entry_is_detected() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store.add_entry(github("one"), PASSWORD).unwrap();
    store.add_entry(github("two"), PASSWORD).unwrap();
    drop(store);

    let mut json = read_json(&path);
    json["ItemList"].as_object_mut().unwrap().remove("2");
    write_json(&path, &json);

    assert!(matches!(open(&path), Err(VaultError::IntegrityMismatch)));
}

#[test]
fn swapped_encrypted_integrity_key_is_detected() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    // Base64 of sixteen 0x07 bytes: decrypts to a well-formed but wrong key.
    store
        .add_entry(github("BwcHBwcHBwcHBwcHBwcHBw=="), PASSWORD)
        .unwrap();
    drop(store);

    let mut json = read_json(&path);
    let secret_token = json["ItemList"]["1"]["Password"].clone();
    json["ARGON2_PARAMS"]["hmac_key_encrypted"] = secret_token;
    write_json(&path, &json);

    assert!(matches!(open(&path), Err(VaultError::IntegrityMismatch)));
}

#[test]
fn flipped_byte_is_rejected() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store.add_entry(github("s3cret!"), PASSWORD).unwrap();
    drop(store);

    // Flip a letter inside the note text; the JSON stays valid.
    let raw = fs::read_to_string(&path).unwrap();
    let tampered = raw.replacen("work account", "work accounu", 1);
    assert_ne!(raw, tampered);
    fs::write(&path, tampered).unwrap();

    let err = open(&path).err().expect("tampered vault must be rejected");
    assert!(matches!(err, VaultError::IntegrityMismatch));
    assert!(!err.is_retryable());
}

#[test]
fn whitespace_only_changes_are_accepted() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store.add_entry(github("s3cret!"), PASSWORD).unwrap();
    drop(store);

    // Compact rendering: same content, different bytes.
    let json = read_json(&path);
    fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    assert!(open(&path).is_ok());
}

// ---------------------------------------------------------------------------
// Format errors
// ---------------------------------------------------------------------------

#[test]
fn missing_param_is_format_error() {
    let (_dir, path) = vault_path();
    open(&path).unwrap();

    let mut json = read_json(&path);
    json["ARGON2_PARAMS"]
        .as_object_mut()
        .unwrap()
        .remove("hmac_key_encrypted");
    write_json(&path, &json);

    let err = open(&path).err().expect("must fail");
    assert!(matches!(err, VaultError::InvalidFormat(_)));
    assert!(!err.is_retryable());
}

#[test]
fn malformed_verify_hash_is_format_error() {
    let (_dir, path) = vault_path();
    open(&path).unwrap();

    let mut json = read_json(&path);
    json["ARGON2_PARAMS"]["verify_hash"] = Value::from("$argon2id$not-a-hash");
    write_json(&path, &json);

    assert!(matches!(open(&path), Err(VaultError::InvalidFormat(_))));
}

#[test]
fn truncated_verify_hash_is_format_error_not_auth_failure() {
    let (_dir, path) = vault_path();
    open(&path).unwrap();

    let mut json = read_json(&path);
    let hash = json["ARGON2_PARAMS"]["verify_hash"]
        .as_str()
        .unwrap()
        .to_string();
    let truncated = &hash[..hash.rfind('$').unwrap()];
    json["ARGON2_PARAMS"]["verify_hash"] = Value::from(truncated);
    write_json(&path, &json);

    let err = open(&path).err().expect("must fail");
    assert!(matches!(err, VaultError::InvalidFormat(_)));
    assert!(!err.is_retryable());
}

#[test]
fn oversized_hash_len_is_format_error() {
    let (_dir, path) = vault_path();
    open(&path).unwrap();

    let mut json = read_json(&path);
    json["ARGON2_PARAMS"]["hash_len"] = Value::from(u64::MAX);
    write_json(&path, &json);

    assert!(matches!(open(&path), Err(VaultError::InvalidFormat(_))));
}

#[test]
fn unparseable_file_is_not_reinitialized() {
    let (_dir, path) = vault_path();
    fs::write(&path, "{ this is not json").unwrap();

    assert!(matches!(open(&path), Err(VaultError::InvalidFormat(_))));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ this is not json");
}

// ---------------------------------------------------------------------------
// Entry operations
// ---------------------------------------------------------------------------

#[test]
fn first_id_is_one_and_ids_continue_past_max() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();

    let first = store.add_entry(github("a"), PASSWORD).unwrap();
    assert_eq!(first, "1");
    for _ in 0..4 {
        store.add_entry(github("b"), PASSWORD).unwrap();
    }
    assert!(store.delete_entry("3", PASSWORD).unwrap());
    assert!(store.delete_entry("4", PASSWORD).unwrap());

    // Remaining IDs are {1, 2, 5}.
    let next = store.add_entry(github("c"), PASSWORD).unwrap();
    assert_eq!(next, "6");
}

#[test]
fn update_without_secret_keeps_ciphertext_and_level() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("T7#qL9!vR2@xM5$z"), PASSWORD).unwrap();
    let token_before = read_json(&path)["ItemList"][&id]["Password"].clone();

    let update = EntryUpdate {
        note: Some("personal".into()),
        ..Default::default()
    };
    assert_eq!(store.update_entry(&id, update, PASSWORD).unwrap(), id);

    let json = read_json(&path);
    assert_eq!(json["ItemList"][&id]["Password"], token_before);
    assert_eq!(json["ItemList"][&id]["PasswordLevel"], 5);
    assert_eq!(json["ItemList"][&id]["Note"], "personal");
    assert_eq!(json["ItemList"][&id]["URL"], "https://github.com/login");
}

#[test]
fn update_with_secret_rescores_and_reencrypts() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("T7#qL9!vR2@xM5$z"), PASSWORD).unwrap();

    let update = EntryUpdate {
        secret: Some("123456".into()),
        ..Default::default()
    };
    store.update_entry(&id, update, PASSWORD).unwrap();

    let entry = store.get_entry(&id, PASSWORD).unwrap().unwrap();
    assert_eq!(entry.secret, "123456");
    assert!(entry.strength_level <= 1);
}

#[test]
fn update_missing_entry_is_not_found() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();

    let result = store.update_entry("42", EntryUpdate::default(), PASSWORD);
    assert!(matches!(result, Err(VaultError::EntryNotFound(id)) if id == "42"));
}

#[test]
fn delete_reports_whether_anything_was_removed() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    let id = store.add_entry(github("bye"), PASSWORD).unwrap();

    assert!(store.delete_entry(&id, PASSWORD).unwrap());
    assert!(!store.delete_entry(&id, PASSWORD).unwrap());
    assert_eq!(store.entry_count(), 0);

    // The deletion is persisted.
    drop(store);
    assert_eq!(open(&path).unwrap().entry_count(), 0);
}

#[test]
fn get_missing_entry_is_none() {
    let (_dir, path) = vault_path();
    let store = open(&path).unwrap();
    assert!(store.get_entry("7", PASSWORD).unwrap().is_none());
}

#[test]
fn redacted_listing_never_contains_secrets() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    for secret in ["alpha-Secret-1", "beta-Secret-2", "gamma-Secret-3"] {
        store.add_entry(github(secret), PASSWORD).unwrap();
    }

    let list = store.list_redacted_entries();
    assert_eq!(list.len(), 3);

    let json = serde_json::to_value(&list).unwrap();
    for item in json.as_array().unwrap() {
        assert!(item.get("Password").is_none());
        assert_eq!(item["UserName"], "octocat");
    }
    let text = json.to_string();
    assert!(!text.contains("Secret-"));
}

#[test]
fn redacted_listing_is_ordered_numerically() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    for _ in 0..11 {
        store.add_entry(github("x"), PASSWORD).unwrap();
    }

    let ids: Vec<String> = store
        .list_redacted_entries()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids.first().map(String::as_str), Some("1"));
    assert_eq!(ids.get(1).map(String::as_str), Some("2"));
    assert_eq!(ids.last().map(String::as_str), Some("11"));
}

#[test]
fn weak_secret_gets_low_level() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store.add_entry(github("123456"), PASSWORD).unwrap();
    store.add_entry(github("T7#qL9!vR2@xM5$z"), PASSWORD).unwrap();

    let list = store.list_redacted_entries();
    assert!(list[0].strength_level <= 1);
    assert_eq!(list[1].strength_level, 5);
}

// ---------------------------------------------------------------------------
// Quick entries
// ---------------------------------------------------------------------------

#[test]
fn quick_entries_filter_by_tier() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store
        .set_quick_entry("pin", "123456", "bank pin", PASSWORD)
        .unwrap();
    store
        .set_quick_entry("strong", "gW4%nB8^kE1&yP6*sH3", "generic", PASSWORD)
        .unwrap();

    assert_eq!(store.quick_entries(None).len(), 2);

    let strong = store.quick_entries(Some(5));
    assert_eq!(strong.len(), 1);
    assert_eq!(strong[0].key, "strong");

    assert!(store.quick_entries(Some(3)).is_empty());
}

#[test]
fn quick_entry_reveal_and_delete() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    store
        .set_quick_entry("wifi", "Guest-Net-2024!", "home router", PASSWORD)
        .unwrap();
    drop(store);

    let mut store = open(&path).unwrap();
    let quick = store
        .reveal_quick_entry("wifi", PASSWORD)
        .unwrap()
        .expect("quick entry present");
    assert_eq!(quick.secret, "Guest-Net-2024!");
    assert_eq!(quick.note, "home router");

    assert!(store.delete_quick_entry("wifi", PASSWORD).unwrap());
    assert!(!store.delete_quick_entry("wifi", PASSWORD).unwrap());
    assert!(store.reveal_quick_entry("wifi", PASSWORD).unwrap().is_none());
}

#[test]
fn quick_entry_key_must_not_be_blank() {
    let (_dir, path) = vault_path();
    let mut store = open(&path).unwrap();
    assert!(matches!(
        store.set_quick_entry("  ", "v", "", PASSWORD),
        Err(VaultError::InvalidInput(_))
    ));
}
