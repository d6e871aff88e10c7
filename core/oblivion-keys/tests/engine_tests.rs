use chrono::{Duration, Utc};
use oblivion_keys::{
    IssueChannel, JsonFileStore, KeyEngine, KeyError, KeyRecord, KeyStatus, MemoryStore, Store,
    Validation, KEY_PREFIX,
};
use tempfile::TempDir;

/// Engine over a memory store, plus a handle for inspecting state.
fn engine() -> (KeyEngine<MemoryStore>, MemoryStore) {
    let store = MemoryStore::default();
    (KeyEngine::new(store.clone()), store)
}

fn assert_key_format(key: &str) {
    let parts: Vec<&str> = key.split('-').collect();
    assert_eq!(parts.len(), 4, "bad key shape: {key}");
    assert_eq!(parts[0], KEY_PREFIX);
    for group in &parts[1..] {
        assert_eq!(group.len(), 4);
        assert!(
            group.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()),
            "bad key group in {key}"
        );
    }
}

/// Plants an already-expired key record for `session_id`.
fn plant_expired_key(store: &MemoryStore, session_id: &str, key: &str) {
    let mut db = store.load();
    db.keys.insert(
        session_id.to_string(),
        KeyRecord {
            key: key.to_string(),
            expires_at: Utc::now() - Duration::hours(1),
            hwid: None,
        },
    );
    store.save(&db).unwrap();
}

// ── IssueChannel ─────────────────────────────────────────────────

#[test]
fn channel_mapping() {
    assert_eq!(IssueChannel::from_param(Some("lootlabs")), IssueChannel::Lootlabs);
    assert_eq!(IssueChannel::from_param(Some("workink")), IssueChannel::Standard);
    assert_eq!(IssueChannel::from_param(Some("")), IssueChannel::Standard);
    assert_eq!(IssueChannel::from_param(None), IssueChannel::Standard);
}

#[test]
fn channel_validity() {
    assert_eq!(IssueChannel::Lootlabs.validity_hours(), 72);
    assert_eq!(IssueChannel::Standard.validity_hours(), 24);
}

// ── Verification ─────────────────────────────────────────────────

#[test]
fn verification_is_recorded() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();

    let db = store.load();
    assert!(db.pending_verifications["abc"].verified);
    assert!(db.keys.is_empty());
}

#[test]
fn repeated_verification_resets_timestamp() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let first = store.load().pending_verifications["abc"].timestamp;

    std::thread::sleep(std::time::Duration::from_millis(5));
    engine.record_verification("abc").unwrap();
    let second = store.load().pending_verifications["abc"].timestamp;

    assert!(second > first);
    assert!(store.load().pending_verifications["abc"].verified);
}

#[test]
fn empty_session_id_is_rejected() {
    let (engine, _) = engine();
    assert!(matches!(
        engine.record_verification(""),
        Err(KeyError::MissingParameter("sessionId"))
    ));
    assert!(matches!(
        engine.generate_key("", None),
        Err(KeyError::MissingParameter("sessionId"))
    ));
}

// ── Generation ───────────────────────────────────────────────────

#[test]
fn generation_requires_verification() {
    let (engine, store) = engine();
    assert!(matches!(
        engine.generate_key("abc", None),
        Err(KeyError::VerificationRequired)
    ));
    assert!(store.load().keys.is_empty());
}

#[test]
fn generation_consumes_verification() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let key = engine.generate_key("abc", None).unwrap();
    assert_key_format(&key);

    let db = store.load();
    assert!(db.pending_verifications.is_empty());
    assert_eq!(db.keys["abc"].key, key);
    assert_eq!(db.keys["abc"].hwid, None);
}

#[test]
fn generation_is_idempotent() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let first = engine.generate_key("abc", Some("lootlabs")).unwrap();
    let second = engine.generate_key("abc", Some("lootlabs")).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.load().keys.len(), 1);
}

#[test]
fn verification_is_not_shared_between_sessions() {
    let (engine, _) = engine();
    engine.record_verification("abc").unwrap();
    engine.generate_key("abc", None).unwrap();

    // The consumed verification must not open the gate for anyone else.
    assert!(matches!(
        engine.generate_key("other", None),
        Err(KeyError::VerificationRequired)
    ));
}

#[test]
fn lootlabs_channel_grants_72_hours() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let before = Utc::now();
    engine.generate_key("abc", Some("lootlabs")).unwrap();

    let granted = store.load().keys["abc"].expires_at - before;
    assert!(granted >= Duration::hours(72) - Duration::minutes(1));
    assert!(granted <= Duration::hours(72) + Duration::minutes(1));
}

#[test]
fn unknown_channel_grants_24_hours() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let before = Utc::now();
    engine.generate_key("abc", Some("adfly")).unwrap();

    let granted = store.load().keys["abc"].expires_at - before;
    assert!(granted >= Duration::hours(24) - Duration::minutes(1));
    assert!(granted <= Duration::hours(24) + Duration::minutes(1));
}

#[test]
fn expired_key_allows_regeneration_after_fresh_verification() {
    let (engine, store) = engine();
    plant_expired_key(&store, "abc", "Oblivion-DEAD-DEAD-DEAD");

    // The stale record does not satisfy the idempotent-return branch.
    assert!(matches!(
        engine.generate_key("abc", None),
        Err(KeyError::VerificationRequired)
    ));

    engine.record_verification("abc").unwrap();
    let key = engine.generate_key("abc", None).unwrap();
    assert_ne!(key, "Oblivion-DEAD-DEAD-DEAD");
    assert_eq!(store.load().keys["abc"].key, key);
}

// ── Check ────────────────────────────────────────────────────────

#[test]
fn check_reports_missing_key() {
    let (engine, _) = engine();
    assert_eq!(engine.check_key("nobody"), KeyStatus::Missing);
    assert_eq!(engine.check_key(""), KeyStatus::Missing);
}

#[test]
fn check_reports_live_key_with_floored_hours() {
    let (engine, _) = engine();
    engine.record_verification("abc").unwrap();
    let key = engine.generate_key("abc", Some("lootlabs")).unwrap();

    match engine.check_key("abc") {
        KeyStatus::Active { key: reported, expires_in_hours } => {
            assert_eq!(reported, key);
            // 72h minus the time spent in the test, floored.
            assert!((71..=72).contains(&expires_in_hours));
        }
        other => panic!("expected an active key, got {other:?}"),
    }
}

#[test]
fn check_reports_expired_key_without_deleting_it() {
    let (engine, store) = engine();
    plant_expired_key(&store, "abc", "Oblivion-DEAD-DEAD-DEAD");

    assert_eq!(engine.check_key("abc"), KeyStatus::Expired);
    assert!(!engine.check_key("abc").has_key());
    // Expiry is read-time only; the record stays.
    assert!(store.load().keys.contains_key("abc"));
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn unknown_key_is_invalid() {
    let (engine, _) = engine();
    assert_eq!(
        engine.validate_key("Oblivion-0000-0000-0000", "HWID-1").unwrap(),
        Validation::Invalid
    );
    assert_eq!(engine.validate_key("", "HWID-1").unwrap(), Validation::Invalid);
}

#[test]
fn expired_key_is_rejected_by_validate() {
    let (engine, store) = engine();
    plant_expired_key(&store, "abc", "Oblivion-DEAD-DEAD-DEAD");

    assert_eq!(
        engine.validate_key("Oblivion-DEAD-DEAD-DEAD", "HWID-1").unwrap(),
        Validation::Expired
    );
    // A rejected validation must not bind the HWID.
    assert_eq!(store.load().keys["abc"].hwid, None);
}

#[test]
fn first_validation_binds_hwid() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let key = engine.generate_key("abc", None).unwrap();

    let outcome = engine.validate_key(&key, "HWID-1").unwrap();
    assert!(outcome.is_valid());
    assert_eq!(store.load().keys["abc"].hwid.as_deref(), Some("HWID-1"));

    match outcome {
        Validation::Valid { expires_at } => {
            assert_eq!(expires_at, store.load().keys["abc"].expires_at);
        }
        other => panic!("expected a valid outcome, got {other:?}"),
    }
}

#[test]
fn mismatched_hwid_rebinds_and_succeeds() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let key = engine.generate_key("abc", None).unwrap();

    engine.validate_key(&key, "HWID-1").unwrap();
    // Permissive binding policy: a different device takes over the key.
    assert!(engine.validate_key(&key, "HWID-2").unwrap().is_valid());
    assert_eq!(store.load().keys["abc"].hwid.as_deref(), Some("HWID-2"));
}

#[test]
fn matching_hwid_validates_without_rebinding() {
    let (engine, store) = engine();
    engine.record_verification("abc").unwrap();
    let key = engine.generate_key("abc", None).unwrap();

    engine.validate_key(&key, "HWID-1").unwrap();
    let bound = store.load().keys["abc"].clone();

    assert!(engine.validate_key(&key, "HWID-1").unwrap().is_valid());
    assert_eq!(store.load().keys["abc"], bound);
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn racing_generations_issue_exactly_one_key() {
    let (engine, store) = engine();

    let keys: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    engine.record_verification("abc").unwrap();
                    engine.generate_key("abc", None).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Each thread verified before generating, so every call must succeed
    // and the serialized engine must hand all of them the same key.
    assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(store.load().keys.len(), 1);
}

#[test]
fn checks_during_generation_do_not_clobber_the_database() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("database.json"));
    let engine = KeyEngine::new(store.clone());

    // A check that sneaked a load between the truncate and write of a
    // concurrent save would see a corrupt document and reset it to empty.
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for i in 0..50 {
                    let _ = engine.check_key(&format!("session-{i}"));
                }
            });
        }
        for i in 0..50 {
            let session_id = format!("session-{i}");
            engine.record_verification(&session_id).unwrap();
            engine.generate_key(&session_id, None).unwrap();
        }
    });

    assert_eq!(store.load().keys.len(), 50);
}
