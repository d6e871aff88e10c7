//! The key lifecycle engine: verify, generate, check, validate.
//!
//! Per session id the lifecycle is:
//!
//! `NoVerification -> Verified -> KeyIssued -> [KeyExpired]`
//!
//! where generation consumes the verification, and `KeyExpired` is a
//! read-time observation rather than a stored transition. An issued key
//! additionally carries an HWID sub-state, `Unbound -> Bound(hwid)`,
//! rebound on every validation that presents a different HWID.

use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{KeyError, KeyResult};
use crate::record::{IssueChannel, KeyRecord, KeyStatus, Validation, VerificationRecord};
use crate::store::Store;

/// Literal prefix of every issued key.
pub const KEY_PREFIX: &str = "Oblivion";

/// Generates a fresh key: three independent 2-byte draws from the OS
/// CSPRNG, hex-encoded uppercase, as `Oblivion-XXXX-XXXX-XXXX`.
///
/// Uniqueness is probabilistic; no collision check is performed.
#[must_use]
pub fn generate_key_string() -> String {
    format!("{KEY_PREFIX}-{}-{}-{}", key_group(), key_group(), key_group())
}

fn key_group() -> String {
    let mut bytes = [0u8; 2];
    OsRng.fill_bytes(&mut bytes);
    format!("{:02X}{:02X}", bytes[0], bytes[1])
}

/// The core engine, generic over the storage backend.
///
/// Every operation runs its full load-mutate-save cycle under one
/// internal lock, so two concurrent generations for the same session
/// cannot both pass the "no existing key" check and double-issue. Reads
/// take the lock too: a load may rewrite storage when it self-heals a
/// corrupt file, and that write must not interleave with another
/// operation's save.
pub struct KeyEngine<S> {
    store: S,
    mutate_lock: Mutex<()>,
}

impl<S: Store> KeyEngine<S> {
    /// Creates an engine over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            mutate_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutate_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records completion of the external link-verification flow for
    /// `session_id`.
    ///
    /// Unconditionally overwrites any prior verification state; repeated
    /// calls are idempotent in effect but reset the timestamp.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` for an empty session id, or a storage
    /// error if the database cannot be persisted.
    pub fn record_verification(&self, session_id: &str) -> KeyResult<()> {
        if session_id.is_empty() {
            return Err(KeyError::MissingParameter("sessionId"));
        }

        let _guard = self.lock();
        let mut db = self.store.load();
        db.pending_verifications.insert(
            session_id.to_string(),
            VerificationRecord {
                verified: true,
                timestamp: Utc::now(),
            },
        );
        self.store.save(&db)?;

        debug!("verification recorded for session {session_id}");
        Ok(())
    }

    /// Issues a key for `session_id`, consuming its pending verification.
    ///
    /// Repeated calls for a session holding a live key return that key
    /// unchanged and consume nothing. An expired key record is treated as
    /// absent, so the session can complete a fresh verification and
    /// receive a new key. The `system` parameter selects the issuing
    /// channel (and thereby the validity duration).
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` for an empty session id, or
    /// `VerificationRequired` if no completed verification is pending.
    pub fn generate_key(&self, session_id: &str, system: Option<&str>) -> KeyResult<String> {
        if session_id.is_empty() {
            return Err(KeyError::MissingParameter("sessionId"));
        }

        let _guard = self.lock();
        let now = Utc::now();
        let mut db = self.store.load();

        if let Some(existing) = db.keys.get(session_id) {
            if !existing.is_expired_at(now) {
                debug!("returning existing key for session {session_id}");
                return Ok(existing.key.clone());
            }
        }

        let verified = db
            .pending_verifications
            .get(session_id)
            .is_some_and(|v| v.verified);
        if !verified {
            return Err(KeyError::VerificationRequired);
        }

        let channel = IssueChannel::from_param(system);
        let key = generate_key_string();
        db.keys.insert(
            session_id.to_string(),
            KeyRecord {
                key: key.clone(),
                expires_at: now + channel.validity(),
                hwid: None,
            },
        );
        // Consume the verification so it cannot mint a second key.
        db.pending_verifications.remove(session_id);
        self.store.save(&db)?;

        info!(
            "issued key for session {session_id} via {channel:?} ({}h validity)",
            channel.validity_hours()
        );
        Ok(key)
    }

    /// Reports the status of the key issued to `session_id`, if any.
    ///
    /// No record is mutated or deleted, including expired ones. The lock
    /// is still held: a mid-save document would read as corrupt, and the
    /// self-healing load would then overwrite it with empty state.
    #[must_use]
    pub fn check_key(&self, session_id: &str) -> KeyStatus {
        let _guard = self.lock();
        let now = Utc::now();
        let db = self.store.load();

        let Some(record) = db.keys.get(session_id) else {
            return KeyStatus::Missing;
        };
        if record.is_expired_at(now) {
            return KeyStatus::Expired;
        }
        KeyStatus::Active {
            key: record.key.clone(),
            expires_in_hours: (record.expires_at - now).num_hours(),
        }
    }

    /// Validates a presented key/HWID pair on behalf of the executor.
    ///
    /// The key is looked up by a linear scan over all sessions. A live key
    /// always validates: an absent or mismatched stored HWID is overwritten
    /// with the presented value and persisted. Every validation therefore
    /// rebinds the key to whichever device presents it; this permissive
    /// policy is deliberate (see DESIGN.md) and not an exclusivity lock.
    ///
    /// # Errors
    ///
    /// Returns a storage error only if persisting a rebind fails.
    pub fn validate_key(&self, key: &str, hwid: &str) -> KeyResult<Validation> {
        let _guard = self.lock();
        let now = Utc::now();
        let mut db = self.store.load();

        let (rebound, expires_at) = match db.keys.values_mut().find(|r| r.key == key) {
            None => return Ok(Validation::Invalid),
            Some(record) => {
                if record.is_expired_at(now) {
                    return Ok(Validation::Expired);
                }
                let rebound = record.hwid.as_deref() != Some(hwid);
                if rebound {
                    record.hwid = Some(hwid.to_string());
                }
                (rebound, record.expires_at)
            }
        };

        if rebound {
            self.store.save(&db)?;
            debug!("key {key} bound to hwid {hwid}");
        }
        Ok(Validation::Valid { expires_at })
    }
}
