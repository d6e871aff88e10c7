//! Persistent store for the key database.
//!
//! The whole database is read and written as a single JSON document.
//! Loading never fails the caller: absent, unreadable, or malformed
//! storage resets to an empty database, persists it, and returns it.
//! Availability is favored over surfacing corruption.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KeyError, KeyResult};
use crate::record::{KeyRecord, VerificationRecord};

/// The full persisted state, serialized as one JSON document with
/// top-level keys `sessions`, `keys`, and `pendingVerifications`.
///
/// `sessions` is a legacy map from an earlier checkpoint-polling flow.
/// The engine no longer reads or writes it, but it is carried through
/// load/save so existing database files survive untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Legacy checkpoint state, preserved verbatim.
    #[serde(default)]
    pub sessions: BTreeMap<String, serde_json::Value>,
    /// Issued keys, keyed by session id.
    #[serde(default)]
    pub keys: BTreeMap<String, KeyRecord>,
    /// Completed verifications awaiting key generation, keyed by session id.
    #[serde(default)]
    pub pending_verifications: BTreeMap<String, VerificationRecord>,
}

/// Storage backend for the key database.
///
/// The engine performs full load-mutate-save cycles against this trait;
/// implementations hold no locking of their own (the engine serializes).
pub trait Store: Send + Sync {
    /// Loads the full database.
    ///
    /// Must never fail: implementations recover from absent or corrupt
    /// storage by resetting to an empty database.
    fn load(&self) -> Database;

    /// Persists the full database.
    fn save(&self, db: &Database) -> KeyResult<()>;
}

/// File-backed store: one pretty-printed JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by the file at `path`. The file is created
    /// on the first load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resets storage to an empty database and returns it.
    fn reset(&self) -> Database {
        let db = Database::default();
        if let Err(err) = self.save(&db) {
            warn!("failed to persist empty database at {}: {}", self.path.display(), err);
        }
        db
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Database {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!("unreadable database at {}, resetting: {}", self.path.display(), err);
                }
                return self.reset();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(db) => db,
            Err(err) => {
                warn!("corrupt database at {}, resetting: {}", self.path.display(), err);
                self.reset()
            }
        }
    }

    fn save(&self, db: &Database) -> KeyResult<()> {
        let json = serde_json::to_string_pretty(db)?;
        fs::write(&self.path, json).map_err(|err| KeyError::Storage(err.to_string()))
    }
}

/// In-memory store for tests and embedding.
///
/// Clones share the same underlying database, so a test can hand one
/// clone to an engine and inspect state through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Database>>,
}

impl Store for MemoryStore {
    fn load(&self) -> Database {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, db: &Database) -> KeyResult<()> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = db.clone();
        Ok(())
    }
}
