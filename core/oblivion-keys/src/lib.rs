//! Key lifecycle engine for the OblivionX key system.
//!
//! This crate handles:
//! - Recording completion of the external link-verification flow
//! - Issuing time-limited access keys, one per session
//! - Binding keys to a hardware identifier (HWID) on first validation
//! - Read-time expiry enforcement
//!
//! # Design Principles
//!
//! - **Verification-gated**: A session can mint a key only after the
//!   external key system reports link completion, and each completed
//!   verification is consumed by exactly one key
//! - **Idempotent issuance**: Repeated generation requests for a session
//!   return the existing key instead of minting a second one
//! - **Self-healing storage**: A missing or corrupt database resets to
//!   empty rather than failing requests
//! - **Serialized mutation**: Every load-mutate-save sequence runs under a
//!   single lock, so concurrent requests cannot lose updates
//!
//! # Key Format
//!
//! Keys are formatted as `Oblivion-XXXX-XXXX-XXXX`: three groups of four
//! uppercase hex digits, each group drawn independently from the OS CSPRNG.

mod engine;
mod error;
mod record;
mod store;

pub use engine::{generate_key_string, KeyEngine, KEY_PREFIX};
pub use error::{KeyError, KeyResult};
pub use record::{IssueChannel, KeyRecord, KeyStatus, Validation, VerificationRecord};
pub use store::{Database, JsonFileStore, MemoryStore, Store};
