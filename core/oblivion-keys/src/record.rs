//! Records and result types for the key lifecycle.
//!
//! Serialized field names and timestamp encodings match the legacy JSON
//! database document (`expiresAt` as milliseconds since epoch, `hwid`
//! absent as `null`), so an existing file keeps loading unchanged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A recorded completion of the external link-verification flow.
///
/// Keyed by session id. Created by the verification callback and consumed
/// (deleted) exactly once, at successful key generation, so one completed
/// verification cannot mint a second key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// True once the external link-completion callback fires.
    pub verified: bool,
    /// When the verification was recorded.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// An issued access key, keyed by session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// The generated credential (`Oblivion-XXXX-XXXX-XXXX`).
    pub key: String,
    /// Absolute expiry time, set at generation.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Hardware identifier bound to this key; absent until first validation.
    pub hwid: Option<String>,
}

impl KeyRecord {
    /// Returns true if the key is past its expiry at `now`.
    ///
    /// Expiry is evaluated at every read; expired records are never swept
    /// by a background task.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// The issuing channel (the `system` request parameter), which determines
/// the granted validity duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueChannel {
    /// Lootlabs ad-gate redirect (the long-validity channel).
    Lootlabs,
    /// Every other channel, including an absent parameter.
    Standard,
}

impl IssueChannel {
    /// Maps the raw `system` parameter to a channel. Only the distinguished
    /// `"lootlabs"` value is recognized; everything else is `Standard`.
    #[must_use]
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("lootlabs") => Self::Lootlabs,
            _ => Self::Standard,
        }
    }

    /// Returns the validity granted by this channel, in hours.
    #[must_use]
    pub fn validity_hours(&self) -> i64 {
        match self {
            Self::Lootlabs => 72,
            Self::Standard => 24,
        }
    }

    /// Returns the validity granted by this channel.
    #[must_use]
    pub fn validity(&self) -> Duration {
        Duration::hours(self.validity_hours())
    }
}

/// The status of a session's key, as reported by a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// No key has been issued for this session.
    Missing,
    /// A key was issued but is past its expiry.
    Expired,
    /// A live key.
    Active {
        /// The issued key.
        key: String,
        /// Whole hours remaining until expiry, floored.
        expires_in_hours: i64,
    },
}

impl KeyStatus {
    /// Returns true if the session holds a live key.
    #[must_use]
    pub fn has_key(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// The outcome of an executor-facing key validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// No key record matches the presented key value.
    Invalid,
    /// The key exists but is past its expiry.
    Expired,
    /// The key is live; the presented HWID is now bound to it.
    Valid {
        /// Absolute expiry time of the key.
        expires_at: DateTime<Utc>,
    },
}

impl Validation {
    /// Returns true if the key was accepted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}
