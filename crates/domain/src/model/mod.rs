//! Data structures shared across the monitor and storage crates.

mod alert;
mod amount;
mod block;

use std::fmt;

use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use strum_macros::AsRefStr;

pub use alert::*;
pub use amount::*;
pub use block::*;

/// Deterministically derives a SHA3-256 fingerprint of viewing key material.
/// Logs and metrics identify keys by this value, never by the material itself.
pub fn derive_key_fingerprint(key: &ViewingKey) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(key.expose().as_bytes());
    let digest = hasher.finalize();
    hex_encode(digest)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only viewing key material. The `Debug` output is redacted so the
/// material cannot leak through logs or error chains.
#[derive(Clone, PartialEq, Eq)]
pub struct ViewingKey(String);

impl ViewingKey {
    /// Canonicalizes raw key material. Some wallets export a unified full
    /// viewing key with a `|uivk...` segment appended; only the part before
    /// the first `|` is kept.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let canonical = match trimmed.find('|') {
            Some(idx) => trimmed[..idx].trim_end(),
            None => trimmed,
        };
        Self(canonical.to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ViewingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewingKey(<redacted>)")
    }
}

/// A registered viewing key. Profiles are owned by an external registry and
/// referenced everywhere else by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewingKeyProfile {
    pub id: KeyId,
    pub label: String,
    pub key: ViewingKey,
    pub created_at: DateTime<Utc>,
}

impl ViewingKeyProfile {
    pub fn new(id: impl Into<KeyId>, label: impl Into<String>, material: &str) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            key: ViewingKey::new(material),
            created_at: Utc::now(),
        }
    }

    pub fn fingerprint(&self) -> String {
        derive_key_fingerprint(&self.key)
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which shielded pool a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShieldedPool {
    /// Spend/output descriptor pool.
    Sapling,
    /// Unified action descriptor pool.
    Orchard,
}

impl fmt::Display for ShieldedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShieldedPool::Sapling => f.write_str("Sapling"),
            ShieldedPool::Orchard => f.write_str("Orchard"),
        }
    }
}

/// Direction of a record relative to the owning viewing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TxDirection {
    In,
    Out,
}

impl TxDirection {
    pub fn describe(self) -> &'static str {
        match self {
            TxDirection::In => "incoming",
            TxDirection::Out => "outgoing",
        }
    }
}

/// A shielded transaction visible to one viewing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldedTransactionRecord {
    pub txid: String,
    pub height: u64,
    /// Block timestamp (Unix seconds).
    pub time: i64,
    pub amount: Amount,
    pub direction: TxDirection,
    pub pool: ShieldedPool,
    pub key_id: KeyId,
    #[serde(default)]
    pub memo: Option<String>,
}

impl ShieldedTransactionRecord {
    pub fn block_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}
