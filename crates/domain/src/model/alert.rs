use std::fmt;

use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use thiserror::Error;

use super::{Amount, ShieldedTransactionRecord};

/// Random bytes backing a generated rule id.
pub const RULE_ID_BYTES: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to gather entropy for rule id: {0}")]
pub struct RuleIdError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a random hex rule id from the OS entropy source.
    pub fn generate() -> Result<Self, RuleIdError> {
        let mut bytes = [0u8; RULE_ID_BYTES];
        getrandom::fill(&mut bytes).map_err(|err| RuleIdError(err.to_string()))?;
        Ok(Self(hex_encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Alert ids are a SHA3-256 digest of the rule id and txid, so the same
    /// trigger always yields the same id.
    pub fn derive(rule: &RuleId, txid: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(rule.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(txid.as_bytes());
        Self(hex_encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AlertId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

/// Closed set of rule kinds. New kinds must extend every `match` below.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumIter, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    /// Any record, either direction, with `amount >= threshold`.
    #[serde(rename = "large_tx")]
    #[strum(serialize = "large_tx")]
    LargeTransaction,
    /// Incoming record with `amount >= threshold`.
    Incoming,
    /// Outgoing record with `amount >= threshold`.
    Outgoing,
}

impl AlertKind {
    /// Every kind, in declaration order, for rule pickers.
    pub fn all() -> impl Iterator<Item = AlertKind> {
        <Self as IntoEnumIterator>::iter()
    }

    pub fn matches(self, threshold: Amount, record: &ShieldedTransactionRecord) -> bool {
        use super::TxDirection::{In, Out};

        match self {
            AlertKind::LargeTransaction => record.amount >= threshold,
            AlertKind::Incoming => record.direction == In && record.amount >= threshold,
            AlertKind::Outgoing => record.direction == Out && record.amount >= threshold,
        }
    }

    pub fn message(self, record: &ShieldedTransactionRecord) -> String {
        let amount = record.amount.to_display();
        let direction = record.direction.describe();
        match self {
            AlertKind::LargeTransaction => format!(
                "Large {direction} transaction: {amount} ZEC in the {} pool",
                record.pool
            ),
            AlertKind::Incoming | AlertKind::Outgoing => format!(
                "New {direction} transaction: {amount} ZEC in the {} pool",
                record.pool
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: RuleId,
    pub name: String,
    pub kind: AlertKind,
    pub threshold: Amount,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    /// Returns the alert message when this rule fires for `record`.
    pub fn evaluate(&self, record: &ShieldedTransactionRecord) -> Option<String> {
        if !self.enabled || !self.kind.matches(self.threshold, record) {
            return None;
        }
        Some(self.kind.message(record))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlertRule {
    pub name: String,
    pub kind: AlertKind,
    pub threshold: Amount,
    pub enabled: bool,
}

/// Partial update applied by `AlertEngine::update_rule`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub kind: Option<AlertKind>,
    pub threshold: Option<Amount>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub rule_id: RuleId,
    #[serde(default)]
    pub txid: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Persisted form of the alert state: `{ "rules": [...], "alerts": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSnapshot {
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyId, ShieldedPool, TxDirection};

    fn record(amount: u64, direction: TxDirection) -> ShieldedTransactionRecord {
        ShieldedTransactionRecord {
            txid: "aa".into(),
            height: 1,
            time: 0,
            amount: Amount::from_atomic(amount),
            direction,
            pool: ShieldedPool::Orchard,
            key_id: KeyId::from("k"),
            memo: None,
        }
    }

    #[test]
    fn kind_wire_names_are_stable() {
        assert_eq!(
            serde_json::to_string(&AlertKind::LargeTransaction).unwrap(),
            "\"large_tx\""
        );
        assert_eq!(AlertKind::LargeTransaction.as_ref(), "large_tx");
        assert_eq!(AlertKind::Outgoing.as_ref(), "outgoing");
        let kind: AlertKind = serde_json::from_str("\"incoming\"").unwrap();
        assert_eq!(kind, AlertKind::Incoming);

        for kind in AlertKind::all() {
            assert_eq!(kind.as_ref().parse::<AlertKind>().unwrap(), kind);
        }
        assert!("huge".parse::<AlertKind>().is_err());
    }

    #[test]
    fn directional_kinds_respect_direction() {
        let threshold = Amount::from_atomic(10);
        assert!(AlertKind::Incoming.matches(threshold, &record(10, TxDirection::In)));
        assert!(!AlertKind::Incoming.matches(threshold, &record(10, TxDirection::Out)));
        assert!(AlertKind::Outgoing.matches(threshold, &record(11, TxDirection::Out)));
        assert!(!AlertKind::LargeTransaction.matches(threshold, &record(9, TxDirection::In)));
    }

    #[test]
    fn large_tx_message_names_direction_amount_and_pool() {
        let message = AlertKind::LargeTransaction.message(&record(150_000_000, TxDirection::Out));
        assert!(message.contains("outgoing"));
        assert!(message.contains("1.5000"));
        assert!(message.contains("Orchard"));
    }

    #[test]
    fn alert_id_is_deterministic() {
        let rule = RuleId::from("r1");
        assert_eq!(AlertId::derive(&rule, "tx"), AlertId::derive(&rule, "tx"));
        assert_ne!(AlertId::derive(&rule, "tx"), AlertId::derive(&rule, "ty"));
    }

    #[test]
    fn generated_rule_ids_are_unique_hex() {
        let a = RuleId::generate().expect("entropy available");
        let b = RuleId::generate().expect("entropy available");
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), RULE_ID_BYTES * 2);
    }
}
