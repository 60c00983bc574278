use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use metrics::gauge;

use crate::model::{KeyId, ShieldedTransactionRecord};

/// Ledger entries are unique per (txid, owning key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub txid: String,
    pub key_id: KeyId,
}

impl LedgerKey {
    fn of(record: &ShieldedTransactionRecord) -> Self {
        Self {
            txid: record.txid.clone(),
            key_id: record.key_id.clone(),
        }
    }
}

pub type LedgerSnapshot = Arc<HashMap<LedgerKey, ShieldedTransactionRecord>>;

/// In-memory record set partitioned by owning key.
///
/// Writers build a complete replacement map and swap it in under the write
/// lock, so readers holding a snapshot never see a partially replaced
/// partition.
#[derive(Debug, Default)]
pub struct TransactionLedger {
    current: RwLock<LedgerSnapshot>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every record owned by `key_id` and inserts `records` in its
    /// place. Records are re-owned by `key_id`; a later record with the same
    /// txid overwrites an earlier one. Returns the partition size afterwards.
    pub fn replace_for_key(
        &self,
        key_id: &KeyId,
        records: impl IntoIterator<Item = ShieldedTransactionRecord>,
    ) -> usize {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let mut next: HashMap<LedgerKey, ShieldedTransactionRecord> = guard
            .iter()
            .filter(|(key, _)| &key.key_id != key_id)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        let retained = next.len();

        for mut record in records {
            record.key_id = key_id.clone();
            next.insert(LedgerKey::of(&record), record);
        }

        let partition = next.len() - retained;
        gauge!("ledger_records").set(next.len() as f64);
        *guard = Arc::new(next);
        partition
    }

    /// Cheap point-in-time view of the whole ledger.
    pub fn snapshot(&self) -> LedgerSnapshot {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Every record, in no particular order.
    pub fn all_records(&self) -> Vec<ShieldedTransactionRecord> {
        self.snapshot().values().cloned().collect()
    }

    /// Records ordered for tabular display: newest block first, ties broken
    /// by txid so the order is stable.
    pub fn records_by_height_desc(&self) -> Vec<ShieldedTransactionRecord> {
        let mut records = self.all_records();
        records.sort_by(|a, b| b.height.cmp(&a.height).then_with(|| a.txid.cmp(&b.txid)));
        records
    }

    pub fn records_for_key(&self, key_id: &KeyId) -> Vec<ShieldedTransactionRecord> {
        self.snapshot()
            .values()
            .filter(|record| &record.key_id == key_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::default();
        gauge!("ledger_records").set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, ShieldedPool, TxDirection};

    fn record(txid: &str, key: &str, height: u64) -> ShieldedTransactionRecord {
        ShieldedTransactionRecord {
            txid: txid.to_string(),
            height,
            time: 0,
            amount: Amount::from_atomic(1),
            direction: TxDirection::In,
            pool: ShieldedPool::Sapling,
            key_id: KeyId::from(key),
            memo: None,
        }
    }

    #[test]
    fn replace_is_idempotent() {
        let ledger = TransactionLedger::new();
        let key = KeyId::from("k1");
        let batch = vec![record("a", "k1", 1), record("b", "k1", 2)];

        assert_eq!(ledger.replace_for_key(&key, batch.clone()), 2);
        let first = ledger.snapshot();
        assert_eq!(ledger.replace_for_key(&key, batch), 2);
        assert_eq!(*first, *ledger.snapshot());
    }

    #[test]
    fn empty_replacement_clears_only_that_key() {
        let ledger = TransactionLedger::new();
        let k1 = KeyId::from("k1");
        let k2 = KeyId::from("k2");
        ledger.replace_for_key(&k1, vec![record("a", "k1", 1)]);
        ledger.replace_for_key(&k2, vec![record("a", "k2", 1), record("c", "k2", 3)]);

        assert_eq!(ledger.replace_for_key(&k1, Vec::new()), 0);
        assert!(ledger.records_for_key(&k1).is_empty());
        assert_eq!(ledger.records_for_key(&k2).len(), 2);
    }

    #[test]
    fn replacement_drops_stale_records() {
        let ledger = TransactionLedger::new();
        let key = KeyId::from("k1");
        ledger.replace_for_key(&key, vec![record("old", "k1", 1)]);
        ledger.replace_for_key(&key, vec![record("new", "k1", 2)]);

        let txids: Vec<_> = ledger.all_records().into_iter().map(|r| r.txid).collect();
        assert_eq!(txids, vec!["new".to_string()]);
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let ledger = TransactionLedger::new();
        let key = KeyId::from("k1");
        ledger.replace_for_key(&key, vec![record("a", "k1", 1)]);
        let before = ledger.snapshot();
        ledger.replace_for_key(&key, vec![record("b", "k1", 2), record("c", "k1", 3)]);

        assert_eq!(before.len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn records_are_reowned_by_partition_key() {
        let ledger = TransactionLedger::new();
        let key = KeyId::from("k1");
        ledger.replace_for_key(&key, vec![record("a", "other", 1)]);
        assert_eq!(ledger.records_for_key(&key).len(), 1);
    }

    #[test]
    fn display_order_is_newest_first() {
        let ledger = TransactionLedger::new();
        let key = KeyId::from("k1");
        ledger.replace_for_key(
            &key,
            vec![record("a", "k1", 5), record("b", "k1", 9), record("c", "k1", 7)],
        );
        let heights: Vec<_> = ledger
            .records_by_height_desc()
            .into_iter()
            .map(|r| r.height)
            .collect();
        assert_eq!(heights, vec![9, 7, 5]);

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
