use std::sync::{Mutex, PoisonError};

use metrics::{counter, histogram};
use shielded_watch_domain::{
    services::{AlertEngine, TransactionLedger},
    storage::StorageError,
    Alert, CompactBlock, KeyId, ShieldedPool, ShieldedTransactionRecord, ViewingKeyProfile,
};
use tracing::{info, warn};

use crate::engine::{ScanEngine, ScanFailure};

/// What one committed key scan produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScanOutcome {
    pub key_id: KeyId,
    pub record_count: usize,
    pub sapling_count: usize,
    pub orchard_count: usize,
    pub new_alerts: Vec<Alert>,
    /// Set when the alerts above could not be written to the attached store.
    /// They are still held in memory.
    pub alert_save_error: Option<StorageError>,
}

/// Scans one key and, on success, replaces its ledger partition and runs the
/// alert rules over the fresh records. A failed scan leaves the ledger and the
/// alert state untouched.
pub async fn scan_key<E>(
    engine: &E,
    ledger: &TransactionLedger,
    alerts: &Mutex<AlertEngine>,
    profile: &ViewingKeyProfile,
    blocks: &[CompactBlock],
) -> Result<KeyScanOutcome, ScanFailure>
where
    E: ScanEngine + ?Sized,
{
    let records = match engine.scan(&profile.key, &profile.id, blocks).await {
        Ok(records) => records,
        Err(err) => {
            counter!("monitor_key_scans_total", "result" => "error").increment(1);
            warn!(
                key_id = profile.id.as_str(),
                fingerprint = %profile.fingerprint(),
                height = err.height(),
                error = %err,
                "key scan failed; keeping previous records"
            );
            return Err(err);
        }
    };

    let records: Vec<ShieldedTransactionRecord> = records
        .into_iter()
        .map(|mut record| {
            record.key_id = profile.id.clone();
            record
        })
        .collect();

    let record_count = ledger.replace_for_key(&profile.id, records.iter().cloned());
    let new_alerts = alerts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .evaluate(&records);

    // Counted over the committed partition, where records sharing a txid
    // have collapsed into one entry.
    let sapling_count = ledger
        .records_for_key(&profile.id)
        .iter()
        .filter(|record| record.pool == ShieldedPool::Sapling)
        .count();

    counter!("monitor_key_scans_total", "result" => "ok").increment(1);
    histogram!("monitor_records_committed").record(record_count as f64);
    info!(
        key_id = profile.id.as_str(),
        records = record_count,
        alerts = new_alerts.len(),
        "key scan committed"
    );

    Ok(KeyScanOutcome {
        key_id: profile.id.clone(),
        record_count,
        sapling_count,
        orchard_count: record_count - sapling_count,
        new_alerts,
        alert_save_error: None,
    })
}
