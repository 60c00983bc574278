use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use metrics::gauge;
use thiserror::Error;
use tracing::{info, warn};

use shielded_watch_domain::{
    config::{ConfigError, WatchConfig},
    services::{init_telemetry, AlertEngine, TelemetryConfig, TelemetryError, TransactionLedger},
    storage::{AlertStateStore, StorageError},
    Alert, CompactBlock, KeyId, ViewingKeyProfile,
};
use shielded_watch_storage::SeaOrmStorage;

use crate::{
    engine::{ScanEngine, ScanFailure},
    normalize::{normalize_blocks, NormalizeError},
    pipeline::{scan_key, KeyScanOutcome},
    source::BlockSource,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("block source error: {0}")]
    Source(String),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("invalid scan range {start}..={end}")]
    InvalidRange { start: u64, end: u64 },
    #[error(transparent)]
    Scan(#[from] ScanFailure),
    #[error(transparent)]
    Aggregate(#[from] AggregateScanFailure),
}

/// A multi-key scan stopped at `key_index`. Keys in `committed` kept the
/// records they produced earlier in the same call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "scan halted at key #{key_index} ({key_id}) after {} committed key(s): {source}",
    .committed.len()
)]
pub struct AggregateScanFailure {
    pub key_index: usize,
    pub key_id: KeyId,
    pub committed: Vec<KeyId>,
    #[source]
    pub source: ScanFailure,
}

/// Emitted after each committed key of a multi-key scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub key_index: usize,
    pub key_count: usize,
    pub label: String,
    pub cumulative: usize,
}

impl fmt::Display for ScanProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned key {}/{} ({}), {} transaction(s) so far",
            self.key_index + 1,
            self.key_count,
            self.label,
            self.cumulative
        )
    }
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &ScanProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ScanProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &ScanProgress) {
        self(progress)
    }
}

/// Writes progress to the `info` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, progress: &ScanProgress) {
        info!(key_index = progress.key_index, "{progress}");
    }
}

/// Result of a full range scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub start_height: u64,
    pub end_height: u64,
    pub blocks_scanned: usize,
    pub blocks_rejected: Vec<NormalizeError>,
    pub sapling_outputs: usize,
    pub orchard_actions: usize,
    pub sapling_records: usize,
    pub orchard_records: usize,
    pub total_records: usize,
    pub new_alerts: Vec<Alert>,
    /// Alert saves that failed during the run, one per affected key.
    pub alert_save_errors: Vec<StorageError>,
    pub keys: Vec<KeyScanOutcome>,
}

struct AlertPersistence {
    store: Arc<dyn AlertStateStore>,
    namespace: String,
}

/// Ledger and alert state for one set of keys, plus the engine that feeds
/// them. Independent sessions share nothing.
pub struct ScanSession<E> {
    engine: E,
    ledger: Arc<TransactionLedger>,
    alerts: Arc<Mutex<AlertEngine>>,
    persistence: Option<AlertPersistence>,
    // Held for the whole of a scan; the engine is never entered twice.
    scan_gate: tokio::sync::Mutex<()>,
}

impl<E> ScanSession<E>
where
    E: ScanEngine,
{
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            ledger: Arc::new(TransactionLedger::new()),
            alerts: Arc::new(Mutex::new(AlertEngine::new())),
            persistence: None,
            scan_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_alert_store(
        mut self,
        store: Arc<dyn AlertStateStore>,
        namespace: impl Into<String>,
    ) -> Self {
        self.persistence = Some(AlertPersistence {
            store,
            namespace: namespace.into(),
        });
        self
    }

    /// Replaces the in-memory alert state with the persisted one, if any.
    /// Returns whether a stored snapshot was found.
    pub async fn restore_alerts(&self) -> Result<bool, MonitorError> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };

        let Some(snapshot) = persistence
            .store
            .load_alert_state(&persistence.namespace)
            .await?
        else {
            return Ok(false);
        };

        info!(
            namespace = persistence.namespace.as_str(),
            rules = snapshot.rules.len(),
            alerts = snapshot.alerts.len(),
            "restored alert state"
        );
        *self.alerts() = AlertEngine::from_snapshot(snapshot);
        Ok(true)
    }

    /// Writes the current rules and alert history to the attached store.
    /// Without a store this is a no-op.
    pub async fn persist_alerts(&self) -> Result<(), MonitorError> {
        Ok(self.save_alert_state().await?)
    }

    async fn save_alert_state(&self) -> Result<(), StorageError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let snapshot = self.alerts().snapshot();
        persistence
            .store
            .save_alert_state(&persistence.namespace, &snapshot)
            .await
    }

    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    /// Locks the alert state for rule CRUD and acknowledgement. Callers
    /// should call `persist_alerts` afterwards when a store is attached.
    pub fn alerts(&self) -> MutexGuard<'_, AlertEngine> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn alert_state(&self) -> Arc<Mutex<AlertEngine>> {
        Arc::clone(&self.alerts)
    }

    /// Saves alert state after a committed key produced alerts. A failed save
    /// is logged and recorded on the outcome; the commit stands.
    async fn save_after_commit(&self, outcome: &mut KeyScanOutcome) {
        if outcome.new_alerts.is_empty() {
            return;
        }
        if let Err(err) = self.save_alert_state().await {
            warn!(
                key_id = outcome.key_id.as_str(),
                alerts = outcome.new_alerts.len(),
                error = %err,
                "failed to save alert state; alerts kept in memory"
            );
            outcome.alert_save_error = Some(err);
        }
    }

    /// Scans a single key. On failure the key's previous records stay.
    pub async fn scan_one(
        &self,
        profile: &ViewingKeyProfile,
        blocks: &[CompactBlock],
    ) -> Result<KeyScanOutcome, MonitorError> {
        let _gate = self.scan_gate.lock().await;
        let mut outcome =
            scan_key(&self.engine, &self.ledger, &self.alerts, profile, blocks).await?;
        self.save_after_commit(&mut outcome).await;
        Ok(outcome)
    }

    /// Scans keys one after another in registry order. The first scan
    /// failure stops the run; keys committed before it are not rolled back.
    /// Failed alert saves do not stop it.
    pub async fn scan_all(
        &self,
        keys: &[ViewingKeyProfile],
        blocks: &[CompactBlock],
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<KeyScanOutcome>, MonitorError> {
        let _gate = self.scan_gate.lock().await;
        let mut outcomes: Vec<KeyScanOutcome> = Vec::with_capacity(keys.len());
        let mut cumulative = 0usize;

        for (key_index, profile) in keys.iter().enumerate() {
            let mut outcome =
                match scan_key(&self.engine, &self.ledger, &self.alerts, profile, blocks).await {
                    Ok(outcome) => outcome,
                    Err(source) => {
                        warn!(
                            key_index,
                            committed = outcomes.len(),
                            "multi-key scan halted"
                        );
                        return Err(AggregateScanFailure {
                            key_index,
                            key_id: profile.id.clone(),
                            committed: outcomes.into_iter().map(|o| o.key_id).collect(),
                            source,
                        }
                        .into());
                    }
                };

            self.save_after_commit(&mut outcome).await;

            cumulative += outcome.record_count;
            observer.on_progress(&ScanProgress {
                key_index,
                key_count: keys.len(),
                label: profile.label.clone(),
                cumulative,
            });
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Fetches and normalizes `start_height..=end_height`, then scans every
    /// key over the accepted blocks.
    pub async fn scan_range<S>(
        &self,
        source: &S,
        keys: &[ViewingKeyProfile],
        start_height: u64,
        end_height: u64,
        observer: &dyn ProgressObserver,
    ) -> Result<ScanReport, MonitorError>
    where
        S: BlockSource + ?Sized,
    {
        if end_height < start_height {
            return Err(MonitorError::InvalidRange {
                start: start_height,
                end: end_height,
            });
        }

        let raw = source.fetch_blocks(start_height, end_height).await?;
        let normalized = normalize_blocks(raw);
        let sapling_outputs: usize = normalized
            .blocks
            .iter()
            .map(CompactBlock::sapling_output_count)
            .sum();
        let orchard_actions: usize = normalized
            .blocks
            .iter()
            .map(CompactBlock::orchard_action_count)
            .sum();
        gauge!("monitor_last_height").set(end_height as f64);
        info!(
            start_height,
            end_height,
            blocks = normalized.blocks.len(),
            rejected = normalized.rejected.len(),
            sapling_outputs,
            orchard_actions,
            keys = keys.len(),
            "scanning range"
        );

        let outcomes = self.scan_all(keys, &normalized.blocks, observer).await?;

        let mut report = ScanReport {
            start_height,
            end_height,
            blocks_scanned: normalized.blocks.len(),
            blocks_rejected: normalized.rejected,
            sapling_outputs,
            orchard_actions,
            ..ScanReport::default()
        };
        for outcome in &outcomes {
            report.sapling_records += outcome.sapling_count;
            report.orchard_records += outcome.orchard_count;
            report.total_records += outcome.record_count;
            report.new_alerts.extend(outcome.new_alerts.iter().cloned());
            report
                .alert_save_errors
                .extend(outcome.alert_save_error.iter().cloned());
        }
        report.keys = outcomes;
        Ok(report)
    }
}

/// Builds a session from configuration, attaching and restoring the
/// persisted alert state when a database URL is configured.
pub async fn open_session<E>(
    engine: E,
    config: &WatchConfig,
) -> Result<ScanSession<E>, MonitorError>
where
    E: ScanEngine,
{
    let mut session = ScanSession::new(engine);
    if let Some(url) = config.database_url() {
        let storage = SeaOrmStorage::connect(url).await?;
        session = session.with_alert_store(Arc::new(storage), config.alert_namespace());
        session.restore_alerts().await?;
    }
    Ok(session)
}

/// One-shot scan driven by the environment: telemetry, configuration,
/// persisted alert state, then the configured range (up to the chain tip
/// when no end height is set).
pub async fn run_monitor<E, S>(
    engine: E,
    source: &S,
    keys: &[ViewingKeyProfile],
    observer: &dyn ProgressObserver,
) -> Result<(ScanSession<E>, ScanReport), MonitorError>
where
    E: ScanEngine,
    S: BlockSource + ?Sized,
{
    let config = WatchConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    init_telemetry(&telemetry_config)?;

    let session = open_session(engine, &config).await?;
    let end_height = match config.end_height() {
        Some(end) => end,
        None => source.chain_tip().await?,
    };

    let report = session
        .scan_range(source, keys, config.start_height(), end_height, observer)
        .await?;
    Ok((session, report))
}
