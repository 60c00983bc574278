use async_trait::async_trait;
use shielded_watch_domain::{CompactBlock, KeyId, ShieldedTransactionRecord, ViewingKey};
use thiserror::Error;

/// Trial-decryption capability. Implementations own cryptographic
/// correctness and perform no network I/O; the session never runs two scans
/// at once.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(
        &self,
        key: &ViewingKey,
        key_id: &KeyId,
        blocks: &[CompactBlock],
    ) -> Result<Vec<ShieldedTransactionRecord>, ScanFailure>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    #[error("viewing key {key_id} is invalid: {message}")]
    InvalidViewingKey { key_id: KeyId, message: String },
    #[error("scan of key {key_id} failed at block {height}: {message}")]
    AtHeight {
        key_id: KeyId,
        height: u64,
        message: String,
    },
    #[error("scan of key {key_id} failed: {message}")]
    Engine { key_id: KeyId, message: String },
}

impl ScanFailure {
    pub fn key_id(&self) -> &KeyId {
        match self {
            ScanFailure::InvalidViewingKey { key_id, .. }
            | ScanFailure::AtHeight { key_id, .. }
            | ScanFailure::Engine { key_id, .. } => key_id,
        }
    }

    pub fn height(&self) -> Option<u64> {
        match self {
            ScanFailure::AtHeight { height, .. } => Some(*height),
            _ => None,
        }
    }
}
