//! Persistence seams. The core keeps its state in memory; adapters behind
//! these traits decide whether and where it survives a restart.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::AlertSnapshot;

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt state under `{namespace}`: {message}")]
    Corrupt { namespace: String, message: String },
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Rule and alert history persisted as one `{ rules, alerts }` document under
/// a namespace key.
#[async_trait]
pub trait AlertStateStore: Send + Sync {
    async fn load_alert_state(&self, namespace: &str) -> StorageResult<Option<AlertSnapshot>>;
    async fn save_alert_state(
        &self,
        namespace: &str,
        snapshot: &AlertSnapshot,
    ) -> StorageResult<()>;
}
