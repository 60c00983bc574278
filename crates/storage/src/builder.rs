use sea_orm::ConnectOptions;
use shielded_watch_domain::storage::{StorageError, StorageResult};

use crate::SeaOrmStorage;

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;

        let mut options = ConnectOptions::new(url.clone());
        options.sqlx_logging(false);
        // Every pooled connection to an in-memory SQLite URL opens its own
        // empty database.
        if is_in_memory(&url) {
            options.max_connections(1);
        } else if let Some(max) = self.max_connections {
            options.max_connections(max);
        }

        SeaOrmStorage::open(options).await
    }
}

fn is_in_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_sqlite() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:state?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://watch.db?mode=rwc"));
        assert!(!is_in_memory("postgres://localhost/watch"));
    }

    #[tokio::test]
    async fn build_requires_url() {
        let err = StorageBuilder::new().build().await.err();
        assert_eq!(
            err,
            Some(StorageError::Database("missing database url".into()))
        );
    }
}
