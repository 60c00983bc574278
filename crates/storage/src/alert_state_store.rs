use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, EntityTrait, Set};
use shielded_watch_domain::{
    storage::{AlertStateStore, StorageError, StorageResult},
    AlertSnapshot,
};

use crate::entity::watch_state;
use crate::SeaOrmStorage;

#[async_trait]
impl AlertStateStore for SeaOrmStorage {
    async fn load_alert_state(&self, namespace: &str) -> StorageResult<Option<AlertSnapshot>> {
        let maybe = watch_state::Entity::find_by_id(namespace.to_string())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        maybe
            .map(|model| {
                serde_json::from_str(&model.value_json).map_err(|err| StorageError::Corrupt {
                    namespace: namespace.to_string(),
                    message: err.to_string(),
                })
            })
            .transpose()
    }

    async fn save_alert_state(
        &self,
        namespace: &str,
        snapshot: &AlertSnapshot,
    ) -> StorageResult<()> {
        let value_json = serde_json::to_string(snapshot).map_err(StorageError::from_source)?;
        let active = watch_state::ActiveModel {
            key: Set(namespace.to_string()),
            value_json: Set(value_json),
            updated_at: Set(Utc::now()),
        };
        watch_state::Entity::insert(active)
            .on_conflict(
                OnConflict::column(watch_state::Column::Key)
                    .update_columns([
                        watch_state::Column::ValueJson,
                        watch_state::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Statement};
    use shielded_watch_domain::{
        services::AlertEngine, AlertKind, Amount, KeyId, NewAlertRule, ShieldedPool,
        ShieldedTransactionRecord, TxDirection,
    };

    async fn storage() -> SeaOrmStorage {
        SeaOrmStorage::connect("sqlite::memory:")
            .await
            .expect("in-memory storage")
    }

    fn engine_with_alert() -> AlertEngine {
        let mut engine = AlertEngine::new();
        engine
            .add_rule(NewAlertRule {
                name: "Large".into(),
                kind: AlertKind::LargeTransaction,
                threshold: Amount::from_atomic(100_000_000),
                enabled: true,
            })
            .unwrap();
        engine.evaluate(&[ShieldedTransactionRecord {
            txid: "tx1".into(),
            height: 1,
            time: 0,
            amount: Amount::from_atomic(150_000_000),
            direction: TxDirection::In,
            pool: ShieldedPool::Sapling,
            key_id: KeyId::from("k1"),
            memo: None,
        }]);
        engine
    }

    #[tokio::test]
    async fn missing_namespace_loads_nothing() {
        let storage = storage().await;
        assert_eq!(storage.load_alert_state("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_restores_gate() {
        let storage = storage().await;
        let snapshot = engine_with_alert().snapshot();

        storage.save_alert_state("alerts", &snapshot).await.unwrap();
        let loaded = storage
            .load_alert_state("alerts")
            .await
            .unwrap()
            .expect("snapshot stored");
        assert_eq!(loaded, snapshot);

        let restored = AlertEngine::from_snapshot(loaded);
        assert!(restored.has_alerted("tx1"));
        assert_eq!(restored.unacknowledged_count(), 1);
    }

    #[tokio::test]
    async fn save_overwrites_and_namespaces_are_isolated() {
        let storage = storage().await;
        let mut engine = engine_with_alert();
        storage
            .save_alert_state("a", &engine.snapshot())
            .await
            .unwrap();

        engine.clear_alerts();
        storage
            .save_alert_state("a", &engine.snapshot())
            .await
            .unwrap();

        let a = storage.load_alert_state("a").await.unwrap().unwrap();
        assert!(a.alerts.is_empty());
        assert_eq!(a.rules.len(), 1);
        assert_eq!(storage.load_alert_state("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let storage = storage().await;
        let backend = storage.connection().get_database_backend();
        storage
            .connection()
            .execute(Statement::from_string(
                backend,
                "INSERT INTO \"watch_state\" (\"key\", \"value_json\", \"updated_at\") \
                 VALUES ('broken', 'not json', '2024-01-01T00:00:00+00:00')",
            ))
            .await
            .unwrap();

        let err = storage.load_alert_state("broken").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { namespace, .. } if namespace == "broken"));
    }
}
