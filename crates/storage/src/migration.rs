use sea_orm::sea_query::{ColumnDef, Expr, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};
use shielded_watch_domain::storage::{StorageError, StorageResult};

use crate::entity::watch_state;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let state_table = Table::create()
        .table(watch_state::Entity)
        .col(
            ColumnDef::new(watch_state::Column::Key)
                .string_len(128)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(watch_state::Column::ValueJson).text().not_null())
        .col(
            ColumnDef::new(watch_state::Column::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, state_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
