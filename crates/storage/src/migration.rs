use sea_orm::sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{alert_emails, alerts, block_cursors, contracts};
use contract_watch_domain::storage::StorageResult;

/// Creates any missing tables. The schema itself is owned by the management
/// surface; this only guarantees the columns the monitor touches exist.
pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let contracts_table = Table::create()
        .table(contracts::Entity)
        .col(
            ColumnDef::new(contracts::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(contracts::Column::Address)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(contracts::Column::Network)
                .string_len(32)
                .not_null(),
        )
        .col(
            ColumnDef::new(contracts::Column::MonitoringFrequency)
                .string_len(16)
                .not_null()
                .default("5min"),
        )
        .col(
            ColumnDef::new(contracts::Column::Status)
                .string_len(16)
                .not_null()
                .default("Normal"),
        )
        .col(
            ColumnDef::new(contracts::Column::ThreatLevel)
                .string_len(16)
                .not_null()
                .default("Low"),
        )
        .to_owned();
    create_table(db, backend, contracts_table).await?;

    let alerts_table = Table::create()
        .table(alerts::Entity)
        .col(
            ColumnDef::new(alerts::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(alerts::Column::ContractId)
                .integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(alerts::Column::AlertType)
                .string_len(64)
                .not_null(),
        )
        .col(ColumnDef::new(alerts::Column::Description).text().not_null())
        .col(
            ColumnDef::new(alerts::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, alerts_table).await?;

    let alert_emails_table = Table::create()
        .table(alert_emails::Entity)
        .col(
            ColumnDef::new(alert_emails::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(alert_emails::Column::ContractId)
                .integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(alert_emails::Column::Email)
                .string_len(255)
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, alert_emails_table).await?;

    let cursors_table = Table::create()
        .table(block_cursors::Entity)
        .col(
            ColumnDef::new(block_cursors::Column::ContractId)
                .integer()
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(block_cursors::Column::LastBlock)
                .big_integer()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, cursors_table).await?;

    let alerts_by_contract = Index::create()
        .name("idx_alerts_contract_id")
        .table(alerts::Entity)
        .col(alerts::Column::ContractId)
        .to_owned();
    create_index(db, backend, alerts_by_contract).await?;

    let emails_by_contract = Index::create()
        .name("idx_alert_emails_contract_id")
        .table(alert_emails::Entity)
        .col(alert_emails::Column::ContractId)
        .to_owned();
    create_index(db, backend, emails_by_contract).await?;

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
        .map_err(crate::errors::StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(crate::errors::StorageError::from_source)?;
    Ok(())
}
