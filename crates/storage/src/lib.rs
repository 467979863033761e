//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).

mod alert_email_store;
mod contract_store;
mod cursor_store;
mod entity;
mod errors;
mod migration;

use std::sync::Arc;

use contract_watch_domain::storage::StorageResult;
use errors::StorageError;
use migration::run_migrations;
use sea_orm::{Database, DatabaseConnection};

/// Shared storage handle used by every contract monitor task.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
