use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AlertEmail, ContractId, ContractRecord, StatusTransition, Threat};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn find_contract(&self, id: ContractId) -> StorageResult<Option<ContractRecord>>;
    async fn list_contract_ids(&self) -> StorageResult<Vec<ContractId>>;
    /// Flags the contract as `Warning`/`Medium` and inserts one alert per
    /// threat in a single transaction. Returns `None` when nothing was
    /// written: the batch was empty or the contract no longer exists.
    async fn record_findings(
        &self,
        id: ContractId,
        threats: &[Threat],
    ) -> StorageResult<Option<StatusTransition>>;
}

#[async_trait]
pub trait AlertEmailStore: Send + Sync {
    async fn subscribers(&self, id: ContractId) -> StorageResult<Vec<AlertEmail>>;
}

#[async_trait]
pub trait BlockCursorStore: Send + Sync {
    async fn last_processed_block(&self, id: ContractId) -> StorageResult<Option<u64>>;
    /// Moves the cursor forward; a lower height than the stored one is ignored.
    async fn advance_cursor(&self, id: ContractId, height: u64) -> StorageResult<()>;
}
