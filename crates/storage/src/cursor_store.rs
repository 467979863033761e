use contract_watch_domain::model::ContractId;
use contract_watch_domain::storage::{BlockCursorStore, StorageResult};
use sea_orm::{sea_query::OnConflict, EntityTrait, Set, TransactionTrait};

use crate::entity::block_cursors;
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl BlockCursorStore for SeaOrmStorage {
    async fn last_processed_block(&self, id: ContractId) -> StorageResult<Option<u64>> {
        let maybe = block_cursors::Entity::find_by_id(id.get())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(|model| model.last_block as u64))
    }

    async fn advance_cursor(&self, id: ContractId, height: u64) -> StorageResult<()> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        let current = block_cursors::Entity::find_by_id(id.get())
            .one(&txn)
            .await
            .map_err(StorageError::from_source)?;
        if current.is_some_and(|model| model.last_block as u64 >= height) {
            return Ok(());
        }

        let active = block_cursors::ActiveModel {
            contract_id: Set(id.get()),
            last_block: Set(height as i64),
        };
        block_cursors::Entity::insert(active)
            .on_conflict(
                OnConflict::column(block_cursors::Column::ContractId)
                    .update_column(block_cursors::Column::LastBlock)
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;

        txn.commit().await.map_err(StorageError::from_source)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::storage;

    #[tokio::test]
    async fn cursor_only_moves_forward() {
        let storage = storage().await;
        let id = ContractId::new(7);

        assert_eq!(storage.last_processed_block(id).await.unwrap(), None);

        storage.advance_cursor(id, 1_000).await.unwrap();
        assert_eq!(storage.last_processed_block(id).await.unwrap(), Some(1_000));

        storage.advance_cursor(id, 900).await.unwrap();
        assert_eq!(storage.last_processed_block(id).await.unwrap(), Some(1_000));

        storage.advance_cursor(id, 1_250).await.unwrap();
        assert_eq!(storage.last_processed_block(id).await.unwrap(), Some(1_250));
    }

    #[tokio::test]
    async fn cursors_are_keyed_by_contract() {
        let storage = storage().await;
        storage.advance_cursor(ContractId::new(1), 10).await.unwrap();
        storage.advance_cursor(ContractId::new(2), 20).await.unwrap();

        assert_eq!(
            storage
                .last_processed_block(ContractId::new(1))
                .await
                .unwrap(),
            Some(10)
        );
        assert_eq!(
            storage
                .last_processed_block(ContractId::new(2))
                .await
                .unwrap(),
            Some(20)
        );
    }
}
