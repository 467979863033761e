use contract_watch_domain::model::{AlertEmail, ContractId};
use contract_watch_domain::storage::{AlertEmailStore, StorageResult};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::alert_emails;
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl AlertEmailStore for SeaOrmStorage {
    async fn subscribers(&self, id: ContractId) -> StorageResult<Vec<AlertEmail>> {
        let rows = alert_emails::Entity::find()
            .filter(alert_emails::Column::ContractId.eq(id.get()))
            .order_by_asc(alert_emails::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;

        Ok(rows
            .into_iter()
            .map(|row| AlertEmail {
                contract_id: ContractId::new(row.contract_id),
                email: row.email,
            })
            .collect())
    }
}
