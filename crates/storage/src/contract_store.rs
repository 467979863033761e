use chrono::Utc;
use contract_watch_domain::model::{
    ContractId, ContractRecord, ContractStatus, StatusTransition, Threat, ThreatLevel,
};
use contract_watch_domain::storage::{ContractStore, StorageResult};
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, QuerySelect, Set, TransactionTrait};

use crate::entity::{alerts, contracts};
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ContractStore for SeaOrmStorage {
    async fn find_contract(&self, id: ContractId) -> StorageResult<Option<ContractRecord>> {
        let maybe = contracts::Entity::find_by_id(id.get())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(contract_to_record))
    }

    async fn list_contract_ids(&self) -> StorageResult<Vec<ContractId>> {
        let ids: Vec<i32> = contracts::Entity::find()
            .select_only()
            .column(contracts::Column::Id)
            .order_by_asc(contracts::Column::Id)
            .into_tuple()
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(ids.into_iter().map(ContractId::new).collect())
    }

    async fn record_findings(
        &self,
        id: ContractId,
        threats: &[Threat],
    ) -> StorageResult<Option<StatusTransition>> {
        if threats.is_empty() {
            return Ok(None);
        }

        // Dropping `txn` on any early return rolls the batch back.
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        let Some(model) = contracts::Entity::find_by_id(id.get())
            .one(&txn)
            .await
            .map_err(StorageError::from_source)?
        else {
            return Ok(None);
        };

        let previous_status = model.status.clone();
        let previous_threat_level = model.threat_level.clone();

        let mut active: contracts::ActiveModel = model.into();
        active.status = Set(ContractStatus::Warning.to_string());
        active.threat_level = Set(ThreatLevel::Medium.to_string());
        active
            .update(&txn)
            .await
            .map_err(StorageError::from_source)?;

        let recorded_at = Utc::now();
        let rows = threats.iter().map(|threat| alerts::ActiveModel {
            contract_id: Set(id.get()),
            alert_type: Set(threat.kind.to_string()),
            description: Set(threat.description.clone()),
            created_at: Set(recorded_at),
            ..Default::default()
        });
        alerts::Entity::insert_many(rows)
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;

        txn.commit().await.map_err(StorageError::from_source)?;

        Ok(Some(StatusTransition {
            previous_status,
            previous_threat_level,
            alerts_created: threats.len(),
            recorded_at,
        }))
    }
}

fn contract_to_record(model: contracts::Model) -> ContractRecord {
    ContractRecord {
        id: ContractId::new(model.id),
        address: model.address,
        network: model.network,
        monitoring_frequency: model.monitoring_frequency,
        status: model.status,
        threat_level: model.threat_level,
    }
}
