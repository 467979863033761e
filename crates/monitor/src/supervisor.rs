//! Owns one background task per watched contract.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use metrics::gauge;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use contract_watch_domain::config::MonitorConfig;
use contract_watch_domain::model::ContractId;
use contract_watch_domain::storage::{BlockCursorStore, ContractStore};
use contract_watch_storage::SeaOrmStorage;

use crate::{
    cursor::{BlockRangeTracker, InMemoryCursorStore},
    notify::{transport_from_config, NotificationDispatcher},
    rpc::RpcClientResolver,
    worker::{ContractMonitor, MonitorDeps, MonitorError, MonitorExit},
};

struct MonitorHandle {
    task: JoinHandle<MonitorExit>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Spawned,
    /// A previous task for the contract had finished and was replaced.
    Restarted,
    AlreadyRunning,
}

pub struct MonitorSupervisor {
    deps: MonitorDeps,
    tasks: DashMap<ContractId, MonitorHandle>,
    shutdown: CancellationToken,
}

impl MonitorSupervisor {
    pub fn new(deps: MonitorDeps) -> Self {
        Self {
            deps,
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts monitoring `id` unless a live task already exists for it.
    pub fn start(&self, id: ContractId) -> StartOutcome {
        match self.tasks.entry(id) {
            Entry::Occupied(entry) if !entry.get().task.is_finished() => {
                warn!(contract_id = %id, "monitor already exists for contract");
                StartOutcome::AlreadyRunning
            }
            Entry::Occupied(mut entry) => {
                info!(contract_id = %id, "previous monitor finished, restarting");
                entry.insert(self.spawn(id));
                StartOutcome::Restarted
            }
            Entry::Vacant(entry) => {
                info!(contract_id = %id, "starting monitor task");
                entry.insert(self.spawn(id));
                StartOutcome::Spawned
            }
        }
    }

    fn spawn(&self, id: ContractId) -> MonitorHandle {
        let cancel = self.shutdown.child_token();
        let monitor = ContractMonitor::new(id, self.deps.clone());
        let task = tokio::spawn(
            monitor
                .run(cancel.clone())
                .instrument(info_span!("contract_monitor", contract_id = %id)),
        );
        MonitorHandle { task, cancel }
    }

    /// Cancels the task for `id`. Returns false when none was tracked.
    pub fn stop(&self, id: ContractId) -> bool {
        match self.tasks.get(&id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: ContractId) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|handle| !handle.task.is_finished())
            .count()
    }

    /// Cancels every task and waits for them to wind down.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let ids: Vec<ContractId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            let Some((_, handle)) = self.tasks.remove(&id) else {
                continue;
            };
            match handle.task.await {
                Ok(exit) => info!(contract_id = %id, ?exit, "monitor stopped"),
                Err(err) => error!(contract_id = %id, %err, "monitor task failed"),
            }
        }
    }
}

/// Wires production collaborators around a connected storage.
pub fn build_deps(config: &MonitorConfig, storage: SeaOrmStorage) -> Result<MonitorDeps, MonitorError> {
    let storage = Arc::new(storage);
    let cursors: Arc<dyn BlockCursorStore> = if config.persist_cursors() {
        storage.clone()
    } else {
        Arc::new(InMemoryCursorStore::default())
    };
    let transport = transport_from_config(config.mail_relay(), config.rpc_timeout())?;

    Ok(MonitorDeps {
        contracts: storage.clone(),
        resolver: Arc::new(RpcClientResolver::new(
            config.rpc_endpoints().clone(),
            config.rpc_timeout(),
        )),
        tracker: Arc::new(BlockRangeTracker::new(cursors)),
        dispatcher: Arc::new(NotificationDispatcher::new(storage, transport)),
        scan_permits: Arc::new(Semaphore::new(config.max_concurrent_scans())),
    })
}

/// Starts monitors for every stored contract, then keeps polling for new
/// ones until ctrl-c.
pub async fn run_monitor(config: MonitorConfig, storage: SeaOrmStorage) -> Result<(), MonitorError> {
    let contracts: Arc<dyn ContractStore> = Arc::new(storage.clone());
    let supervisor = MonitorSupervisor::new(build_deps(&config, storage)?);
    info!(
        persist_cursors = config.persist_cursors(),
        max_concurrent_scans = config.max_concurrent_scans(),
        "contract monitor initialized"
    );

    let mut discovery = tokio::time::interval(config.discovery_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = discovery.tick() => discover(&supervisor, contracts.as_ref()).await,
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

async fn discover(supervisor: &MonitorSupervisor, contracts: &dyn ContractStore) {
    let ids = match contracts.list_contract_ids().await {
        Ok(ids) => ids,
        Err(err) => {
            error!(%err, "failed to list contracts");
            return;
        }
    };
    for id in ids {
        if !supervisor.is_running(id) {
            supervisor.start(id);
        }
    }
    gauge!("monitor_active_contracts").set(supervisor.active_count() as f64);
}
