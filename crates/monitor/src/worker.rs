use std::{collections::HashSet, sync::Arc, time::Duration};

use alloy::primitives::{Address, B256};
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use contract_watch_domain::{
    address::{checksummed, normalize_address, AddressError},
    config::ConfigError,
    model::{
        sleep_interval, ContractId, ContractRecord, ContractStatus, StatusTransition, Threat,
        ThreatLevel,
    },
    services::telemetry::TelemetryError,
    storage::{ContractStore, StorageError},
};

use crate::{
    cursor::{BlockRangeTracker, BlockWindow},
    notify::{NotificationDispatcher, NotificationError},
    pipeline::{analyze_transaction, format_ether},
    rpc::{ChainClient, ChainClientResolver, ChainError, LogEntry},
};

/// Pause after a failure that escaped a scan (storage down, bad config).
pub const CRITICAL_ERROR_BACKOFF: Duration = Duration::from_secs(60);
/// Pause when the watched address holds no bytecode.
pub const MISSING_CODE_BACKOFF: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("address error: {0}")]
    Address(#[from] AddressError),
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl MonitorError {
    /// Chain failures inside a window only skip the cursor advance; the rest
    /// trigger the long backoff.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Self::Chain(_))
    }
}

/// Collaborators shared by every contract monitor.
#[derive(Clone)]
pub struct MonitorDeps {
    pub contracts: Arc<dyn ContractStore>,
    pub resolver: Arc<dyn ChainClientResolver>,
    pub tracker: Arc<BlockRangeTracker>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub scan_permits: Arc<Semaphore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The contract record is gone; the monitor ends.
    Stopped,
    Sleep(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    ContractRemoved,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WindowReport {
    transactions: usize,
    threats: usize,
}

enum WindowScan {
    MissingCode,
    Completed(WindowReport),
}

/// Watches a single contract until its record disappears or the token is
/// cancelled.
pub struct ContractMonitor {
    id: ContractId,
    deps: MonitorDeps,
}

impl ContractMonitor {
    pub fn new(id: ContractId, deps: MonitorDeps) -> Self {
        Self { id, deps }
    }

    /// Cancellation is observed between scans and while sleeping. A scan in
    /// flight always finishes, so committed alerts are never left without
    /// their notifications.
    pub async fn run(self, cancel: CancellationToken) -> MonitorExit {
        info!(contract_id = %self.id, "starting monitoring service");
        loop {
            if cancel.is_cancelled() {
                return MonitorExit::Cancelled;
            }
            let pause = match self.tick().await {
                ScanOutcome::Stopped => {
                    warn!(contract_id = %self.id, "contract not found in database, stopping monitor");
                    return MonitorExit::ContractRemoved;
                }
                ScanOutcome::Sleep(pause) => pause,
            };
            tokio::select! {
                _ = cancel.cancelled() => return MonitorExit::Cancelled,
                _ = sleep(pause) => {}
            }
        }
    }

    /// One iteration. Errors never escape; they become a backoff.
    pub async fn tick(&self) -> ScanOutcome {
        match self.scan().await {
            Ok(outcome) => outcome,
            Err(err) => {
                counter!("monitor_scans_total", "result" => "critical").increment(1);
                error!(contract_id = %self.id, %err, "critical error in monitor loop");
                ScanOutcome::Sleep(CRITICAL_ERROR_BACKOFF)
            }
        }
    }

    async fn scan(&self) -> Result<ScanOutcome, MonitorError> {
        // Only fails once the semaphore is closed, which never happens.
        let _permit = self.deps.scan_permits.acquire().await.ok();

        let Some(contract) = self.deps.contracts.find_contract(self.id).await? else {
            return Ok(ScanOutcome::Stopped);
        };
        info!(
            contract_id = %self.id,
            address = %contract.address,
            network = %contract.network,
            "monitoring contract"
        );

        let client = self.deps.resolver.resolve(&contract.network)?;
        let address = normalize_address(&contract.address)?;
        let current_height = client.current_height().await?;
        let window = self.deps.tracker.next_window(self.id, current_height).await?;
        let interval = sleep_interval(&contract.monitoring_frequency);

        if window.is_empty() {
            warn!(
                contract_id = %self.id,
                from_block = window.from,
                to_block = window.to,
                "endpoint is behind the last processed block, skipping scan"
            );
            return Ok(ScanOutcome::Sleep(interval));
        }
        info!(
            contract_id = %self.id,
            from_block = window.from,
            to_block = window.to,
            "checking contract activity"
        );

        match self
            .scan_window(client.as_ref(), &contract, address, window)
            .await
        {
            Ok(WindowScan::MissingCode) => {
                counter!("monitor_scans_total", "result" => "missing_code").increment(1);
                return Ok(ScanOutcome::Sleep(MISSING_CODE_BACKOFF));
            }
            Ok(WindowScan::Completed(report)) => {
                self.deps.tracker.advance(self.id, current_height).await?;
                counter!("monitor_scans_total", "result" => "ok").increment(1);
                gauge!("monitor_last_block", "contract_id" => self.id.to_string())
                    .set(current_height as f64);
                info!(
                    contract_id = %self.id,
                    last_block = current_height,
                    transactions = report.transactions,
                    threats = report.threats,
                    "updated last processed block"
                );
            }
            Err(err) if err.is_critical() => return Err(err),
            Err(err) => {
                counter!("monitor_scans_total", "result" => "error").increment(1);
                error!(contract_id = %self.id, %err, "error processing contract");
            }
        }

        debug!(
            contract_id = %self.id,
            frequency = %contract.monitoring_frequency,
            sleep_secs = interval.as_secs(),
            "next check scheduled"
        );
        Ok(ScanOutcome::Sleep(interval))
    }

    async fn scan_window(
        &self,
        client: &dyn ChainClient,
        contract: &ContractRecord,
        address: Address,
        window: BlockWindow,
    ) -> Result<WindowScan, MonitorError> {
        let checksum_address = checksummed(&address);

        let code = client.code_at(address).await?;
        if code.is_empty() {
            error!(contract_id = %self.id, address = %checksum_address, "no contract code found at address");
            return Ok(WindowScan::MissingCode);
        }
        debug!(contract_id = %self.id, address = %checksum_address, "contract code verified");

        match client.balance_of(address).await {
            Ok(balance) => {
                let ether = format_ether(balance).unwrap_or_else(|_| balance.to_string());
                info!(contract_id = %self.id, balance_eth = %ether, "current contract balance");
            }
            Err(err) => warn!(contract_id = %self.id, %err, "failed to fetch contract balance"),
        }

        let logs = fetch_window_logs(client, address, window).await?;
        // Alerts are counted per distinct transaction, not per log entry.
        let transactions = distinct_transactions(&logs);
        if transactions.is_empty() {
            info!(contract_id = %self.id, address = %checksum_address, "no new transactions found");
            return Ok(WindowScan::Completed(WindowReport::default()));
        }
        info!(contract_id = %self.id, count = transactions.len(), "found transactions to analyze");

        let mut threats = Vec::new();
        for (index, (hash, block)) in transactions.iter().enumerate() {
            debug!(
                contract_id = %self.id,
                tx_hash = %hash,
                block = *block,
                position = index + 1,
                total = transactions.len(),
                "analyzing transaction"
            );
            let found = analyze_transaction(client, *hash).await;
            if !found.is_empty() {
                warn!(contract_id = %self.id, tx_hash = %hash, count = found.len(), "found threats in transaction");
            }
            threats.extend(found);
        }

        if !threats.is_empty() {
            self.raise_alerts(contract, &threats).await?;
        }

        Ok(WindowScan::Completed(WindowReport {
            transactions: transactions.len(),
            threats: threats.len(),
        }))
    }

    /// Persists all findings in one transaction, then notifies subscribers.
    async fn raise_alerts(
        &self,
        contract: &ContractRecord,
        threats: &[Threat],
    ) -> Result<(), MonitorError> {
        warn!(contract_id = %self.id, total = threats.len(), "threats detected");
        counter!("monitor_threats_total").increment(threats.len() as u64);

        let Some(transition) = self
            .deps
            .contracts
            .record_findings(self.id, threats)
            .await?
        else {
            warn!(contract_id = %self.id, "contract removed before findings were recorded");
            return Ok(());
        };

        if lowers_severity(&transition) {
            warn!(
                contract_id = %self.id,
                status = %transition.previous_status,
                threat_level = %transition.previous_threat_level,
                "new findings replace a more severe assessment"
            );
        }
        info!(
            contract_id = %self.id,
            from = %transition.previous_status,
            to = %ContractStatus::Warning,
            "updated contract status"
        );
        info!(
            contract_id = %self.id,
            from = %transition.previous_threat_level,
            to = %ThreatLevel::Medium,
            "updated threat level"
        );
        for threat in threats {
            info!(
                contract_id = %self.id,
                kind = %threat.kind,
                description = %threat.description,
                "created alert"
            );
        }

        let report = self.deps.dispatcher.notify(contract, threats).await;
        info!(
            contract_id = %self.id,
            alerts = transition.alerts_created,
            recorded_at = %transition.recorded_at,
            sent = report.sent,
            failed = report.failed,
            "alerts and notifications processed"
        );
        Ok(())
    }
}

/// Findings always write Warning and Medium, which is a step down for a
/// record an operator already marked Critical or High.
fn lowers_severity(transition: &StatusTransition) -> bool {
    matches!(
        transition.previous_status.parse::<ContractStatus>(),
        Ok(ContractStatus::Critical)
    ) || matches!(
        transition.previous_threat_level.parse::<ThreatLevel>(),
        Ok(ThreatLevel::High)
    )
}

/// Collects the window's logs. Windows the endpoint refuses as too wide are
/// split in half until each piece is accepted, so no block is skipped.
async fn fetch_window_logs(
    client: &dyn ChainClient,
    address: Address,
    window: BlockWindow,
) -> Result<Vec<LogEntry>, ChainError> {
    let mut logs = Vec::new();
    // Lower halves are pushed last so pieces are fetched in block order.
    let mut pending = vec![window];
    while let Some(piece) = pending.pop() {
        match client.logs_in_range(address, piece).await {
            Ok(found) => logs.extend(found),
            Err(ChainError::RangeTooWide(reason)) if piece.from < piece.to => {
                let mid = piece.from + (piece.to - piece.from) / 2;
                debug!(
                    from_block = piece.from,
                    to_block = piece.to,
                    %reason,
                    "block range too wide, splitting"
                );
                pending.push(BlockWindow::new(mid + 1, piece.to));
                pending.push(BlockWindow::new(piece.from, mid));
            }
            Err(ChainError::RangeUnavailable(reason)) => {
                counter!("monitor_range_unavailable_total").increment(1);
                warn!(
                    from_block = piece.from,
                    to_block = piece.to,
                    %reason,
                    "block range not available, treating it as empty"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(logs)
}

/// Transaction hashes in first-seen order, each once, with the block of the
/// first log that named them.
fn distinct_transactions(logs: &[LogEntry]) -> Vec<(B256, Option<u64>)> {
    let mut seen = HashSet::new();
    logs.iter()
        .filter_map(|log| log.transaction_hash.map(|hash| (hash, log.block_number)))
        .filter(|(hash, _)| seen.insert(*hash))
        .collect()
}
