use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use contract_watch_domain::config::ConfigError;
use contract_watch_domain::model::{
    AlertEmail, ContractId, ContractRecord, StatusTransition, Threat,
};
use contract_watch_domain::storage::{AlertEmailStore, ContractStore, StorageError, StorageResult};

use crate::cursor::{BlockRangeTracker, BlockWindow};
use crate::notify::{AlertTransport, NotificationDispatcher, NotificationError, OutboundMessage};
use crate::rpc::{
    ChainClient, ChainClientResolver, ChainError, LogEntry, ReceiptSummary, TransactionDetails,
};
use crate::worker::MonitorDeps;

pub const WATCHED: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

pub fn wei_from_ether(ether: u64) -> U256 {
    U256::from(ether) * U256::from(1_000_000_000_000_000_000u128)
}

pub fn tx_hash(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

pub fn contract(id: i32) -> ContractRecord {
    ContractRecord {
        id: ContractId::new(id),
        address: WATCHED.to_string(),
        network: "ethereum".to_string(),
        monitoring_frequency: "5min".to_string(),
        status: "Normal".to_string(),
        threat_level: "Low".to_string(),
    }
}

pub struct MockChain {
    pub height: AtomicU64,
    pub code: Mutex<Bytes>,
    pub logs: Mutex<Result<Vec<LogEntry>, ChainError>>,
    pub transactions: Mutex<HashMap<B256, TransactionDetails>>,
    pub receipts: Mutex<HashMap<B256, ReceiptSummary>>,
    pub log_queries: Mutex<Vec<BlockWindow>>,
    pub max_log_span: Mutex<Option<u64>>,
    pub detail_lookups: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            height: AtomicU64::new(1_000),
            code: Mutex::new(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40])),
            logs: Mutex::new(Ok(Vec::new())),
            transactions: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            log_queries: Mutex::new(Vec::new()),
            max_log_span: Mutex::new(None),
            detail_lookups: AtomicUsize::new(0),
        }
    }
}

impl MockChain {
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn without_code(&self) {
        *self.code.lock().unwrap() = Bytes::new();
    }

    pub fn fail_logs(&self, err: ChainError) {
        *self.logs.lock().unwrap() = Err(err);
    }

    /// Log queries spanning more than `span` blocks are refused as too wide.
    pub fn limit_log_span(&self, span: u64) {
        *self.max_log_span.lock().unwrap() = Some(span);
    }

    /// Registers a transaction and emits one log for it from each log query.
    pub fn add_transaction(&self, hash: B256, value: U256, receipt: Option<ReceiptSummary>) {
        self.transactions
            .lock()
            .unwrap()
            .insert(hash, TransactionDetails { hash, value });
        if let Some(receipt) = receipt {
            self.receipts.lock().unwrap().insert(hash, receipt);
        }
        if let Ok(logs) = self.logs.lock().unwrap().as_mut() {
            let entry = LogEntry {
                transaction_hash: Some(hash),
                block_number: Some(self.height.load(Ordering::SeqCst)),
            };
            logs.push(entry);
            logs.push(entry);
        }
    }

    pub fn log_queries(&self) -> Vec<BlockWindow> {
        self.log_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_height(&self) -> Result<u64, ChainError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn code_at(&self, _address: Address) -> Result<Bytes, ChainError> {
        Ok(self.code.lock().unwrap().clone())
    }

    async fn balance_of(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(wei_from_ether(3))
    }

    async fn logs_in_range(
        &self,
        _address: Address,
        window: BlockWindow,
    ) -> Result<Vec<LogEntry>, ChainError> {
        self.log_queries.lock().unwrap().push(window);
        if let Some(span) = *self.max_log_span.lock().unwrap() {
            if window.to - window.from > span {
                return Err(ChainError::RangeTooWide(format!(
                    "query exceeds max block range {span}"
                )));
            }
        }
        self.logs.lock().unwrap().clone()
    }

    async fn transaction_details(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionDetails>, ChainError> {
        self.detail_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.transactions.lock().unwrap().get(&hash).copied())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptSummary>, ChainError> {
        Ok(self.receipts.lock().unwrap().get(&hash).copied())
    }
}

pub struct MockResolver {
    pub chain: Arc<MockChain>,
}

impl ChainClientResolver for MockResolver {
    fn resolve(&self, network: &str) -> Result<Arc<dyn ChainClient>, ConfigError> {
        if network == "ethereum" {
            Ok(self.chain.clone())
        } else {
            Err(ConfigError::UnsupportedNetwork {
                network: network.to_string(),
            })
        }
    }
}

#[derive(Default)]
pub struct MockContracts {
    pub contract: Mutex<Option<ContractRecord>>,
    pub recorded: Mutex<Vec<Vec<Threat>>>,
    pub fail_writes: std::sync::atomic::AtomicBool,
}

impl MockContracts {
    pub fn with_contract(record: ContractRecord) -> Self {
        Self {
            contract: Mutex::new(Some(record)),
            ..Default::default()
        }
    }

    pub fn recorded(&self) -> Vec<Vec<Threat>> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContractStore for MockContracts {
    async fn find_contract(&self, id: ContractId) -> StorageResult<Option<ContractRecord>> {
        Ok(self
            .contract
            .lock()
            .unwrap()
            .clone()
            .filter(|record| record.id == id))
    }

    async fn list_contract_ids(&self) -> StorageResult<Vec<ContractId>> {
        Ok(self
            .contract
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.id)
            .collect())
    }

    async fn record_findings(
        &self,
        id: ContractId,
        threats: &[Threat],
    ) -> StorageResult<Option<StatusTransition>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Database("database is locked".into()));
        }
        let mut guard = self.contract.lock().unwrap();
        let Some(record) = guard.as_mut().filter(|record| record.id == id) else {
            return Ok(None);
        };
        let transition = StatusTransition {
            previous_status: std::mem::replace(&mut record.status, "Warning".into()),
            previous_threat_level: std::mem::replace(&mut record.threat_level, "Medium".into()),
            alerts_created: threats.len(),
            recorded_at: chrono::Utc::now(),
        };
        self.recorded.lock().unwrap().push(threats.to_vec());
        Ok(Some(transition))
    }
}

#[derive(Default)]
pub struct MockSubscribers {
    pub emails: Vec<String>,
    pub fail: bool,
}

impl MockSubscribers {
    pub fn new(emails: &[&str]) -> Self {
        Self {
            emails: emails.iter().map(|email| email.to_string()).collect(),
            fail: false,
        }
    }
}

#[async_trait]
impl AlertEmailStore for MockSubscribers {
    async fn subscribers(&self, id: ContractId) -> StorageResult<Vec<AlertEmail>> {
        if self.fail {
            return Err(StorageError::Database("connection reset".into()));
        }
        Ok(self
            .emails
            .iter()
            .map(|email| AlertEmail {
                contract_id: id,
                email: email.clone(),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub delivered: Mutex<Vec<OutboundMessage>>,
    pub rejecting: HashSet<String>,
    pub cancel_on_delivery: Mutex<Option<CancellationToken>>,
}

impl MockTransport {
    pub fn rejecting(emails: &[&str]) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            rejecting: emails.iter().map(|email| email.to_string()).collect(),
            cancel_on_delivery: Mutex::new(None),
        }
    }

    /// Cancels `token` from inside the first delivery.
    pub fn cancel_on_delivery(&self, token: CancellationToken) {
        *self.cancel_on_delivery.lock().unwrap() = Some(token);
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertTransport for MockTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotificationError> {
        if self.rejecting.contains(&message.to) {
            return Err(NotificationError::Rejected { status: 550 });
        }
        self.delivered.lock().unwrap().push(message.clone());
        let cancel = self.cancel_on_delivery.lock().unwrap().take();
        if let Some(token) = cancel {
            token.cancel();
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// Wiring for monitor tests; keeps handles to every mock.
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub contracts: Arc<MockContracts>,
    pub transport: Arc<MockTransport>,
    pub tracker: Arc<BlockRangeTracker>,
    pub deps: MonitorDeps,
}

impl Harness {
    pub fn new(record: Option<ContractRecord>) -> Self {
        Self::with_subscribers(record, MockSubscribers::new(&["ops@example.com"]))
    }

    pub fn with_subscribers(record: Option<ContractRecord>, subscribers: MockSubscribers) -> Self {
        let chain = Arc::new(MockChain::default());
        let contracts = Arc::new(match record {
            Some(record) => MockContracts::with_contract(record),
            None => MockContracts::default(),
        });
        let transport = Arc::new(MockTransport::default());
        let tracker = Arc::new(BlockRangeTracker::in_memory());
        let deps = MonitorDeps {
            contracts: contracts.clone(),
            resolver: Arc::new(MockResolver {
                chain: chain.clone(),
            }),
            tracker: tracker.clone(),
            dispatcher: Arc::new(NotificationDispatcher::new(
                Arc::new(subscribers),
                transport.clone(),
            )),
            scan_permits: Arc::new(Semaphore::new(4)),
        };
        Self {
            chain,
            contracts,
            transport,
            tracker,
            deps,
        }
    }
}
