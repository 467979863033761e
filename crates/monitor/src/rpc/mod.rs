use std::{future::IntoFuture, sync::Arc, time::Duration};

use alloy::consensus::Transaction as _;
use alloy::network::{Ethereum, ReceiptResponse};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::{TransportError, TransportResult};
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;
use url::Url;

use contract_watch_domain::config::{ConfigError, RpcEndpoints};
use contract_watch_domain::model::Network;

use crate::cursor::BlockWindow;

mod types;

pub use types::{LogEntry, ReceiptSummary, TransactionDetails};

/// Throttling answers. Checked first: they mention "exceeded" and "limit"
/// too, but retrying the same window later is the only correct reaction.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "too many requests",
    "compute units",
    "request count",
    "capacity",
];

/// The endpoint would serve the blocks, just not this many at once.
const RANGE_TOO_WIDE_MARKERS: &[&str] = &[
    "exceeds max block range",
    "block range is too wide",
    "block range too large",
    "range too large",
    "query returned more than",
    "log response size exceeded",
];

/// The blocks themselves cannot be served (pruned or not yet known).
const RANGE_UNAVAILABLE_MARKERS: &[&str] = &[
    "header not found",
    "unknown block",
    "block not found",
    "blocks not available",
    "pruned",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeFault {
    TooWide,
    Unavailable,
}

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("block range too wide: {0}")]
    RangeTooWide(String),
    #[error("block range unavailable: {0}")]
    RangeUnavailable(String),
    #[error("rpc call `{operation}` timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("rpc error: {0}")]
    Rpc(String),
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_height(&self) -> Result<u64, ChainError>;
    /// Deployed bytecode; empty when nothing is deployed at `address`.
    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError>;
    async fn balance_of(&self, address: Address) -> Result<U256, ChainError>;
    /// Logs emitted by `address` inside the inclusive window. Results of the
    /// underlying queries are concatenated as-is, so a transaction may appear
    /// more than once.
    async fn logs_in_range(
        &self,
        address: Address,
        window: BlockWindow,
    ) -> Result<Vec<LogEntry>, ChainError>;
    async fn transaction_details(&self, hash: B256)
        -> Result<Option<TransactionDetails>, ChainError>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptSummary>, ChainError>;
}

pub trait ChainClientResolver: Send + Sync {
    fn resolve(&self, network: &str) -> Result<Arc<dyn ChainClient>, ConfigError>;
}

/// HTTP JSON-RPC client for a single network.
pub struct AlloyChainClient {
    provider: RootProvider<Ethereum>,
    timeout: Duration,
}

impl AlloyChainClient {
    pub fn new(provider: RootProvider<Ethereum>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn connect_http(url: Url, timeout: Duration) -> Self {
        Self::new(RootProvider::new_http(url), timeout)
    }

    async fn call<T, F>(&self, operation: &'static str, request: F) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(classify_rpc_error),
            Err(_) => Err(ChainError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.call("eth_blockNumber", self.provider.get_block_number())
            .await
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        self.call("eth_getCode", self.provider.get_code_at(address))
            .await
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ChainError> {
        self.call("eth_getBalance", self.provider.get_balance(address))
            .await
    }

    async fn logs_in_range(
        &self,
        address: Address,
        window: BlockWindow,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let emitted = Filter::new()
            .address(address)
            .from_block(window.from)
            .to_block(window.to);
        // Same range with a wildcard topic0 selection.
        let any_event = emitted.clone();

        let mut logs = self
            .call("eth_getLogs", self.provider.get_logs(&emitted))
            .await?;
        logs.extend(
            self.call("eth_getLogs", self.provider.get_logs(&any_event))
                .await?,
        );

        Ok(logs.iter().map(convert_log).collect())
    }

    async fn transaction_details(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionDetails>, ChainError> {
        let maybe = self
            .call(
                "eth_getTransactionByHash",
                self.provider.get_transaction_by_hash(hash),
            )
            .await?;
        Ok(maybe.map(|tx| TransactionDetails {
            hash,
            value: tx.value(),
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptSummary>, ChainError> {
        let maybe = self
            .call(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(hash),
            )
            .await?;
        Ok(maybe.map(|receipt| ReceiptSummary {
            status: Some(u64::from(receipt.status())),
            gas_used: receipt.gas_used(),
        }))
    }
}

fn convert_log(log: &Log) -> LogEntry {
    LogEntry {
        transaction_hash: log.transaction_hash,
        block_number: log.block_number,
    }
}

fn classify_rpc_error(err: TransportError) -> ChainError {
    if let Some(payload) = err.as_error_resp() {
        let message = payload.message.to_string();
        match range_fault(&message) {
            Some(RangeFault::TooWide) => return ChainError::RangeTooWide(message),
            Some(RangeFault::Unavailable) => return ChainError::RangeUnavailable(message),
            None => {}
        }
    }
    ChainError::Rpc(err.to_string())
}

fn range_fault(message: &str) -> Option<RangeFault> {
    let lowered = message.to_ascii_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));
    if mentions(RATE_LIMIT_MARKERS) {
        None
    } else if mentions(RANGE_TOO_WIDE_MARKERS) {
        Some(RangeFault::TooWide)
    } else if mentions(RANGE_UNAVAILABLE_MARKERS) {
        Some(RangeFault::Unavailable)
    } else {
        None
    }
}

/// Resolves network names to cached per-network clients.
pub struct RpcClientResolver {
    endpoints: RpcEndpoints,
    timeout: Duration,
    clients: DashMap<Network, Arc<AlloyChainClient>>,
}

impl RpcClientResolver {
    pub fn new(endpoints: RpcEndpoints, timeout: Duration) -> Self {
        Self {
            endpoints,
            timeout,
            clients: DashMap::new(),
        }
    }
}

impl ChainClientResolver for RpcClientResolver {
    fn resolve(&self, network: &str) -> Result<Arc<dyn ChainClient>, ConfigError> {
        let network: Network = network
            .parse()
            .map_err(|_| ConfigError::UnsupportedNetwork {
                network: network.to_string(),
            })?;

        if let Some(client) = self.clients.get(&network) {
            return Ok(client.value().clone());
        }

        let endpoint = self.endpoints.endpoint(network)?;
        let url = Url::parse(endpoint).map_err(|err| ConfigError::InvalidRpcUrl {
            network,
            reason: err.to_string(),
        })?;
        info!(
            %network,
            host = url.host_str().unwrap_or_default(),
            "connecting to network"
        );

        let client = Arc::new(AlloyChainClient::connect_http(url, self.timeout));
        self.clients.insert(network, client.clone());
        Ok(client)
    }
}
