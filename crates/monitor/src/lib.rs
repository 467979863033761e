//! Per-contract chain monitoring: scans each watched contract's recent
//! blocks, evaluates the transactions it finds and raises alerts.

pub mod cursor;
pub mod notify;
pub mod pipeline;
pub mod rpc;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use cursor::{BlockRangeTracker, BlockWindow, InMemoryCursorStore};
pub use notify::{
    AlertTransport, HttpMailRelay, LogTransport, NotificationDispatcher, NotificationError,
    OutboundMessage,
};
pub use pipeline::{analyze_transaction, evaluate};
pub use rpc::{AlloyChainClient, ChainClient, ChainClientResolver, ChainError, RpcClientResolver};
pub use supervisor::{build_deps, run_monitor, MonitorSupervisor, StartOutcome};
pub use worker::{ContractMonitor, MonitorDeps, MonitorError, MonitorExit, ScanOutcome};
