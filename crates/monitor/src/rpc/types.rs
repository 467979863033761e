use alloy::primitives::{B256, U256};

/// The slice of an emitted log the monitor cares about: which transaction
/// produced it, and in which block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub transaction_hash: Option<B256>,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionDetails {
    pub hash: B256,
    /// Native value in wei.
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    /// `1` for success, `0` for failure.
    pub status: Option<u64>,
    pub gas_used: u64,
}
