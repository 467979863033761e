//! Threat heuristics applied to every transaction touching a watched
//! contract.

use alloy::primitives::utils::format_units;
use alloy::primitives::{B256, U256};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, warn};

use contract_watch_domain::model::{Threat, ThreatKind};

use crate::rpc::{ChainClient, ChainError, ReceiptSummary, TransactionDetails};

/// 10 ETH in wei. Transfers strictly above this are flagged.
pub const HIGH_VALUE_THRESHOLD_WEI: u128 = 10_000_000_000_000_000_000;
/// Gas usage strictly above this is flagged.
pub const HIGH_GAS_THRESHOLD: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("transaction {0} not found")]
    MissingTransaction(B256),
    #[error("lookup for transaction {hash} failed: {source}")]
    Lookup {
        hash: B256,
        #[source]
        source: ChainError,
    },
    #[error("cannot express {value} wei in ether: {reason}")]
    UnitConversion { value: U256, reason: String },
}

/// Applies the heuristics in order: value, then status, then gas. A receipt
/// that is not available yet only disables the last two checks.
///
/// Never fails: anything unexpected is logged and treated as "no threats".
pub fn evaluate(details: &TransactionDetails, receipt: Option<&ReceiptSummary>) -> Vec<Threat> {
    match try_evaluate(details, receipt) {
        Ok(threats) => threats,
        Err(err) => {
            counter!("monitor_evaluation_errors_total").increment(1);
            error!(tx_hash = %details.hash, %err, "error analyzing transaction");
            Vec::new()
        }
    }
}

fn try_evaluate(
    details: &TransactionDetails,
    receipt: Option<&ReceiptSummary>,
) -> Result<Vec<Threat>, EvaluationError> {
    let mut threats = Vec::new();

    if details.value > U256::from(HIGH_VALUE_THRESHOLD_WEI) {
        let ether = format_ether(details.value)?;
        threats.push(Threat::new(
            ThreatKind::HighValueTransfer,
            format!("High value transfer: {ether} ETH"),
        ));
    }

    if let Some(receipt) = receipt {
        if receipt.status == Some(0) {
            threats.push(Threat::new(
                ThreatKind::FailedTransaction,
                format!("Failed transaction detected: {}", details.hash),
            ));
        }
        if receipt.gas_used > HIGH_GAS_THRESHOLD {
            threats.push(Threat::new(
                ThreatKind::HighGasUsage,
                format!("High gas usage: {} gas", receipt.gas_used),
            ));
        }
    }

    for threat in &threats {
        warn!(
            tx_hash = %details.hash,
            kind = %threat.kind,
            description = %threat.description,
            "threat detected"
        );
    }
    Ok(threats)
}

/// Wei rendered as ether without trailing zeros, e.g. `15` or `10.5`.
pub fn format_ether(value: U256) -> Result<String, EvaluationError> {
    let formatted =
        format_units(value, "ether").map_err(|err| EvaluationError::UnitConversion {
            value,
            reason: err.to_string(),
        })?;
    if !formatted.contains('.') {
        return Ok(formatted);
    }
    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string())
}

/// Fetches a transaction and its receipt, then evaluates them. Lookup
/// failures and unknown hashes contribute no threats.
pub async fn analyze_transaction<C>(client: &C, hash: B256) -> Vec<Threat>
where
    C: ChainClient + ?Sized,
{
    match fetch_transaction(client, hash).await {
        Ok((details, receipt)) => {
            debug!(
                tx_hash = %hash,
                value = %details.value,
                gas_used = receipt.map(|r| r.gas_used),
                "transaction fetched"
            );
            evaluate(&details, receipt.as_ref())
        }
        Err(err) => {
            counter!("monitor_evaluation_errors_total").increment(1);
            error!(tx_hash = %hash, %err, "error analyzing transaction");
            Vec::new()
        }
    }
}

async fn fetch_transaction<C>(
    client: &C,
    hash: B256,
) -> Result<(TransactionDetails, Option<ReceiptSummary>), EvaluationError>
where
    C: ChainClient + ?Sized,
{
    let details = client
        .transaction_details(hash)
        .await
        .map_err(|source| EvaluationError::Lookup { hash, source })?
        .ok_or(EvaluationError::MissingTransaction(hash))?;
    let receipt = client
        .transaction_receipt(hash)
        .await
        .map_err(|source| EvaluationError::Lookup { hash, source })?;
    Ok((details, receipt))
}
