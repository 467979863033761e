use std::str::FromStr;

use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("contract address is empty")]
    Empty,
    #[error("invalid contract address `{input}`: {reason}")]
    Invalid { input: String, reason: String },
}

/// Parses a 20-byte hex address (with or without `0x`, any letter case).
///
/// Checksums are not enforced on input: registered addresses are frequently
/// stored lowercase, and the canonical form is produced on output instead.
pub fn normalize_address(raw: &str) -> Result<Address, AddressError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    Address::from_str(trimmed).map_err(|err| AddressError::Invalid {
        input: trimmed.to_string(),
        reason: err.to_string(),
    })
}

/// Renders the EIP-55 checksummed representation.
pub fn checksummed(address: &Address) -> String {
    address.to_checksum(None)
}
