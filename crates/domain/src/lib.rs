//! Domain-level building blocks shared across the storage and monitor crates.
//!
//! Holds the contract/alert model, address normalization, the environment
//! configuration contract and the storage traits the monitor is written
//! against, so the persistence backend stays swappable.

pub mod address;
pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use address::{checksummed, normalize_address, AddressError};
pub use config::{ConfigError, MailRelayConfig, MonitorConfig, RpcEndpoints};
pub use model::*;
pub use storage::*;
