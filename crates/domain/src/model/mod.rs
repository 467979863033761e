//! Data structures shared by the storage adapters and the monitor.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use strum_macros::{AsRefStr, Display, EnumString};

/// Scan interval applied when a contract carries an unrecognized frequency.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractId(i32);

impl ContractId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl From<i32> for ContractId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Networks the monitor knows how to reach. Contracts store the network as
/// free text so new entries can be registered before support lands here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Network {
    Ethereum,
    Base,
    BaseSepolia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
pub enum MonitoringFrequency {
    #[strum(serialize = "1min")]
    OneMinute,
    #[strum(serialize = "5min")]
    FiveMinutes,
    #[strum(serialize = "15min")]
    FifteenMinutes,
    #[strum(serialize = "30min")]
    ThirtyMinutes,
    #[strum(serialize = "1hour")]
    OneHour,
}

impl MonitoringFrequency {
    pub const fn interval(self) -> Duration {
        match self {
            Self::OneMinute => Duration::from_secs(60),
            Self::FiveMinutes => Duration::from_secs(300),
            Self::FifteenMinutes => Duration::from_secs(900),
            Self::ThirtyMinutes => Duration::from_secs(1800),
            Self::OneHour => Duration::from_secs(3600),
        }
    }
}

/// Maps a stored frequency label to the pause between scans.
pub fn sleep_interval(frequency: &str) -> Duration {
    frequency
        .parse::<MonitoringFrequency>()
        .map(MonitoringFrequency::interval)
        .unwrap_or(DEFAULT_SCAN_INTERVAL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
pub enum ContractStatus {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRecord {
    pub id: ContractId,
    pub address: String,
    pub network: String,
    pub monitoring_frequency: String,
    pub status: String,
    pub threat_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ThreatKind {
    HighValueTransfer,
    FailedTransaction,
    HighGasUsage,
}

/// A heuristic finding for one transaction. Not persisted directly; the
/// monitor turns each one into an alert row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Threat {
    pub kind: ThreatKind,
    pub description: String,
}

impl Threat {
    pub fn new(kind: ThreatKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail {
    pub contract_id: ContractId,
    pub email: String,
}

/// Result of atomically recording a batch of findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub previous_status: String,
    pub previous_threat_level: String,
    pub alerts_created: usize,
    pub recorded_at: DateTime<Utc>,
}
