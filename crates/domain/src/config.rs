//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;

use crate::model::Network;

pub const DEFAULT_ETH_RPC_URL: &str = "https://eth-mainnet.g.alchemy.com/v2/api-key";
pub const DEFAULT_BASE_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_BASE_SEPOLIA_RPC_URL: &str = "https://sepolia.base.org";

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENT_SCANS: usize = 16;
const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAIL_FROM: &str = "alerts@contract-watch.local";

/// One RPC endpoint per supported network. `None` means the operator
/// explicitly blanked the variable, which disables that network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoints {
    ethereum: Option<String>,
    base: Option<String>,
    base_sepolia: Option<String>,
}

impl RpcEndpoints {
    pub fn from_env() -> Self {
        Self {
            ethereum: get_defaulted_var("ETH_RPC_URL", DEFAULT_ETH_RPC_URL),
            base: get_defaulted_var("BASE_RPC_URL", DEFAULT_BASE_RPC_URL),
            base_sepolia: get_defaulted_var("BASE_SEPOLIA_RPC_URL", DEFAULT_BASE_SEPOLIA_RPC_URL),
        }
    }

    pub fn new(
        ethereum: Option<String>,
        base: Option<String>,
        base_sepolia: Option<String>,
    ) -> Self {
        Self {
            ethereum,
            base,
            base_sepolia,
        }
    }

    pub fn endpoint(&self, network: Network) -> Result<&str, ConfigError> {
        let configured = match network {
            Network::Ethereum => self.ethereum.as_deref(),
            Network::Base => self.base.as_deref(),
            Network::BaseSepolia => self.base_sepolia.as_deref(),
        };
        configured.ok_or(ConfigError::MissingRpcUrl { network })
    }
}

impl Default for RpcEndpoints {
    fn default() -> Self {
        Self::new(
            Some(DEFAULT_ETH_RPC_URL.to_string()),
            Some(DEFAULT_BASE_RPC_URL.to_string()),
            Some(DEFAULT_BASE_SEPOLIA_RPC_URL.to_string()),
        )
    }
}

/// Outbound alert mail relay. Without a URL, alerts are only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRelayConfig {
    url: Option<String>,
    token: Option<String>,
    sender: String,
}

impl MailRelayConfig {
    pub fn from_env() -> Self {
        Self {
            url: get_optional_var("ALERT_MAIL_RELAY_URL"),
            token: get_optional_var("ALERT_MAIL_RELAY_TOKEN"),
            sender: get_optional_var("ALERT_MAIL_FROM")
                .unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
        }
    }

    pub fn new(url: Option<String>, token: Option<String>, sender: impl Into<String>) -> Self {
        Self {
            url,
            token,
            sender: sender.into(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }
}

impl Default for MailRelayConfig {
    fn default() -> Self {
        Self::new(None, None, DEFAULT_MAIL_FROM)
    }
}

/// Key configuration derived from `.env`/process variables for the monitor
/// binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    database_url: String,
    rpc_endpoints: RpcEndpoints,
    rpc_timeout: Duration,
    max_concurrent_scans: usize,
    discovery_interval: Duration,
    persist_cursors: bool,
    mail_relay: MailRelayConfig,
}

impl MonitorConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so the binary can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_required_var("DATABASE_URL")?;
        let rpc_timeout = Duration::from_secs(get_positive_number(
            "MONITOR_RPC_TIMEOUT_SECS",
            DEFAULT_RPC_TIMEOUT_SECS,
        )?);
        let max_concurrent_scans = get_positive_number(
            "MONITOR_MAX_CONCURRENT_SCANS",
            DEFAULT_MAX_CONCURRENT_SCANS as u64,
        )? as usize;
        let discovery_interval = Duration::from_secs(get_positive_number(
            "MONITOR_DISCOVERY_INTERVAL_SECS",
            DEFAULT_DISCOVERY_INTERVAL_SECS,
        )?);
        let persist_cursors = get_flag("MONITOR_PERSIST_CURSORS")?;

        Ok(Self {
            database_url,
            rpc_endpoints: RpcEndpoints::from_env(),
            rpc_timeout,
            max_concurrent_scans,
            discovery_interval,
            persist_cursors,
            mail_relay: MailRelayConfig::from_env(),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn rpc_endpoints(&self) -> &RpcEndpoints {
        &self.rpc_endpoints
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn max_concurrent_scans(&self) -> usize {
        self.max_concurrent_scans
    }

    pub fn discovery_interval(&self) -> Duration {
        self.discovery_interval
    }

    pub fn persist_cursors(&self) -> bool {
        self.persist_cursors
    }

    pub fn mail_relay(&self) -> &MailRelayConfig {
        &self.mail_relay
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Unset falls back to `default`; set-but-blank yields `None`.
fn get_defaulted_var(key: &'static str, default: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(_) => Some(default.to_string()),
    }
}

fn get_positive_number(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(default);
    };
    let value: u64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    if value == 0 {
        return Err(ConfigError::OutOfRange { key });
    }
    Ok(value)
}

fn get_flag(key: &'static str) -> Result<bool, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key, value: raw }),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("CONTRACT_WATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration, environment parsing or network
/// resolution fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    OutOfRange { key: &'static str },
    #[error("invalid boolean `{value}` in `{key}`")]
    InvalidFlag { key: &'static str, value: String },
    #[error("unsupported network: {network}")]
    UnsupportedNetwork { network: String },
    #[error("no RPC URL configured for network: {network}")]
    MissingRpcUrl { network: Network },
    #[error("invalid RPC URL for network {network}: {reason}")]
    InvalidRpcUrl { network: Network, reason: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    const OPTIONAL_KEYS: &[&str] = &[
        "ETH_RPC_URL",
        "BASE_RPC_URL",
        "BASE_SEPOLIA_RPC_URL",
        "MONITOR_RPC_TIMEOUT_SECS",
        "MONITOR_MAX_CONCURRENT_SCANS",
        "MONITOR_DISCOVERY_INTERVAL_SECS",
        "MONITOR_PERSIST_CURSORS",
        "ALERT_MAIL_RELAY_URL",
        "ALERT_MAIL_RELAY_TOKEN",
        "ALERT_MAIL_FROM",
    ];

    fn set_env() {
        std::env::set_var("CONTRACT_WATCH_SKIP_DOTENV", "1");
        std::env::set_var("DATABASE_URL", "sqlite://test.db");
        for key in OPTIONAL_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn config_loader_applies_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), "sqlite://test.db");
        assert_eq!(config.rpc_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_concurrent_scans(), 16);
        assert_eq!(config.discovery_interval(), Duration::from_secs(30));
        assert!(!config.persist_cursors());
        assert_eq!(config.mail_relay().url(), None);
        assert_eq!(config.mail_relay().sender(), DEFAULT_MAIL_FROM);
        assert_eq!(
            config.rpc_endpoints().endpoint(Network::Base).unwrap(),
            DEFAULT_BASE_RPC_URL
        );
    }

    #[test]
    fn config_loader_reads_overrides() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("ETH_RPC_URL", " http://localhost:8545 ");
        std::env::set_var("MONITOR_RPC_TIMEOUT_SECS", "5");
        std::env::set_var("MONITOR_PERSIST_CURSORS", "true");
        std::env::set_var("ALERT_MAIL_RELAY_URL", "http://relay.local/send");

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(
            config.rpc_endpoints().endpoint(Network::Ethereum).unwrap(),
            "http://localhost:8545"
        );
        assert_eq!(config.rpc_timeout(), Duration::from_secs(5));
        assert!(config.persist_cursors());
        assert_eq!(config.mail_relay().url(), Some("http://relay.local/send"));

        set_env();
    }

    #[test]
    fn blank_rpc_url_disables_network() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("BASE_SEPOLIA_RPC_URL", "   ");

        let endpoints = RpcEndpoints::from_env();
        let err = endpoints.endpoint(Network::BaseSepolia).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRpcUrl {
                network: Network::BaseSepolia
            }
        ));

        set_env();
    }

    #[test]
    fn empty_required_env_var_is_treated_as_missing() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("DATABASE_URL", "   ");

        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar {
                key: "DATABASE_URL"
            }
        ));

        set_env();
    }

    #[test]
    fn rejects_zero_and_malformed_numbers() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("MONITOR_MAX_CONCURRENT_SCANS", "0");
        assert!(matches!(
            MonitorConfig::load_from_env().unwrap_err(),
            ConfigError::OutOfRange {
                key: "MONITOR_MAX_CONCURRENT_SCANS"
            }
        ));

        std::env::set_var("MONITOR_MAX_CONCURRENT_SCANS", "many");
        assert!(matches!(
            MonitorConfig::load_from_env().unwrap_err(),
            ConfigError::InvalidNumber { .. }
        ));

        std::env::remove_var("MONITOR_MAX_CONCURRENT_SCANS");
        std::env::set_var("MONITOR_PERSIST_CURSORS", "maybe");
        assert!(matches!(
            MonitorConfig::load_from_env().unwrap_err(),
            ConfigError::InvalidFlag { .. }
        ));

        set_env();
    }
}
