//! Monitor binary: watches every registered contract until ctrl-c.

use std::io;

use contract_watch_domain::config::MonitorConfig;
use contract_watch_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use contract_watch_monitor::{run_monitor, MonitorError};
use contract_watch_storage::SeaOrmStorage;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    init_telemetry(&telemetry_config)?;
    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    run_monitor(config, storage).await
}
