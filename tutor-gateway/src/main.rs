//! Tutor Gateway - Main entry point.

use anyhow::Result;
use tutor_common::config::{Config, ConfigSource};
use tutor_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (file + environment)
    let source = ConfigSource::locate();
    let config = Config::load_source_with_env(&source)?;

    // Initialize logging
    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Tutor Gateway v{}", env!("CARGO_PKG_VERSION"));
    source.log();

    // Refuse to start without a usable credential or with invalid settings
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(tutor_common::Error::from(e).into());
    }

    tutor_gateway::start_server(&config).await
}
