//! Liquidation heatmap service - Entry Point

use anyhow::Result;
use clap::Parser;
use liqmap_app::{AppConfig, Application, ConfigSource};
use tracing::{info, warn};

/// Real-time liquidation heatmap
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LIQMAP_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Run without the dashboard server
    #[arg(long)]
    no_dashboard: bool,

    /// Override the dashboard port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is made
    liqmap_ws::init_crypto();

    let args = Args::parse();

    let (mut config, source) = AppConfig::load(args.config.as_deref())?;
    if args.no_dashboard {
        config.dashboard.enabled = false;
    }
    if let Some(port) = args.port {
        config.dashboard.port = port;
    }

    liqmap_telemetry::init_logging(&config.telemetry.log_filter())?;

    info!("Starting liqmap v{}", env!("CARGO_PKG_VERSION"));
    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults => warn!("Config file not found, using defaults"),
    }

    let app = Application::new(config)?;
    app.run().await?;

    info!("Shutdown complete");
    Ok(())
}
