//! Up/down hedge bot entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Cheap-side entry and hedge bot for short-dated up/down markets
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via HEDGE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    hedge_telemetry::init_logging()?;

    info!("Starting hedge-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > HEDGE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("HEDGE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = hedge_bot::AppConfig::from_file(&config_path)?;
    info!(
        mode = ?config.trading.mode,
        symbols = ?config.hedge.symbols,
        "Configuration loaded"
    );

    let app = hedge_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
