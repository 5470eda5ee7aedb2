#![cfg(not(tarpaulin_include))]

use gene_annotator::app;
use gene_annotator::config::Config;
use tracing_subscriber::{EnvFilter, fmt};

/// Main entry point for the web application
///
/// Reads the configuration from the environment and serves the dashboard
/// until Ctrl+C or SIGTERM.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load()?;
    app::run(config).await?;

    Ok(())
}
