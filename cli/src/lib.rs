//! Command-line entry point for logbridge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use logbridge_directory_watcher::DirectoryWatcher;
use logbridge_ingest::{
    ConfigStore, IngestCoordinator, IngestService, JsonLinesSink, XmlRecordSource, init_logging,
};
use tracing::info;

/// Configuration file looked up next to the executable.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Watch 1C:Enterprise event-log directories and ship new exports as JSON
/// lines.
#[derive(Debug, Parser)]
#[command(name = "logbridge", version, about)]
pub struct Cli {
    /// Path to the configuration file [default: config.json next to the
    /// executable]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Absolute path of the configuration file to use.
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        std::path::absolute(&path)
            .with_context(|| format!("Failed to resolve config path {}", path.display()))
    }
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the executable")?;
    let dir = exe
        .parent()
        .context("Executable path has no parent directory")?;
    Ok(dir.join(DEFAULT_CONFIG_FILE))
}

/// Load the configuration, set up logging and run until the watcher stops
/// or Ctrl-C is pressed.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path()?;
    let store = ConfigStore::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let config = store.snapshot().await;

    let logging = init_logging(&config.log_level, &config.app_log_dir)
        .context("Failed to initialize logging")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting logbridge"
    );
    info!("Configuration loaded: {config:?}");

    let (watcher, streams) =
        DirectoryWatcher::new().context("Failed to create directory watcher")?;
    let coordinator =
        IngestCoordinator::new(Arc::new(XmlRecordSource), Arc::new(JsonLinesSink::new()));
    let service =
        IngestService::new(store, coordinator, watcher, streams).with_logging(Arc::new(logging));

    tokio::select! {
        result = service.run() => result.context("Ingestion service failed")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
