//! Sync CLI commands for refreshing the local catalog cache.

use std::sync::Arc;

use clap::{Args, Subcommand};

use gamesync::config::{Config, ConfigError};
use gamesync::db::{CatalogStore, StoreError};
use gamesync::sync::{
    FileBookkeeping, LifecycleEvent, SyncError, SyncOrchestrator, SyncReport, SyncTrigger,
};

/// Sync the local catalog with the remote
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Replace the local catalog with a full copy of the remote
    #[arg(long)]
    force: bool,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and local cache status
    Status,
}

/// Builds the orchestrator for the configured remote, local store and state file.
pub fn orchestrator(
    config: &Config,
    store: Arc<dyn CatalogStore>,
) -> Result<SyncOrchestrator, ConfigError> {
    Ok(SyncOrchestrator::new(
        config.remote_gateway()?,
        store,
        Arc::new(FileBookkeeping::new(config.state_path.value.clone())),
        config.sync_options(),
    ))
}

/// Runs a startup sync if `auto_sync` is enabled.
///
/// Failures are reported and otherwise ignored: the cache keeps working
/// offline with whatever it already holds.
pub async fn try_auto_sync(config: &Config, store: Arc<dyn CatalogStore>) {
    if !config.sync.auto_sync || !config.remote.is_configured() {
        return;
    }

    let orchestrator = match orchestrator(config, store) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Auto-sync: {}", e);
            return;
        }
    };

    let trigger = SyncTrigger::new(Arc::new(orchestrator));
    match trigger.on_lifecycle_event(LifecycleEvent::startup(1)).await {
        Some(Ok(report)) => {
            tracing::debug!(strategy = %report.strategy, "Auto-sync finished");
        }
        Some(Err(e)) => eprintln!("Auto-sync: {}", e),
        None => {}
    }
}

impl SyncCommand {
    pub async fn run(
        &self,
        store: Arc<dyn CatalogStore>,
        config: &Config,
    ) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(store, config).await,
            Some(SyncSubcommand::Status) => self.status(store, config).await,
        }
    }

    async fn sync(
        &self,
        store: Arc<dyn CatalogStore>,
        config: &Config,
    ) -> Result<(), SyncCommandError> {
        let orchestrator = Arc::new(orchestrator(config, store)?);

        println!("Syncing catalog...");
        println!();

        let report = if self.force {
            SyncTrigger::new(orchestrator).refresh().await?
        } else {
            orchestrator.sync_if_needed().await?
        };

        print_report(&report);
        Ok(())
    }

    async fn status(
        &self,
        store: Arc<dyn CatalogStore>,
        config: &Config,
    ) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.remote.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  remote:");
            println!("    url: \"http://localhost:8080\"");
            println!("    api_key: \"your-api-key\"");
            println!();
            println!("Or set environment variables:");
            println!("  GAMESYNC_REMOTE_URL");
            println!("  GAMESYNC_CATALOG_PATH");
            return Ok(());
        }

        if let Some(url) = &config.remote.url {
            println!("Remote:     {}", url);
        } else if let Some(path) = &config.remote.catalog_path {
            println!("Remote:     {} (file)", path.display());
        }
        println!(
            "Auto-sync:  {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!("State file: {}", config.state_path.value.display());
        println!();

        let categories = store.category_count().await?;
        let orchestrator = orchestrator(config, store)?;
        let state = orchestrator.bookkeeping().await;

        println!("Local categories: {}", categories);
        match state.last_sync {
            Some(at) => println!("Last sync:        {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("Last sync:        never"),
        }
        match &state.category_checksums {
            Some(map) => println!("Tracked:          {} categor(ies)", map.len()),
            None => println!("Tracked:          none (next sync is full)"),
        }

        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    println!("  strategy:           {}", report.strategy);
    println!("  categories fetched: {}", report.categories_fetched);
    println!("  categories merged:  {}", report.categories_merged);
    println!("  groups unchanged:   {}", report.groups_skipped);
    println!("  items written:      {}", report.items_written);

    if !report.failures.is_empty() {
        println!();
        println!("Not synced:");
        for failure in &report.failures {
            println!("  ✗ {}: {}", failure.node_id, failure.reason);
        }
    }

    println!();
    if report.categories_merged == 0 && report.failures.is_empty() {
        println!("Already up to date.");
    } else {
        println!("Sync complete.");
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Config(ConfigError),
    Store(StoreError),
    Sync(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Config(e) => write!(f, "{}", e),
            SyncCommandError::Store(e) => write!(f, "{}", e),
            SyncCommandError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Config(e) => Some(e),
            SyncCommandError::Store(e) => Some(e),
            SyncCommandError::Sync(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SyncCommandError {
    fn from(e: ConfigError) -> Self {
        SyncCommandError::Config(e)
    }
}

impl From<StoreError> for SyncCommandError {
    fn from(e: StoreError) -> Self {
        SyncCommandError::Store(e)
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::Sync(e)
    }
}
