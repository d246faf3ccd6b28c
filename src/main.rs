use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{try_auto_sync, CheckCommand, ConfigCommand, ListCommand, SyncCommand};
use gamesync::config::Config;
use gamesync::db::{init_db, CatalogStore, SqliteCatalogStore};

#[derive(Parser)]
#[command(name = "gamesync")]
#[command(version)]
#[command(about = "Offline cache of the game catalog", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached games
    List(ListCommand),

    /// Check an answer against a cached game
    Check(CheckCommand),

    /// Sync the local catalog with the remote
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

impl Commands {
    /// Commands that read the cache and benefit from a fresh sync first
    fn reads_catalog(&self) -> bool {
        matches!(self, Commands::List(_) | Commands::Check(_))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamesync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    if let Commands::Config(cmd) = &command {
        return cmd.run(&config);
    }

    let pool = init_db(config.database_path.value.clone()).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(pool));

    // Auto-sync BEFORE read commands
    if command.reads_catalog() {
        try_auto_sync(&config, store.clone()).await;
    }

    match command {
        Commands::List(cmd) => cmd.run(store.as_ref()).await?,
        Commands::Check(cmd) => cmd.run(store.as_ref()).await?,
        Commands::Sync(cmd) => cmd.run(store, &config).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}
