//! Gamesync Admin CLI
//!
//! Publishes authored game content into the catalog snapshot served by
//! `gamesync-server`.
//!
//! # Usage
//!
//! ```bash
//! gamesync-admin publish --source games.yaml
//! gamesync-admin publish --source games.yaml --catalog /srv/gamesync/catalog.json
//! gamesync-admin inspect
//! ```
//!
//! # Environment Variables
//!
//! - `GAMESYNC_CATALOG_PATH`: Snapshot to write (default: ~/.local/share/gamesync-server/catalog.json)

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gamesync::models::Catalog;
use gamesync::publish::publish_files;

#[derive(Parser)]
#[command(name = "gamesync-admin")]
#[command(version)]
#[command(about = "Gamesync catalog administration tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish games from an authoring file into the catalog snapshot
    Publish {
        /// YAML file with `structure` and `games`
        #[arg(long, short)]
        source: PathBuf,
        /// Catalog snapshot to update
        #[arg(long, short)]
        catalog: Option<PathBuf>,
    },
    /// Show what the catalog snapshot serves
    Inspect {
        /// Catalog snapshot to read
        #[arg(long, short)]
        catalog: Option<PathBuf>,
    },
}

/// Default snapshot path, shared with the server
fn catalog_path(arg: Option<PathBuf>) -> PathBuf {
    arg.or_else(|| std::env::var("GAMESYNC_CATALOG_PATH").map(PathBuf::from).ok())
        .unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gamesync-server")
                .join("catalog.json")
        })
}

fn publish(source: PathBuf, catalog: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match publish_files(&source, &catalog)? {
        None => println!("Nothing to publish."),
        Some(summary) => {
            println!("Published to {}", catalog.display());
            println!("  game types created: {}", summary.categories_created);
            println!("  levels created:     {}", summary.groups_created);
            println!("  games created:      {}", summary.games_created);
            println!("  games updated:      {}", summary.games_updated);
            println!("  games unchanged:    {}", summary.games_unchanged);
            if !summary.skipped.is_empty() {
                println!();
                println!("Skipped:");
                for row in &summary.skipped {
                    println!("  - {}", row);
                }
            }
        }
    }
    Ok(())
}

fn inspect(catalog: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = Catalog::load(&catalog)?;
    if snapshot.categories.is_empty() {
        println!("Catalog {} is empty", catalog.display());
        return Ok(());
    }

    if let Some(at) = snapshot.published_at {
        println!("Published: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!();
    }
    println!("{:<36}  {:<8}  CHECKSUM", "ID", "LEVELS");
    println!("{}", "-".repeat(112));
    for meta in snapshot.category_metadata() {
        println!("{:<36}  {:<8}  {}", meta.id, meta.child_count, meta.checksum);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamesync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Publish { source, catalog } => publish(source, catalog_path(catalog)),
        Commands::Inspect { catalog } => inspect(catalog_path(catalog)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
