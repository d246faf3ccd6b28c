//! Gamesync Catalog Server
//!
//! Serves a published catalog snapshot to `gamesync` clients. The snapshot
//! is re-read on every request, so `gamesync-admin publish` takes effect
//! without a restart.
//!
//! # Configuration
//!
//! Environment variables:
//! - `GAMESYNC_SERVER_PORT`: Port to listen on (default: 8080)
//! - `GAMESYNC_CATALOG_PATH`: Snapshot to serve (default: ~/.local/share/gamesync-server/catalog.json)
//! - `GAMESYNC_SERVER_API_KEY`: Bearer key required on catalog routes (default: none, open access)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /categories`: Full catalog tree
//! - `GET /categories/meta`: Category checksums
//! - `GET /categories/{id}`: One category subtree
//! - `GET /categories/{id}/groups/meta`: Group checksums of one category

use std::net::SocketAddr;
use std::path::PathBuf;

use gamesync::server::{router, ServerState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Snapshot file to serve
    catalog_path: PathBuf,
    /// Required bearer key, if any
    api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("GAMESYNC_SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let catalog_path = std::env::var("GAMESYNC_CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("gamesync-server")
                    .join("catalog.json")
            });

        let api_key = std::env::var("GAMESYNC_SERVER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        Self {
            port,
            catalog_path,
            api_key,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamesync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Catalog file: {}", config.catalog_path.display());
    if !config.catalog_path.exists() {
        tracing::warn!("Catalog file does not exist yet; publish one with gamesync-admin");
    }
    if config.api_key.is_none() {
        tracing::warn!("No API key set - catalog routes are open");
    }

    let app = router(ServerState::from_snapshot(
        config.catalog_path,
        config.api_key,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
