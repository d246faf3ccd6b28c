//! Keeps the local catalog cache consistent with the remote catalog.
//!
//! # Overview
//!
//! - [`checksum`]: content fingerprints used to detect remote changes cheaply
//! - [`bookkeeping`]: last sync time and per-category checksums
//! - [`orchestrator`]: chooses a full, incremental or no-op sync and runs it
//! - [`merge`]: applies one remote category subtree to the local store
//! - [`trigger`]: runs syncs for lifecycle events and user refreshes
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gamesync::db::{init_db, SqliteCatalogStore};
//! use gamesync::remote::FileGateway;
//! use gamesync::sync::{FileBookkeeping, SyncOptions, SyncOrchestrator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = init_db("cache.db".into()).await?;
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(FileGateway::new("catalog.json".into())),
//!     Arc::new(SqliteCatalogStore::new(pool)),
//!     Arc::new(FileBookkeeping::new("sync_state.json".into())),
//!     SyncOptions::default(),
//! );
//! let report = orchestrator.sync_if_needed().await?;
//! println!("{} sync, {} categories merged", report.strategy, report.categories_merged);
//! # Ok(())
//! # }
//! ```

pub mod bookkeeping;
pub mod checksum;
pub mod merge;
pub mod orchestrator;
pub mod trigger;

pub use bookkeeping::{
    BookkeepingError, BookkeepingStore, FileBookkeeping, MemoryBookkeeping, SyncBookkeeping,
};
pub use checksum::{category_checksum, group_checksum};
pub use merge::{merge_category, MergeStats};
pub use orchestrator::{
    NodeFailure, SyncError, SyncOptions, SyncOrchestrator, SyncPhase, SyncReport, SyncStrategy,
};
pub use trigger::{LifecycleEvent, LifecycleKind, SyncTrigger};
