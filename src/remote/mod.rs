//! Read-only access to the remote catalog.
//!
//! The sync engine only ever sees [`RemoteGateway`]; how documents are
//! stored or transferred remotely is up to the implementation:
//!
//! - [`HttpGateway`]: JSON over HTTP, served by `gamesync-server`
//! - [`FileGateway`]: a published catalog snapshot on disk
//! - [`MemoryGateway`]: an in-process catalog that counts calls

mod file;
mod http;
mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Category, NodeMetadata};

pub use file::FileGateway;
pub use http::HttpGateway;
pub use memory::{GatewayCalls, MemoryGateway};

/// Errors surfaced by remote fetches.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Decoding error: {0}")]
    Decoding(String),
    #[error("Remote fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetches catalog content and cheap per-node metadata.
///
/// Every method is a pure read and safe to call concurrently or repeatedly.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Full tree: every category with its groups and items.
    async fn fetch_all_categories(&self) -> Result<Vec<Category>, RemoteError>;

    /// One entry per category, without content.
    async fn fetch_category_metadata(&self) -> Result<Vec<NodeMetadata>, RemoteError>;

    /// One entry per group of `category_id`.
    async fn fetch_group_metadata(
        &self,
        category_id: &str,
    ) -> Result<Vec<NodeMetadata>, RemoteError>;

    /// Full subtree of a single category, `None` if it no longer exists.
    async fn fetch_category(&self, id: &str) -> Result<Option<Category>, RemoteError>;
}
