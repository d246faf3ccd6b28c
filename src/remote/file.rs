use std::path::PathBuf;

use async_trait::async_trait;

use super::{RemoteError, RemoteGateway};
use crate::models::{Catalog, Category, NodeMetadata};

/// Serves a catalog snapshot written by `gamesync-admin publish`.
///
/// The file is re-read on every call, so a publish between two syncs is
/// picked up without restarting anything.
#[derive(Debug, Clone)]
pub struct FileGateway {
    path: PathBuf,
}

impl FileGateway {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<Catalog, RemoteError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RemoteError::Network(format!(
                "failed to read catalog '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            RemoteError::Decoding(format!(
                "invalid catalog '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl RemoteGateway for FileGateway {
    async fn fetch_all_categories(&self) -> Result<Vec<Category>, RemoteError> {
        Ok(self.load().await?.categories)
    }

    async fn fetch_category_metadata(&self) -> Result<Vec<NodeMetadata>, RemoteError> {
        Ok(self.load().await?.category_metadata())
    }

    async fn fetch_group_metadata(
        &self,
        category_id: &str,
    ) -> Result<Vec<NodeMetadata>, RemoteError> {
        Ok(self.load().await?.group_metadata(category_id))
    }

    async fn fetch_category(&self, id: &str) -> Result<Option<Category>, RemoteError> {
        Ok(self.load().await?.category(id).cloned())
    }
}
