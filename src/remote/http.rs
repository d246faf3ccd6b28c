//! HTTP gateway for the catalog server.
//!
//! Routes (relative to the base URL):
//! - `GET /categories`: full tree
//! - `GET /categories/meta`: category metadata
//! - `GET /categories/{id}`: one category subtree, 404 when unknown
//! - `GET /categories/{id}/groups/meta`: group metadata of one category

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::{RemoteError, RemoteGateway};
use crate::models::{Category, NodeMetadata};

/// Gateway talking JSON to `gamesync-server` (or anything serving the same routes).
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Builds a gateway whose requests give up after `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GETs `path` and decodes the body; `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, RemoteError> {
        let mut request = self.client.get(self.url(path));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RemoteError::Network(format!(
                "Server returned status {} for {}",
                response.status(),
                path
            )));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RemoteError::Decoding(format!("{}: {}", path, e)))
    }

    /// Like [`get_json`](Self::get_json) for routes that always exist.
    async fn get_collection<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        self.get_json(path).await?.ok_or_else(|| {
            RemoteError::Network(format!("Server returned status 404 for {}", path))
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_all_categories(&self) -> Result<Vec<Category>, RemoteError> {
        self.get_collection("/categories").await
    }

    async fn fetch_category_metadata(&self) -> Result<Vec<NodeMetadata>, RemoteError> {
        self.get_collection("/categories/meta").await
    }

    async fn fetch_group_metadata(
        &self,
        category_id: &str,
    ) -> Result<Vec<NodeMetadata>, RemoteError> {
        let path = format!(
            "/categories/{}/groups/meta",
            urlencoding::encode(category_id)
        );
        Ok(self.get_json(&path).await?.unwrap_or_default())
    }

    async fn fetch_category(&self, id: &str) -> Result<Option<Category>, RemoteError> {
        let path = format!("/categories/{}", urlencoding::encode(id));
        self.get_json(&path).await
    }
}
