use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{RemoteError, RemoteGateway};
use crate::models::{Catalog, Category, NodeMetadata};

/// Number of calls made to each gateway operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatewayCalls {
    pub all_categories: usize,
    pub category_metadata: usize,
    pub group_metadata: usize,
    pub category: usize,
}

impl GatewayCalls {
    /// Calls that transferred content rather than metadata.
    pub fn content_fetches(&self) -> usize {
        self.all_categories + self.category
    }
}

/// In-process gateway over a [`Catalog`].
///
/// Content can be swapped at any time with [`MemoryGateway::set_catalog`] or
/// edited through [`MemoryGateway::update`]; individual categories can be
/// made to fail to simulate a flaky network.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    catalog: RwLock<Catalog>,
    failing: RwLock<HashSet<String>>,
    offline: RwLock<bool>,
    all_categories: AtomicUsize,
    category_metadata: AtomicUsize,
    group_metadata: AtomicUsize,
    category: AtomicUsize,
}

impl MemoryGateway {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            ..Self::default()
        }
    }

    pub fn set_catalog(&self, catalog: Catalog) {
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = catalog;
    }

    /// Applies an edit to the served catalog.
    pub fn update<F: FnOnce(&mut Catalog)>(&self, edit: F) {
        let mut guard = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        edit(&mut guard);
    }

    /// Makes every fetch fail with a network error while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write().unwrap_or_else(|e| e.into_inner()) = offline;
    }

    /// Makes content fetches for one category fail with a network error.
    pub fn fail_category(&self, id: impl Into<String>) {
        self.failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into());
    }

    pub fn calls(&self) -> GatewayCalls {
        GatewayCalls {
            all_categories: self.all_categories.load(Ordering::SeqCst),
            category_metadata: self.category_metadata.load(Ordering::SeqCst),
            group_metadata: self.group_metadata.load(Ordering::SeqCst),
            category: self.category.load(Ordering::SeqCst),
        }
    }

    pub fn reset_calls(&self) {
        self.all_categories.store(0, Ordering::SeqCst);
        self.category_metadata.store(0, Ordering::SeqCst);
        self.group_metadata.store(0, Ordering::SeqCst);
        self.category.store(0, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Catalog {
        self.catalog
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if *self.offline.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        Ok(())
    }

    fn check_category(&self, id: &str) -> Result<(), RemoteError> {
        if self
            .failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
        {
            return Err(RemoteError::Network(format!(
                "connection reset while fetching category {}",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn fetch_all_categories(&self) -> Result<Vec<Category>, RemoteError> {
        self.all_categories.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.snapshot().categories)
    }

    async fn fetch_category_metadata(&self) -> Result<Vec<NodeMetadata>, RemoteError> {
        self.category_metadata.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.snapshot().category_metadata())
    }

    async fn fetch_group_metadata(
        &self,
        category_id: &str,
    ) -> Result<Vec<NodeMetadata>, RemoteError> {
        self.group_metadata.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.snapshot().group_metadata(category_id))
    }

    async fn fetch_category(&self, id: &str) -> Result<Option<Category>, RemoteError> {
        self.category.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.check_category(id)?;
        Ok(self.snapshot().category(id).cloned())
    }
}
