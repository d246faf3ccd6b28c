//! Decides between a full, incremental or no-op sync and carries it out.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use super::bookkeeping::{BookkeepingStore, SyncBookkeeping};
use super::checksum::category_checksum;
use super::merge::{merge_category, normalize, MergeStats};
use crate::db::CatalogStore;
use crate::models::{Category, NodeMetadata};
use crate::remote::{RemoteError, RemoteGateway};

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Local store unavailable: {0}")]
    ContextUnavailable(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid remote data: {0}")]
    InvalidData(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error("A sync is already in progress")]
    AlreadyInProgress,
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Decoding(msg) => SyncError::InvalidData(msg),
            other => SyncError::NetworkError(other.to_string()),
        }
    }
}

/// Observable state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    DecidingStrategy,
    FullSyncing,
    IncrementalSyncing,
    Skipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    Full,
    Incremental,
    Skip,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStrategy::Full => write!(f, "full"),
            SyncStrategy::Incremental => write!(f, "incremental"),
            SyncStrategy::Skip => write!(f, "skip"),
        }
    }
}

/// A node that could not be synced. The rest of the run carried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node_id: String,
    pub reason: String,
}

impl NodeFailure {
    fn new(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub strategy: SyncStrategy,
    pub categories_fetched: usize,
    pub categories_merged: usize,
    pub groups_skipped: usize,
    pub items_written: usize,
    pub failures: Vec<NodeFailure>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(strategy: SyncStrategy) -> Self {
        Self {
            strategy,
            categories_fetched: 0,
            categories_merged: 0,
            groups_skipped: 0,
            items_written: 0,
            failures: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    fn absorb(&mut self, stats: MergeStats) {
        self.categories_merged += 1;
        self.groups_skipped += stats.groups_skipped;
        self.items_written += stats.items_written;
        self.failures.extend(
            stats
                .rejected
                .into_iter()
                .map(|record| NodeFailure::new(record, "missing id")),
        );
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upper bound for each individual remote call.
    pub fetch_timeout: Duration,
    /// Category subtrees fetched at once during an incremental sync.
    pub max_concurrent_fetches: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 4,
        }
    }
}

/// Resets the published phase to `Idle` however the run ends.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<SyncPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn new(phase: &'a watch::Sender<SyncPhase>) -> Self {
        Self { phase }
    }

    fn set(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(SyncPhase::Idle);
    }
}

/// Held for the whole run, including writes that outlive a cancelled caller.
type RunLease = Arc<OwnedMutexGuard<()>>;

type FetchedCategory = (
    NodeMetadata,
    Result<Option<Category>, RemoteError>,
    Result<Vec<NodeMetadata>, RemoteError>,
);

/// Keeps the local store in step with the remote catalog.
///
/// Only one run may be active at a time; overlapping calls fail fast with
/// [`SyncError::AlreadyInProgress`] instead of queueing.
pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteGateway>,
    store: Arc<dyn CatalogStore>,
    bookkeeping: Arc<dyn BookkeepingStore>,
    options: SyncOptions,
    gate: Arc<Mutex<()>>,
    phase: watch::Sender<SyncPhase>,
}

impl SyncOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteGateway>,
        store: Arc<dyn CatalogStore>,
        bookkeeping: Arc<dyn BookkeepingStore>,
        options: SyncOptions,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            remote,
            store,
            bookkeeping,
            options,
            gate: Arc::new(Mutex::new(())),
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Current bookkeeping, or the empty state if it cannot be read.
    pub async fn bookkeeping(&self) -> SyncBookkeeping {
        match self.bookkeeping.load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable sync state");
                SyncBookkeeping::default()
            }
        }
    }

    /// Syncs only what changed remotely, or nothing at all.
    pub async fn sync_if_needed(&self) -> Result<SyncReport, SyncError> {
        let lease = self.acquire()?;
        let phase = PhaseGuard::new(&self.phase);
        phase.set(SyncPhase::DecidingStrategy);

        self.ensure_store().await?;
        let mut bookkeeping = self.bookkeeping().await;

        let local_categories = self
            .store
            .category_count()
            .await
            .map_err(|e| SyncError::ContextUnavailable(e.to_string()))?;
        if local_categories == 0 {
            tracing::info!("Local catalog is empty, running full sync");
            return self.full_sync(&phase, &lease).await;
        }

        let Some(stored) = bookkeeping.category_checksums.clone() else {
            tracing::info!("No stored checksums, running full sync");
            return self.full_sync(&phase, &lease).await;
        };

        let remote_meta = self.fetch(self.remote.fetch_category_metadata()).await?;
        let changed: Vec<NodeMetadata> = remote_meta
            .into_iter()
            .filter(|meta| stored.get(&meta.id) != Some(&meta.checksum))
            .collect();

        if changed.is_empty() {
            phase.set(SyncPhase::Skipping);
            tracing::info!("Local catalog is up to date");
            let report = SyncReport::new(SyncStrategy::Skip);
            bookkeeping.last_sync = Some(report.finished_at);
            self.save_bookkeeping(&bookkeeping).await?;
            return Ok(report);
        }

        tracing::info!(changed = changed.len(), "Running incremental sync");
        self.incremental_sync(&phase, &lease, bookkeeping, changed).await
    }

    /// Replaces the local catalog with the full remote tree.
    pub async fn force_sync(&self) -> Result<SyncReport, SyncError> {
        let lease = self.acquire()?;
        let phase = PhaseGuard::new(&self.phase);
        phase.set(SyncPhase::DecidingStrategy);

        self.ensure_store().await?;
        tracing::info!("Forced full sync");
        self.full_sync(&phase, &lease).await
    }

    fn acquire(&self) -> Result<RunLease, SyncError> {
        self.gate
            .clone()
            .try_lock_owned()
            .map(Arc::new)
            .map_err(|_| SyncError::AlreadyInProgress)
    }

    async fn ensure_store(&self) -> Result<(), SyncError> {
        self.store
            .ping()
            .await
            .map_err(|e| SyncError::ContextUnavailable(e.to_string()))
    }

    async fn full_sync(
        &self,
        phase: &PhaseGuard<'_>,
        lease: &RunLease,
    ) -> Result<SyncReport, SyncError> {
        phase.set(SyncPhase::FullSyncing);
        let mut report = SyncReport::new(SyncStrategy::Full);

        let fetched = self.fetch(self.remote.fetch_all_categories()).await?;
        if let Some(unnamed) = fetched.iter().find(|c| c.id.is_none()) {
            return Err(SyncError::InvalidData(format!(
                "category '{}' has no id",
                unnamed.name
            )));
        }
        report.categories_fetched = fetched.len();

        let checksums: BTreeMap<String, String> = fetched
            .iter()
            .filter_map(|c| Some((c.id.clone()?, category_checksum(c))))
            .collect();

        let mut rejected = Vec::new();
        let mut tree = Vec::with_capacity(fetched.len());
        for category in fetched {
            let category =
                normalize(category, &mut rejected).map_err(|e| SyncError::InvalidData(e.to_string()))?;
            report.items_written += category.item_count();
            tree.push(category);
        }
        report.failures.extend(
            rejected
                .into_iter()
                .map(|record| NodeFailure::new(record, "missing id")),
        );

        // The write and its bookkeeping run detached, holding the lease, so a
        // cancelled caller neither abandons them midway nor lets another run in.
        let store = self.store.clone();
        let bookkeeping = self.bookkeeping.clone();
        let held = lease.clone();
        let finished_at = Utc::now();
        let count = tree.len();
        tokio::spawn(async move {
            let _held = held;
            store
                .upsert_category_tree(&tree)
                .await
                .map_err(|e| SyncError::SyncFailed(e.to_string()))?;
            bookkeeping
                .save(&SyncBookkeeping {
                    last_sync: Some(finished_at),
                    category_checksums: Some(checksums),
                })
                .await
                .map_err(|e| SyncError::SyncFailed(e.to_string()))
        })
        .await
        .map_err(|e| SyncError::SyncFailed(e.to_string()))??;
        report.categories_merged = count;
        report.finished_at = finished_at;

        tracing::info!(
            categories = report.categories_merged,
            items = report.items_written,
            "Full sync complete"
        );
        Ok(report)
    }

    async fn incremental_sync(
        &self,
        phase: &PhaseGuard<'_>,
        lease: &RunLease,
        mut bookkeeping: SyncBookkeeping,
        changed: Vec<NodeMetadata>,
    ) -> Result<SyncReport, SyncError> {
        phase.set(SyncPhase::IncrementalSyncing);
        let mut report = SyncReport::new(SyncStrategy::Incremental);
        let mut checksums = bookkeeping.category_checksums.clone().unwrap_or_default();

        let mut fetched: Vec<FetchedCategory> = stream::iter(changed)
            .map(move |meta| async move {
                let (content, groups) = tokio::join!(
                    self.fetch(self.remote.fetch_category(&meta.id)),
                    self.fetch(self.remote.fetch_group_metadata(&meta.id)),
                );
                (meta, content, groups)
            })
            .buffer_unordered(self.options.max_concurrent_fetches.max(1))
            .collect()
            .await;
        fetched.sort_by(|a, b| a.0.id.cmp(&b.0.id));

        let mut aborted = None;
        for (meta, content, groups) in fetched {
            let category = match content {
                Ok(Some(category)) => category,
                Ok(None) => {
                    tracing::warn!(category = %meta.id, "Category vanished before it could be fetched");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(category = %meta.id, error = %e, "Failed to fetch category");
                    report.failures.push(NodeFailure::new(&meta.id, e.to_string()));
                    continue;
                }
            };
            report.categories_fetched += 1;

            if category.id.is_none() {
                tracing::warn!(category = %meta.id, "Fetched category has no id");
                report
                    .failures
                    .push(NodeFailure::new(&meta.id, "decoding error: missing id"));
                continue;
            }

            let group_checksums: HashMap<String, String> = match groups {
                Ok(list) => list.into_iter().map(|m| (m.id, m.checksum)).collect(),
                Err(e) => {
                    tracing::debug!(category = %meta.id, error = %e, "No group metadata, comparing fetched content");
                    HashMap::new()
                }
            };

            // Detached for the same reason as the full-sync write.
            let store = self.store.clone();
            let held = lease.clone();
            let merged = tokio::spawn(async move {
                let _held = held;
                merge_category(store, category, group_checksums).await
            })
            .await;
            match merged {
                Ok(Ok(stats)) => {
                    report.absorb(stats);
                    checksums.insert(meta.id, meta.checksum);
                }
                Ok(Err(e)) => {
                    aborted = Some(format!("category {}: {}", meta.id, e));
                    break;
                }
                Err(e) => {
                    aborted = Some(format!("category {}: {}", meta.id, e));
                    break;
                }
            }
        }

        report.finished_at = Utc::now();
        bookkeeping.category_checksums = Some(checksums);
        bookkeeping.last_sync = Some(report.finished_at);
        self.save_bookkeeping(&bookkeeping).await?;

        if let Some(reason) = aborted {
            return Err(SyncError::SyncFailed(reason));
        }

        tracing::info!(
            merged = report.categories_merged,
            failed = report.failures.len(),
            "Incremental sync complete"
        );
        Ok(report)
    }

    async fn save_bookkeeping(&self, state: &SyncBookkeeping) -> Result<(), SyncError> {
        self.bookkeeping
            .save(state)
            .await
            .map_err(|e| SyncError::SyncFailed(e.to_string()))
    }

    async fn fetch<T, F>(&self, request: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.options.fetch_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.options.fetch_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, SqliteCatalogStore, StoreError};
    use crate::models::{Catalog, Group, Item};
    use crate::remote::MemoryGateway;
    use crate::sync::bookkeeping::MemoryBookkeeping;
    use crate::sync::checksum::category_checksum;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    struct Harness {
        orchestrator: SyncOrchestrator,
        remote: Arc<MemoryGateway>,
        store: Arc<SqliteCatalogStore>,
        bookkeeping: Arc<MemoryBookkeeping>,
        _temp_dir: TempDir,
    }

    impl Harness {
        fn remote_catalog(&self) -> Catalog {
            let mut out = Catalog::default();
            self.remote.update(|c| out = c.clone());
            out
        }
    }

    async fn setup(catalog: Catalog) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let store = Arc::new(SqliteCatalogStore::new(pool));
        let remote = Arc::new(MemoryGateway::new(catalog));
        let bookkeeping = Arc::new(MemoryBookkeeping::default());
        let orchestrator = SyncOrchestrator::new(
            remote.clone(),
            store.clone(),
            bookkeeping.clone(),
            SyncOptions::default(),
        );
        Harness {
            orchestrator,
            remote,
            store,
            bookkeeping,
            _temp_dir: temp_dir,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Category::new("m1", "Letters").with_groups(vec![
                Group::new("l1", "", "Easy")
                    .with_difficulty(60)
                    .with_items(vec![
                        Item::word("g1", "", "Starts with A", 0, "a"),
                        Item::word("g2", "", "Second letter B", 1, "b"),
                    ]),
                Group::new("l2", "", "Hard")
                    .with_items(vec![Item::word("g3", "", "Ends with Z", 4, "z")]),
            ]),
            Category::new("m2", "Categories").with_groups(vec![Group::new("l3", "", "Food")
                .with_items(vec![Item::category_answer(
                    "g4",
                    "",
                    "Fruits",
                    ["apple", "pear"],
                )])]),
        ])
    }

    #[tokio::test]
    async fn test_first_sync_is_full() {
        let h = setup(catalog()).await;

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.strategy, SyncStrategy::Full);
        assert_eq!(report.categories_merged, 2);
        assert_eq!(report.items_written, 4);

        let local = h.store.fetch_all_categories().await.unwrap();
        assert_eq!(local.len(), 2);
        assert_eq!(local[0].item_count(), 3);

        let state = h.bookkeeping.snapshot();
        assert!(state.last_sync.is_some());
        let expected: BTreeMap<String, String> = catalog()
            .categories
            .iter()
            .map(|c| (c.id.clone().unwrap(), category_checksum(c)))
            .collect();
        assert_eq!(state.category_checksums, Some(expected));
    }

    #[tokio::test]
    async fn test_unchanged_remote_is_skipped_without_content_fetches() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();
        let before = h.store.fetch_all_categories().await.unwrap();
        let first_sync = h.bookkeeping.snapshot().last_sync;
        h.remote.reset_calls();

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.strategy, SyncStrategy::Skip);
        assert_eq!(h.remote.calls().content_fetches(), 0);
        assert_eq!(h.remote.calls().category_metadata, 1);
        assert_eq!(h.store.fetch_all_categories().await.unwrap(), before);
        assert!(h.bookkeeping.snapshot().last_sync >= first_sync);
    }

    #[tokio::test]
    async fn test_changed_category_is_synced_incrementally() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();
        let original = h.store.fetch_category("m1").await.unwrap().unwrap();
        h.remote.reset_calls();

        h.remote.update(|catalog| {
            let group = catalog.category_mut("m1").unwrap().group_mut("l1").unwrap();
            group.items[0].name = "Starts with Q".to_string();
            group.items[0].updated_at = group.items[0].updated_at + ChronoDuration::seconds(5);
            group.items.push(Item::word("g5", "l1", "Third letter C", 2, "c"));
        });

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.strategy, SyncStrategy::Incremental);
        assert_eq!(report.categories_merged, 1);
        assert_eq!(report.groups_skipped, 1);
        assert_eq!(h.remote.calls().category, 1);
        assert_eq!(h.remote.calls().all_categories, 0);

        let local = h.store.fetch_category("m1").await.unwrap().unwrap();
        let l1 = local.group("l1").unwrap();
        assert_eq!(l1.item("g1").unwrap().name, "Starts with Q");
        assert_eq!(
            l1.item("g1").unwrap().created_at,
            original.group("l1").unwrap().item("g1").unwrap().created_at
        );
        assert!(l1.item("g5").is_some());
        assert_eq!(local.created_at, original.created_at);

        let remote_checksum = category_checksum(h.remote_catalog().category("m1").unwrap());
        assert_eq!(
            h.bookkeeping.snapshot().checksum("m1"),
            Some(remote_checksum.as_str())
        );

        // Converged: the next run does no work.
        let again = h.orchestrator.sync_if_needed().await.unwrap();
        assert_eq!(again.strategy, SyncStrategy::Skip);
    }

    #[tokio::test]
    async fn test_new_remote_category_is_inserted() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();

        h.remote.update(|catalog| {
            catalog.categories.push(
                Category::new("m3", "Numbers")
                    .with_groups(vec![Group::new("l9", "", "Count")]),
            );
        });
        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.strategy, SyncStrategy::Incremental);
        assert_eq!(h.store.category_count().await.unwrap(), 3);
        assert!(h.store.exists_group("l9").await.unwrap());
        assert!(h.bookkeeping.snapshot().checksum("m3").is_some());
    }

    #[tokio::test]
    async fn test_failed_category_keeps_old_checksum() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();
        let old_m2 = h.bookkeeping.snapshot().checksum("m2").unwrap().to_string();

        h.remote.update(|catalog| {
            catalog.category_mut("m1").unwrap().name = "Letters!".to_string();
            catalog.category_mut("m2").unwrap().name = "Categories!".to_string();
        });
        h.remote.fail_category("m2");

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.categories_merged, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node_id, "m2");

        let state = h.bookkeeping.snapshot();
        assert_eq!(state.checksum("m2"), Some(old_m2.as_str()));
        assert!(state.checksum("m1").is_some());
        let m1 = h.store.fetch_category("m1").await.unwrap().unwrap();
        assert_eq!(m1.name, "Letters!");
        let m2 = h.store.fetch_category("m2").await.unwrap().unwrap();
        assert_eq!(m2.name, "Categories");
    }

    #[tokio::test]
    async fn test_full_sync_failure_leaves_local_state_intact() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();
        let before = h.store.fetch_all_categories().await.unwrap();
        let state_before = h.bookkeeping.snapshot();

        h.remote.set_offline(true);
        let err = h.orchestrator.force_sync().await.unwrap_err();

        assert!(matches!(err, SyncError::NetworkError(_)));
        assert_eq!(h.store.fetch_all_categories().await.unwrap(), before);
        assert_eq!(h.bookkeeping.snapshot(), state_before);
    }

    #[tokio::test]
    async fn test_metadata_failure_is_network_error() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();

        h.remote.set_offline(true);
        let err = h.orchestrator.sync_if_needed().await.unwrap_err();
        assert!(matches!(err, SyncError::NetworkError(_)));
    }

    #[tokio::test]
    async fn test_empty_remote_gives_empty_cache() {
        let h = setup(Catalog::default()).await;

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.strategy, SyncStrategy::Full);
        assert_eq!(h.store.category_count().await.unwrap(), 0);
        assert_eq!(
            h.bookkeeping.snapshot().category_checksums,
            Some(BTreeMap::new())
        );
    }

    #[tokio::test]
    async fn test_missing_checksum_map_forces_full_sync() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();
        h.bookkeeping.save(&SyncBookkeeping::default()).await.unwrap();
        h.remote.reset_calls();

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.strategy, SyncStrategy::Full);
        assert_eq!(h.remote.calls().all_categories, 1);
        assert!(h.bookkeeping.snapshot().category_checksums.is_some());
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let h = setup(catalog()).await;
        h.orchestrator.force_sync().await.unwrap();
        let first = h.store.fetch_all_categories().await.unwrap();
        h.orchestrator.force_sync().await.unwrap();
        let second = h.store.fetch_all_categories().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_removed_category_survives_until_forced() {
        let h = setup(catalog()).await;
        h.orchestrator.sync_if_needed().await.unwrap();

        h.remote.update(|catalog| catalog.categories.retain(|c| c.id.as_deref() != Some("m2")));
        let report = h.orchestrator.sync_if_needed().await.unwrap();
        assert_eq!(report.strategy, SyncStrategy::Skip);
        assert!(h.store.exists_category("m2").await.unwrap());

        h.orchestrator.force_sync().await.unwrap();
        assert!(!h.store.exists_category("m2").await.unwrap());
        assert!(!h.store.exists_item("g4").await.unwrap());
    }

    #[tokio::test]
    async fn test_category_without_id_is_invalid_data() {
        let mut remote = catalog();
        remote.categories[1].id = None;
        let h = setup(remote).await;

        let err = h.orchestrator.sync_if_needed().await.unwrap_err();

        assert!(matches!(err, SyncError::InvalidData(_)));
        assert_eq!(h.store.category_count().await.unwrap(), 0);
        assert_eq!(h.bookkeeping.snapshot(), SyncBookkeeping::default());
    }

    #[tokio::test]
    async fn test_items_without_id_are_reported() {
        let mut remote = catalog();
        remote.categories[0].groups[0].items[1].id = None;
        let h = setup(remote).await;

        let report = h.orchestrator.sync_if_needed().await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(h.store.fetch_category("m1").await.unwrap().unwrap().item_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_call_is_rejected() {
        let h = setup(catalog()).await;
        let _running = h.orchestrator.gate.try_lock().unwrap();

        assert!(matches!(
            h.orchestrator.sync_if_needed().await,
            Err(SyncError::AlreadyInProgress)
        ));
        assert!(matches!(
            h.orchestrator.force_sync().await,
            Err(SyncError::AlreadyInProgress)
        ));
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle() {
        let h = setup(catalog()).await;
        let phases = h.orchestrator.subscribe();

        h.orchestrator.sync_if_needed().await.unwrap();
        assert_eq!(*phases.borrow(), SyncPhase::Idle);

        h.remote.set_offline(true);
        h.orchestrator.force_sync().await.unwrap_err();
        assert_eq!(h.orchestrator.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_closed_store_is_context_unavailable() {
        let h = setup(catalog()).await;
        h.store.pool().close().await;

        let err = h.orchestrator.sync_if_needed().await.unwrap_err();
        assert!(matches!(err, SyncError::ContextUnavailable(_)));
        assert_eq!(h.remote.calls(), Default::default());
    }

    struct StalledGateway;

    #[async_trait]
    impl RemoteGateway for StalledGateway {
        async fn fetch_all_categories(&self) -> Result<Vec<Category>, RemoteError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn fetch_category_metadata(&self) -> Result<Vec<NodeMetadata>, RemoteError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn fetch_group_metadata(&self, _: &str) -> Result<Vec<NodeMetadata>, RemoteError> {
            Ok(Vec::new())
        }

        async fn fetch_category(&self, _: &str) -> Result<Option<Category>, RemoteError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_stalled_fetch_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let orchestrator = SyncOrchestrator::new(
            Arc::new(StalledGateway),
            Arc::new(SqliteCatalogStore::new(pool)),
            Arc::new(MemoryBookkeeping::default()),
            SyncOptions {
                fetch_timeout: Duration::from_millis(50),
                max_concurrent_fetches: 1,
            },
        );

        let err = orchestrator.sync_if_needed().await.unwrap_err();
        assert!(matches!(err, SyncError::NetworkError(_)));
    }

    struct GarbledMetadataGateway {
        catalog: Catalog,
    }

    #[async_trait]
    impl RemoteGateway for GarbledMetadataGateway {
        async fn fetch_all_categories(&self) -> Result<Vec<Category>, RemoteError> {
            Ok(self.catalog.categories.clone())
        }

        async fn fetch_category_metadata(&self) -> Result<Vec<NodeMetadata>, RemoteError> {
            Err(RemoteError::Decoding("expected array at line 1".into()))
        }

        async fn fetch_group_metadata(&self, id: &str) -> Result<Vec<NodeMetadata>, RemoteError> {
            Ok(self.catalog.group_metadata(id))
        }

        async fn fetch_category(&self, id: &str) -> Result<Option<Category>, RemoteError> {
            Ok(self.catalog.category(id).cloned())
        }
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_invalid_data() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let orchestrator = SyncOrchestrator::new(
            Arc::new(GarbledMetadataGateway { catalog: catalog() }),
            Arc::new(SqliteCatalogStore::new(pool)),
            Arc::new(MemoryBookkeeping::default()),
            SyncOptions::default(),
        );
        orchestrator.sync_if_needed().await.unwrap();

        let err = orchestrator.sync_if_needed().await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidData(_)));
    }

    /// Store whose tree replacement takes a while to land.
    struct SlowTreeStore {
        inner: SqliteCatalogStore,
        delay: Duration,
    }

    #[async_trait]
    impl CatalogStore for SlowTreeStore {
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }

        async fn fetch_all_categories(&self) -> Result<Vec<Category>, StoreError> {
            self.inner.fetch_all_categories().await
        }

        async fn fetch_category(&self, id: &str) -> Result<Option<Category>, StoreError> {
            self.inner.fetch_category(id).await
        }

        async fn category_count(&self) -> Result<usize, StoreError> {
            self.inner.category_count().await
        }

        async fn exists_category(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.exists_category(id).await
        }

        async fn exists_group(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.exists_group(id).await
        }

        async fn exists_item(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.exists_item(id).await
        }

        async fn upsert_category_tree(&self, categories: &[Category]) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.upsert_category_tree(categories).await
        }

        async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
            self.inner.insert_category(category).await
        }

        async fn insert_group(&self, group: &Group, category_id: &str) -> Result<(), StoreError> {
            self.inner.insert_group(group, category_id).await
        }

        async fn insert_item(&self, item: &Item, group_id: &str) -> Result<(), StoreError> {
            self.inner.insert_item(item, group_id).await
        }

        async fn update_category_in_place(&self, category: &Category) -> Result<(), StoreError> {
            self.inner.update_category_in_place(category).await
        }

        async fn update_group_in_place(&self, group: &Group) -> Result<(), StoreError> {
            self.inner.update_group_in_place(group).await
        }

        async fn update_item_in_place(&self, item: &Item) -> Result<(), StoreError> {
            self.inner.update_item_in_place(item).await
        }

        async fn delete_category(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_category(id).await
        }

        async fn delete_group(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_group(id).await
        }

        async fn clear_all(&self) -> Result<(), StoreError> {
            self.inner.clear_all().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_sync_keeps_the_gate_until_its_write_lands() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let store = Arc::new(SlowTreeStore {
            inner: SqliteCatalogStore::new(pool),
            delay: Duration::from_millis(300),
        });
        let bookkeeping = Arc::new(MemoryBookkeeping::default());
        let orchestrator = SyncOrchestrator::new(
            Arc::new(MemoryGateway::new(catalog())),
            store.clone(),
            bookkeeping.clone(),
            SyncOptions::default(),
        );

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), orchestrator.force_sync()).await;
        assert!(cancelled.is_err());

        // The detached write is still running: nobody may start another run.
        assert!(matches!(
            orchestrator.force_sync().await,
            Err(SyncError::AlreadyInProgress)
        ));
        assert!(matches!(
            orchestrator.sync_if_needed().await,
            Err(SyncError::AlreadyInProgress)
        ));

        for _ in 0..50 {
            if orchestrator.gate.try_lock().is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // The abandoned run committed as a whole, bookkeeping included.
        assert_eq!(store.category_count().await.unwrap(), 2);
        let local = store.fetch_all_categories().await.unwrap();
        assert_eq!(local.iter().map(Category::item_count).sum::<usize>(), 4);
        assert!(bookkeeping.snapshot().category_checksums.is_some());

        let report = orchestrator.sync_if_needed().await.unwrap();
        assert_eq!(report.strategy, SyncStrategy::Skip);
    }
}
