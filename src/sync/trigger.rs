//! Maps application lifecycle events and user refreshes onto sync runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::orchestrator::{SyncError, SyncOrchestrator, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Startup,
    Foreground,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleKind::Startup => write!(f, "startup"),
            LifecycleKind::Foreground => write!(f, "foreground"),
        }
    }
}

/// A lifecycle event. Generations increase monotonically across events of
/// any kind, so each event is identified by its generation alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub generation: u64,
}

impl LifecycleEvent {
    pub fn startup(generation: u64) -> Self {
        Self {
            kind: LifecycleKind::Startup,
            generation,
        }
    }

    pub fn foreground(generation: u64) -> Self {
        Self {
            kind: LifecycleKind::Foreground,
            generation,
        }
    }
}

pub struct SyncTrigger {
    orchestrator: Arc<SyncOrchestrator>,
    // Highest generation seen, plus one; zero means none yet.
    seen: AtomicU64,
}

impl SyncTrigger {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            seen: AtomicU64::new(0),
        }
    }

    /// Runs `sync_if_needed` for a new event. Returns `None` when the event
    /// was already handled or is older than one that was.
    pub async fn on_lifecycle_event(
        &self,
        event: LifecycleEvent,
    ) -> Option<Result<SyncReport, SyncError>> {
        let marker = event.generation.saturating_add(1);
        if self.seen.fetch_max(marker, Ordering::SeqCst) >= marker {
            tracing::debug!(kind = %event.kind, generation = event.generation, "Ignoring handled lifecycle event");
            return None;
        }

        tracing::debug!(kind = %event.kind, generation = event.generation, "Lifecycle sync");
        Some(self.orchestrator.sync_if_needed().await)
    }

    /// User-initiated refresh: always a full sync.
    pub async fn refresh(&self) -> Result<SyncReport, SyncError> {
        self.orchestrator.force_sync().await
    }
}
