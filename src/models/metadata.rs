use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight per-node summary used to decide whether content needs fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub id: String,
    pub checksum: String,
    pub last_modified: DateTime<Utc>,
    pub child_count: usize,
}
