//! Merges one remote category subtree into the local store.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{CatalogStore, StoreError};
use crate::models::{Category, Group, Item};
use crate::sync::checksum::group_checksum;

/// What a single category merge wrote and what it left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub category_inserted: bool,
    pub groups_inserted: usize,
    pub groups_updated: usize,
    pub groups_skipped: usize,
    pub items_written: usize,
    /// Records dropped because they carried no id.
    pub rejected: Vec<String>,
}

/// Brings the local copy of `remote` up to date without deleting anything.
///
/// `remote_group_checksums` maps group id to the checksum the remote
/// reported for it; groups it does not cover are fingerprinted from the
/// fetched content instead. The caller guarantees `remote.id` is set.
pub async fn merge_category(
    store: Arc<dyn CatalogStore>,
    remote: Category,
    remote_group_checksums: HashMap<String, String>,
) -> Result<MergeStats, StoreError> {
    let mut stats = MergeStats::default();
    let remote = normalize(remote, &mut stats.rejected)?;
    let category_id = remote.id_or_empty().to_string();

    if !store.exists_category(&category_id).await? {
        store.insert_category(&remote).await?;
        stats.category_inserted = true;
        stats.groups_inserted = remote.groups.len();
        stats.items_written = remote.item_count();
        tracing::debug!(category = %category_id, "Inserted new category");
        return Ok(stats);
    }

    store.update_category_in_place(&remote).await?;

    let local_checksums: HashMap<String, String> = store
        .fetch_category(&category_id)
        .await?
        .map(|local| {
            local
                .groups
                .iter()
                .filter_map(|g| Some((g.id.clone()?, group_checksum(g))))
                .collect()
        })
        .unwrap_or_default();

    for group in &remote.groups {
        let group_id = group.id_or_empty();

        if !store.exists_group(group_id).await? {
            store.insert_group(group, &category_id).await?;
            stats.groups_inserted += 1;
            stats.items_written += group.items.len();
            continue;
        }

        let remote_checksum = remote_group_checksums
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| group_checksum(group));
        if local_checksums.get(group_id) == Some(&remote_checksum) {
            stats.groups_skipped += 1;
            continue;
        }

        store.update_group_in_place(group).await?;
        stats.groups_updated += 1;
        for item in &group.items {
            write_item(store.as_ref(), item, group_id).await?;
            stats.items_written += 1;
        }
    }

    tracing::debug!(
        category = %category_id,
        updated = stats.groups_updated,
        skipped = stats.groups_skipped,
        inserted = stats.groups_inserted,
        "Merged category"
    );
    Ok(stats)
}

async fn write_item(store: &dyn CatalogStore, item: &Item, group_id: &str) -> Result<(), StoreError> {
    if store.exists_item(item.id_or_empty()).await? {
        store.update_item_in_place(item).await
    } else {
        store.insert_item(item, group_id).await
    }
}

/// Drops id-less groups and items and points every child at its parent.
pub(crate) fn normalize(mut category: Category, rejected: &mut Vec<String>) -> Result<Category, StoreError> {
    let category_id = category
        .id
        .clone()
        .ok_or(StoreError::MissingId { kind: "category" })?;

    let groups = std::mem::take(&mut category.groups);
    category.groups = groups
        .into_iter()
        .filter_map(|group| match group.id.clone() {
            Some(group_id) => Some(normalize_group(group, &category_id, &group_id, rejected)),
            None => {
                tracing::warn!(category = %category_id, name = %group.name, "Skipping group without id");
                rejected.push(format!("group '{}' in category {}", group.name, category_id));
                None
            }
        })
        .collect();

    Ok(category)
}

fn normalize_group(
    mut group: Group,
    category_id: &str,
    group_id: &str,
    rejected: &mut Vec<String>,
) -> Group {
    group.category_id = category_id.to_string();
    let items = std::mem::take(&mut group.items);
    group.items = items
        .into_iter()
        .filter_map(|mut item| {
            if item.id.is_none() {
                tracing::warn!(group = %group_id, name = %item.name, "Skipping item without id");
                rejected.push(format!("item '{}' in group {}", item.name, group_id));
                return None;
            }
            item.group_id = group_id.to_string();
            Some(item)
        })
        .collect();
    group
}
