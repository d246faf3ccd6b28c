use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{Category, NodeMetadata};
use crate::sync::checksum::{category_checksum, group_checksum};

/// A published snapshot of the whole remote catalog.
///
/// This is what the publisher writes and what the file gateway and the
/// catalog server read. Metadata is derived from content on demand, so a
/// snapshot can never disagree with its own checksums.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Catalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            published_at: None,
            categories,
        }
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id.as_deref() == Some(id))
    }

    pub fn category_mut(&mut self, id: &str) -> Option<&mut Category> {
        self.categories
            .iter_mut()
            .find(|c| c.id.as_deref() == Some(id))
    }

    /// Metadata for every category that has an id.
    pub fn category_metadata(&self) -> Vec<NodeMetadata> {
        self.categories
            .iter()
            .filter_map(|category| {
                let id = category.id.clone()?;
                let last_modified = category
                    .groups
                    .iter()
                    .flat_map(|g| {
                        std::iter::once(g.updated_at).chain(g.items.iter().map(|i| i.updated_at))
                    })
                    .fold(category.updated_at, |acc, t| acc.max(t));
                Some(NodeMetadata {
                    id,
                    checksum: category_checksum(category),
                    last_modified,
                    child_count: category.groups.len(),
                })
            })
            .collect()
    }

    /// Metadata for the groups of one category; empty when the category is unknown.
    pub fn group_metadata(&self, category_id: &str) -> Vec<NodeMetadata> {
        let Some(category) = self.category(category_id) else {
            return Vec::new();
        };

        category
            .groups
            .iter()
            .filter_map(|group| {
                let id = group.id.clone()?;
                let last_modified = group
                    .items
                    .iter()
                    .map(|i| i.updated_at)
                    .fold(group.updated_at, |acc, t| acc.max(t));
                Some(NodeMetadata {
                    id,
                    checksum: group_checksum(group),
                    last_modified,
                    child_count: group.items.len(),
                })
            })
            .collect()
    }

    /// Reads a snapshot; a missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self, CatalogFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogFileError::Read(path.display().to_string(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| CatalogFileError::Parse(path.display().to_string(), e))
    }

    /// Writes the snapshot through a temporary file so readers never see half of it.
    pub fn save(&self, path: &Path) -> Result<(), CatalogFileError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CatalogFileError::Write(path.display().to_string(), e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CatalogFileError::Parse(path.display().to_string(), e))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| CatalogFileError::Write(tmp.display().to_string(), e))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| CatalogFileError::Write(path.display().to_string(), e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogFileError {
    #[error("Failed to read catalog '{0}': {1}")]
    Read(String, std::io::Error),
    #[error("Failed to write catalog '{0}': {1}")]
    Write(String, std::io::Error),
    #[error("Invalid catalog '{0}': {1}")]
    Parse(String, serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Group, Item};
    use tempfile::tempdir;

    fn catalog() -> Catalog {
        let mut anonymous = Category::new("", "No id");
        anonymous.id = None;
        Catalog::new(vec![
            Category::new("m1", "Letters").with_groups(vec![
                Group::new("l1", "", "Easy").with_items(vec![Item::word("g1", "", "A", 0, "a")]),
                Group::new("l2", "", "Hard"),
            ]),
            anonymous,
        ])
    }

    #[test]
    fn test_category_metadata_skips_nodes_without_id() {
        let meta = catalog().category_metadata();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].id, "m1");
        assert_eq!(meta[0].child_count, 2);
        assert_eq!(meta[0].checksum, category_checksum(&catalog().categories[0]));
    }

    #[test]
    fn test_group_metadata() {
        let catalog = catalog();
        let meta = catalog.group_metadata("m1");
        assert_eq!(meta.len(), 2);
        assert_eq!(meta[0].child_count, 1);
        assert_eq!(
            meta[0].checksum,
            group_checksum(catalog.category("m1").unwrap().group("l1").unwrap())
        );
        assert!(catalog.group_metadata("unknown").is_empty());
    }

    #[test]
    fn test_last_modified_tracks_newest_descendant() {
        let mut catalog = catalog();
        let later = Utc::now() + chrono::Duration::hours(1);
        catalog.categories[0].groups[0].items[0].updated_at = later;
        assert_eq!(catalog.category_metadata()[0].last_modified, later);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");

        assert_eq!(Catalog::load(&path).unwrap(), Catalog::default());

        let catalog = catalog();
        catalog.save(&path).unwrap();
        assert_eq!(Catalog::load(&path).unwrap(), catalog);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Catalog::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid catalog"));
    }
}
