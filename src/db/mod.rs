mod catalog_repo;

pub use catalog_repo::SqliteCatalogStore;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::{Category, Group, Item};

/// Errors from the local catalog store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to create database directory '{0}': {1}")]
    Directory(PathBuf, std::io::Error),
    #[error("Cannot store a {kind} without an id")]
    MissingId { kind: &'static str },
    #[error("No local {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Corrupt local record: {0}")]
    Corrupt(String),
}

/// CRUD over the local hierarchical cache.
///
/// Every mutating method commits atomically before returning: either all of
/// its rows are written or none are.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Cheap round-trip proving the store is usable.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn fetch_all_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn fetch_category(&self, id: &str) -> Result<Option<Category>, StoreError>;
    async fn category_count(&self) -> Result<usize, StoreError>;

    async fn exists_category(&self, id: &str) -> Result<bool, StoreError>;
    async fn exists_group(&self, id: &str) -> Result<bool, StoreError>;
    async fn exists_item(&self, id: &str) -> Result<bool, StoreError>;

    /// Wipes every category (cascading) and inserts `categories` fresh.
    async fn upsert_category_tree(&self, categories: &[Category]) -> Result<(), StoreError>;

    /// Inserts a category with all of its groups and items.
    async fn insert_category(&self, category: &Category) -> Result<(), StoreError>;
    /// Inserts a group (with its items) under `category_id`.
    async fn insert_group(&self, group: &Group, category_id: &str) -> Result<(), StoreError>;
    async fn insert_item(&self, item: &Item, group_id: &str) -> Result<(), StoreError>;

    /// Field-level update of an existing record. Children are not touched,
    /// `created_at` is kept and `updated_at` never moves backwards.
    async fn update_category_in_place(&self, category: &Category) -> Result<(), StoreError>;
    async fn update_group_in_place(&self, group: &Group) -> Result<(), StoreError>;
    async fn update_item_in_place(&self, item: &Item) -> Result<(), StoreError>;

    async fn delete_category(&self, id: &str) -> Result<(), StoreError>;
    async fn delete_group(&self, id: &str) -> Result<(), StoreError>;
    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: PathBuf) -> Result<SqlitePool, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Directory(parent.to_path_buf(), e))?;
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let pool = init_db(db_path).await.unwrap();

        // Verify tables exist
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(table_names, vec!["categories", "category_groups", "items"]);
    }

    #[tokio::test]
    async fn test_init_db_is_reentrant() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let first = init_db(db_path.clone()).await.unwrap();
        first.close().await;
        init_db(db_path).await.unwrap();
    }
}
