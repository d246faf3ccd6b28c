use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::{CatalogStore, StoreError};
use crate::models::{Category, Group, Item, ItemKind, ItemKindTag};

/// SQLite-backed [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: String,
    name: String,
    description: String,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    category_id: String,
    name: String,
    description: String,
    difficulty_or_time_limit: Option<i64>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    group_id: String,
    name: String,
    description: String,
    instructions: String,
    time_limit_seconds: Option<f64>,
    case_sensitive: bool,
    kind: String,
    letter_position: Option<i64>,
    target_letter: Option<String>,
    answer_bank: Option<String>,
    created_at: String,
    updated_at: String,
}

const GROUP_COLUMNS: &str = "g.id, g.category_id, g.name, g.description, g.difficulty_or_time_limit, g.created_at, g.updated_at";
const ITEM_COLUMNS: &str = "i.id, i.group_id, i.name, i.description, i.instructions, i.time_limit_seconds, i.case_sensitive, i.kind, i.letter_position, i.target_letter, i.answer_bank, i.created_at, i.updated_at";

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn exists(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        // CASCADE removes the children
        let sql = format!("DELETE FROM {} WHERE id = ?", table);
        sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Groups and items rows, assembled under the given category rows.
    fn assemble(
        categories: Vec<CategoryRow>,
        groups: Vec<GroupRow>,
        items: Vec<ItemRow>,
    ) -> Result<Vec<Category>, StoreError> {
        let mut items_by_group: HashMap<String, Vec<Item>> = HashMap::new();
        for row in items {
            let item = hydrate_item(row)?;
            items_by_group
                .entry(item.group_id.clone())
                .or_default()
                .push(item);
        }

        let mut groups_by_category: HashMap<String, Vec<Group>> = HashMap::new();
        for row in groups {
            let mut group = hydrate_group(row)?;
            group.items = items_by_group
                .remove(group.id_or_empty())
                .unwrap_or_default();
            groups_by_category
                .entry(group.category_id.clone())
                .or_default()
                .push(group);
        }

        categories
            .into_iter()
            .map(|row| {
                let mut category = hydrate_category(row)?;
                category.groups = groups_by_category
                    .remove(category.id_or_empty())
                    .unwrap_or_default();
                Ok(category)
            })
            .collect()
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_all_categories(&self) -> Result<Vec<Category>, StoreError> {
        let categories: Vec<CategoryRow> =
            sqlx::query_as("SELECT * FROM categories ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        let groups: Vec<GroupRow> = sqlx::query_as(&format!(
            "SELECT {} FROM category_groups g ORDER BY g.rowid",
            GROUP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        let items: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM items i ORDER BY i.rowid",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::assemble(categories, groups, items)
    }

    async fn fetch_category(&self, id: &str) -> Result<Option<Category>, StoreError> {
        let row: Option<CategoryRow> = sqlx::query_as("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let groups: Vec<GroupRow> = sqlx::query_as(&format!(
            "SELECT {} FROM category_groups g WHERE g.category_id = ? ORDER BY g.rowid",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let items: Vec<ItemRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM items i
            INNER JOIN category_groups g ON g.id = i.group_id
            WHERE g.category_id = ?
            ORDER BY i.rowid
            "#,
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::assemble(vec![row], groups, items)?.pop())
    }

    async fn category_count(&self) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn exists_category(&self, id: &str) -> Result<bool, StoreError> {
        self.exists("categories", id).await
    }

    async fn exists_group(&self, id: &str) -> Result<bool, StoreError> {
        self.exists("category_groups", id).await
    }

    async fn exists_item(&self, id: &str) -> Result<bool, StoreError> {
        self.exists("items", id).await
    }

    async fn upsert_category_tree(&self, categories: &[Category]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        clear(&mut *tx).await?;
        for category in categories {
            write_category_tree(&mut *tx, category).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        write_category_tree(&mut *tx, category).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_group(&self, group: &Group, category_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        write_group_tree(&mut *tx, group, category_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_item(&self, item: &Item, group_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        write_item(&mut *tx, item, group_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_category_in_place(&self, category: &Category) -> Result<(), StoreError> {
        let id = category
            .id
            .as_deref()
            .ok_or(StoreError::MissingId { kind: "category" })?;
        let mut tx = self.pool.begin().await?;

        let current = current_updated_at(&mut *tx, "categories", "category", id).await?;
        sqlx::query("UPDATE categories SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(&category.name)
            .bind(&category.description)
            .bind(timestamp(current.max(category.updated_at)))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_group_in_place(&self, group: &Group) -> Result<(), StoreError> {
        let id = group
            .id
            .as_deref()
            .ok_or(StoreError::MissingId { kind: "group" })?;
        let mut tx = self.pool.begin().await?;

        let current = current_updated_at(&mut *tx, "category_groups", "group", id).await?;
        sqlx::query(
            r#"
            UPDATE category_groups
            SET category_id = ?, name = ?, description = ?, difficulty_or_time_limit = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&group.category_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.difficulty_or_time_limit)
        .bind(timestamp(current.max(group.updated_at)))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_item_in_place(&self, item: &Item) -> Result<(), StoreError> {
        let id = item
            .id
            .as_deref()
            .ok_or(StoreError::MissingId { kind: "item" })?;
        let mut tx = self.pool.begin().await?;

        let current = current_updated_at(&mut *tx, "items", "item", id).await?;
        let kind = KindColumns::try_from(&item.kind)?;
        sqlx::query(
            r#"
            UPDATE items
            SET group_id = ?, name = ?, description = ?, instructions = ?, time_limit_seconds = ?,
                case_sensitive = ?, kind = ?, letter_position = ?, target_letter = ?, answer_bank = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.group_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.instructions)
        .bind(item.time_limit_seconds)
        .bind(item.case_sensitive)
        .bind(kind.tag)
        .bind(kind.letter_position)
        .bind(kind.target_letter)
        .bind(kind.answer_bank)
        .bind(timestamp(current.max(item.updated_at)))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_category(&self, id: &str) -> Result<(), StoreError> {
        self.delete("categories", id).await
    }

    async fn delete_group(&self, id: &str) -> Result<(), StoreError> {
        self.delete("category_groups", id).await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        clear(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Stored timestamp format: fixed width, so text order is time order.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

async fn current_updated_at(
    conn: &mut SqliteConnection,
    table: &str,
    kind: &'static str,
    id: &str,
) -> Result<DateTime<Utc>, StoreError> {
    let sql = format!("SELECT updated_at FROM {} WHERE id = ?", table);
    let row: Option<(String,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some((updated_at,)) => parse_timestamp(&updated_at),
        None => Err(StoreError::NotFound {
            kind,
            id: id.to_string(),
        }),
    }
}

async fn clear(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM items").execute(&mut *conn).await?;
    sqlx::query("DELETE FROM category_groups")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM categories")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn write_category_tree(
    conn: &mut SqliteConnection,
    category: &Category,
) -> Result<(), StoreError> {
    let id = category
        .id
        .as_deref()
        .ok_or(StoreError::MissingId { kind: "category" })?;

    sqlx::query(
        r#"
        INSERT INTO categories (id, name, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            updated_at = MAX(categories.updated_at, excluded.updated_at)
        "#,
    )
    .bind(id)
    .bind(&category.name)
    .bind(&category.description)
    .bind(timestamp(category.created_at))
    .bind(timestamp(category.updated_at))
    .execute(&mut *conn)
    .await?;

    for group in &category.groups {
        write_group_tree(conn, group, id).await?;
    }
    Ok(())
}

async fn write_group_tree(
    conn: &mut SqliteConnection,
    group: &Group,
    category_id: &str,
) -> Result<(), StoreError> {
    let id = group
        .id
        .as_deref()
        .ok_or(StoreError::MissingId { kind: "group" })?;

    sqlx::query(
        r#"
        INSERT INTO category_groups (id, category_id, name, description, difficulty_or_time_limit, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            category_id = excluded.category_id,
            name = excluded.name,
            description = excluded.description,
            difficulty_or_time_limit = excluded.difficulty_or_time_limit,
            updated_at = MAX(category_groups.updated_at, excluded.updated_at)
        "#,
    )
    .bind(id)
    .bind(category_id)
    .bind(&group.name)
    .bind(&group.description)
    .bind(group.difficulty_or_time_limit)
    .bind(timestamp(group.created_at))
    .bind(timestamp(group.updated_at))
    .execute(&mut *conn)
    .await?;

    for item in &group.items {
        write_item(conn, item, id).await?;
    }
    Ok(())
}

/// Inserts an item; a repeated id overwrites the earlier row (last write wins).
async fn write_item(
    conn: &mut SqliteConnection,
    item: &Item,
    group_id: &str,
) -> Result<(), StoreError> {
    let id = item
        .id
        .as_deref()
        .ok_or(StoreError::MissingId { kind: "item" })?;
    let kind = KindColumns::try_from(&item.kind)?;

    sqlx::query(
        r#"
        INSERT INTO items (id, group_id, name, description, instructions, time_limit_seconds,
                           case_sensitive, kind, letter_position, target_letter, answer_bank,
                           created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            group_id = excluded.group_id,
            name = excluded.name,
            description = excluded.description,
            instructions = excluded.instructions,
            time_limit_seconds = excluded.time_limit_seconds,
            case_sensitive = excluded.case_sensitive,
            kind = excluded.kind,
            letter_position = excluded.letter_position,
            target_letter = excluded.target_letter,
            answer_bank = excluded.answer_bank,
            updated_at = MAX(items.updated_at, excluded.updated_at)
        "#,
    )
    .bind(id)
    .bind(group_id)
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.instructions)
    .bind(item.time_limit_seconds)
    .bind(item.case_sensitive)
    .bind(kind.tag)
    .bind(kind.letter_position)
    .bind(kind.target_letter)
    .bind(kind.answer_bank)
    .bind(timestamp(item.created_at))
    .bind(timestamp(item.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Column values for the item kind; the unused variant's columns stay NULL.
struct KindColumns {
    tag: &'static str,
    letter_position: Option<i64>,
    target_letter: Option<String>,
    answer_bank: Option<String>,
}

impl TryFrom<&ItemKind> for KindColumns {
    type Error = StoreError;

    fn try_from(kind: &ItemKind) -> Result<Self, StoreError> {
        Ok(match kind {
            ItemKind::Word {
                letter_position,
                target_letter,
            } => Self {
                tag: kind.tag(),
                letter_position: Some(i64::from(*letter_position)),
                target_letter: Some(target_letter.clone()),
                answer_bank: None,
            },
            ItemKind::CategoryAnswer { answer_bank } => Self {
                tag: kind.tag(),
                letter_position: None,
                target_letter: None,
                answer_bank: Some(serde_json::to_string(answer_bank).map_err(|e| {
                    StoreError::Corrupt(format!("answer bank cannot be encoded: {}", e))
                })?),
            },
        })
    }
}

fn hydrate_category(row: CategoryRow) -> Result<Category, StoreError> {
    Ok(Category {
        id: Some(row.id),
        name: row.name,
        description: row.description,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
        groups: Vec::new(),
    })
}

fn hydrate_group(row: GroupRow) -> Result<Group, StoreError> {
    Ok(Group {
        id: Some(row.id),
        category_id: row.category_id,
        name: row.name,
        description: row.description,
        difficulty_or_time_limit: row.difficulty_or_time_limit,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
        items: Vec::new(),
    })
}

fn hydrate_item(row: ItemRow) -> Result<Item, StoreError> {
    let tag = ItemKindTag::from_str(&row.kind).map_err(StoreError::Corrupt)?;
    let kind = match tag {
        ItemKindTag::Word => {
            let (Some(position), Some(target_letter)) = (row.letter_position, row.target_letter)
            else {
                return Err(StoreError::Corrupt(format!(
                    "word item {} lacks letter_position or target_letter",
                    row.id
                )));
            };
            let letter_position = u32::try_from(position).map_err(|_| {
                StoreError::Corrupt(format!("item {} has letter_position {}", row.id, position))
            })?;
            ItemKind::Word {
                letter_position,
                target_letter,
            }
        }
        ItemKindTag::CategoryAnswer => {
            let answer_bank: BTreeSet<String> = match row.answer_bank.as_deref() {
                Some(json) => serde_json::from_str(json).map_err(|e| {
                    StoreError::Corrupt(format!("item {} answer bank: {}", row.id, e))
                })?,
                None => BTreeSet::new(),
            };
            ItemKind::CategoryAnswer { answer_bank }
        }
    };

    Ok(Item {
        id: Some(row.id),
        group_id: row.group_id,
        name: row.name,
        description: row.description,
        instructions: row.instructions,
        time_limit_seconds: row.time_limit_seconds,
        case_sensitive: row.case_sensitive,
        kind,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}
