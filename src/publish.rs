//! Publishes authored game content into a catalog snapshot.
//!
//! The authoring file lists game types and their levels under `structure`
//! and individual games under `games`:
//!
//! ```yaml
//! structure:
//!   - id: letters
//!     name: Letters
//!     description: Word games
//!     level_id: easy
//!     level_name: Easy
//!     level_suggested_time_limit: 60
//! games:
//!   - game_mode_id: letters
//!     level_id: easy
//!     name: Starts with A
//!     instructions: Name a word starting with A
//!     time_limit: 30
//!     letter_position: 0
//!     target_letter: a
//! ```
//!
//! Games without an id are created and get one written back into the file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Catalog, CatalogFileError, Category, Group, Item, ItemKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishSource {
    #[serde(default)]
    pub structure: Vec<StructureRow>,
    #[serde(default)]
    pub games: Vec<GameRow>,
}

/// One level of one game type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureRow {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub level_id: Option<String>,
    pub level_name: Option<String>,
    #[serde(default)]
    pub level_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_suggested_time_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub game_mode_id: Option<String>,
    pub level_id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_letter: Option<String>,
    /// Comma separated accepted answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_bank: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

/// What a publish run changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishSummary {
    pub categories_created: usize,
    pub groups_created: usize,
    pub games_created: usize,
    pub games_updated: usize,
    pub games_unchanged: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to read source '{0}': {1}")]
    Read(PathBuf, std::io::Error),
    #[error("Failed to parse source '{0}': {1}")]
    Parse(PathBuf, serde_yaml::Error),
    #[error("Failed to write source '{0}': {1}")]
    Write(PathBuf, std::io::Error),
    #[error("Failed to serialize source: {0}")]
    Serialize(serde_yaml::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogFileError),
}

/// Fields of a game row after validation.
struct GameDraft {
    category_id: String,
    group_id: String,
    name: String,
    description: String,
    instructions: String,
    time_limit: Option<f64>,
    case_sensitive: bool,
    kind: ItemKind,
}

impl GameDraft {
    fn from_row(row: &GameRow) -> Result<Self, String> {
        let category_id = required(&row.game_mode_id, "game_mode_id")?;
        let group_id = required(&row.level_id, "level_id")?;
        let name = required(&row.name, "name")?;
        let instructions = required(&row.instructions, "instructions")?;

        let kind = match (&row.answer_bank, row.letter_position, &row.target_letter) {
            (Some(bank), _, _) => ItemKind::CategoryAnswer {
                answer_bank: bank
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect::<BTreeSet<_>>(),
            },
            (None, Some(letter_position), Some(target_letter)) => ItemKind::Word {
                letter_position,
                target_letter: target_letter.clone(),
            },
            _ => return Err("answer_bank or letter_position/target_letter".to_string()),
        };

        Ok(Self {
            category_id,
            group_id,
            name,
            description: row.description.clone(),
            instructions,
            time_limit: row.time_limit,
            case_sensitive: row.case_sensitive.unwrap_or(false),
            kind,
        })
    }

    fn into_item(self, id: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Item {
        Item {
            id: Some(id),
            group_id: self.group_id,
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            time_limit_seconds: self.time_limit,
            case_sensitive: self.case_sensitive,
            kind: self.kind,
            created_at,
            updated_at,
        }
    }

    fn differs_from(&self, category_id: &str, existing: &Item) -> bool {
        self.category_id != category_id
            || self.group_id != existing.group_id
            || self.name != existing.name
            || self.description != existing.description
            || self.instructions != existing.instructions
            || self.time_limit != existing.time_limit_seconds
            || self.case_sensitive != existing.case_sensitive
            || self.kind != existing.kind
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(field.to_string()),
    }
}

/// Applies `source` to `catalog`. Returns `None` without touching anything
/// when the source has no games or no structure.
///
/// New games get an id assigned in `source` as well as in the catalog.
pub fn publish(
    source: &mut PublishSource,
    catalog: &mut Catalog,
    now: DateTime<Utc>,
) -> Option<PublishSummary> {
    if source.games.is_empty() {
        tracing::warn!("Source has no games, nothing to publish");
        return None;
    }
    if source.structure.is_empty() {
        tracing::warn!("Source has no structure, nothing to publish");
        return None;
    }

    let mut summary = PublishSummary::default();
    for (index, row) in source.structure.iter().enumerate() {
        if let Err(field) = apply_structure(row, catalog, now, &mut summary) {
            skip(&mut summary, format!("structure row {}", index + 1), &field);
        }
    }

    for (index, row) in source.games.iter_mut().enumerate() {
        let label = row
            .id
            .clone()
            .unwrap_or_else(|| format!("game row {}", index + 1));
        let draft = match GameDraft::from_row(row) {
            Ok(draft) => draft,
            Err(field) => {
                skip(&mut summary, label, &field);
                continue;
            }
        };
        if catalog
            .category(&draft.category_id)
            .and_then(|c| c.group(&draft.group_id))
            .is_none()
        {
            tracing::warn!(game = %label, level = %draft.group_id, "Level not found, skipping");
            summary.skipped.push(label);
            continue;
        }

        match row.id.clone() {
            None => {
                let id = Uuid::new_v4().to_string();
                let item = draft.into_item(id.clone(), now, now);
                place_item(catalog, item);
                tracing::info!(game = %id, "Created game");
                row.id = Some(id);
                summary.games_created += 1;
            }
            Some(id) => match take_item(catalog, &id) {
                None => {
                    tracing::warn!(game = %id, "Game not found in catalog, skipping");
                    summary.skipped.push(id);
                }
                Some((category_id, existing)) => {
                    if draft.differs_from(&category_id, &existing) {
                        let item = draft.into_item(id.clone(), existing.created_at, now);
                        place_item(catalog, item);
                        tracing::info!(game = %id, "Updated game");
                        summary.games_updated += 1;
                    } else {
                        place_item(catalog, existing);
                        summary.games_unchanged += 1;
                    }
                }
            },
        }
    }

    catalog.published_at = Some(now);
    Some(summary)
}

fn skip(summary: &mut PublishSummary, label: String, field: &str) {
    tracing::warn!(row = %label, field, "Missing required field, skipping");
    summary.skipped.push(label);
}

fn apply_structure(
    row: &StructureRow,
    catalog: &mut Catalog,
    now: DateTime<Utc>,
    summary: &mut PublishSummary,
) -> Result<(), String> {
    let category_id = required(&row.id, "id")?;
    let category_name = required(&row.name, "name")?;
    let group_id = required(&row.level_id, "level_id")?;
    let group_name = required(&row.level_name, "level_name")?;

    if catalog.category(&category_id).is_none() {
        let mut category = Category::new(category_id.clone(), category_name.clone());
        category.created_at = now;
        category.updated_at = now;
        catalog.categories.push(category);
        tracing::info!(category = %category_id, "Creating game type");
        summary.categories_created += 1;
    }
    let Some(category) = catalog.category_mut(&category_id) else {
        return Ok(());
    };
    if category.name != category_name || category.description != row.description {
        category.name = category_name;
        category.description = row.description.clone();
        category.updated_at = now;
    }

    if category.group(&group_id).is_none() {
        let mut group = Group::new(group_id.clone(), category_id.clone(), group_name.clone());
        group.created_at = now;
        group.updated_at = now;
        category.groups.push(group);
        tracing::info!(category = %category_id, level = %group_id, "Creating level");
        summary.groups_created += 1;
    }
    if let Some(group) = category.group_mut(&group_id) {
        if group.name != group_name
            || group.description != row.level_description
            || group.difficulty_or_time_limit != row.level_suggested_time_limit
        {
            group.name = group_name;
            group.description = row.level_description.clone();
            group.difficulty_or_time_limit = row.level_suggested_time_limit;
            group.updated_at = now;
        }
    }
    Ok(())
}

/// Removes the item with `id` from wherever it lives, with its category id.
fn take_item(catalog: &mut Catalog, id: &str) -> Option<(String, Item)> {
    for category in &mut catalog.categories {
        for group in &mut category.groups {
            if let Some(pos) = group.items.iter().position(|i| i.id.as_deref() == Some(id)) {
                let item = group.items.remove(pos);
                return Some((category.id_or_empty().to_string(), item));
            }
        }
    }
    None
}

fn place_item(catalog: &mut Catalog, item: Item) {
    let target = catalog.categories.iter_mut().find_map(|c| {
        c.groups
            .iter_mut()
            .find(|g| g.id.as_deref() == Some(item.group_id.as_str()))
    });
    if let Some(group) = target {
        group.items.push(item);
    }
}

/// Publishes the YAML source at `source_path` into the snapshot at
/// `catalog_path`, then writes assigned ids back into the source.
///
/// The snapshot is only rewritten once every row has been processed.
pub fn publish_files(
    source_path: &Path,
    catalog_path: &Path,
) -> Result<Option<PublishSummary>, PublishError> {
    let contents = std::fs::read_to_string(source_path)
        .map_err(|e| PublishError::Read(source_path.to_path_buf(), e))?;
    let mut source: PublishSource = serde_yaml::from_str(&contents)
        .map_err(|e| PublishError::Parse(source_path.to_path_buf(), e))?;
    let mut catalog = Catalog::load(catalog_path)?;

    let Some(summary) = publish(&mut source, &mut catalog, Utc::now()) else {
        return Ok(None);
    };

    catalog.save(catalog_path)?;
    let yaml = serde_yaml::to_string(&source).map_err(PublishError::Serialize)?;
    std::fs::write(source_path, yaml)
        .map_err(|e| PublishError::Write(source_path.to_path_buf(), e))?;

    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn structure() -> Vec<StructureRow> {
        vec![
            StructureRow {
                id: Some("letters".to_string()),
                name: Some("Letters".to_string()),
                description: "Word games".to_string(),
                level_id: Some("easy".to_string()),
                level_name: Some("Easy".to_string()),
                level_suggested_time_limit: Some(60),
                ..Default::default()
            },
            StructureRow {
                id: Some("letters".to_string()),
                name: Some("Letters".to_string()),
                description: "Word games".to_string(),
                level_id: Some("hard".to_string()),
                level_name: Some("Hard".to_string()),
                ..Default::default()
            },
        ]
    }

    fn word_game() -> GameRow {
        GameRow {
            game_mode_id: Some("letters".to_string()),
            level_id: Some("easy".to_string()),
            name: Some("Starts with A".to_string()),
            instructions: Some("Name a word starting with A".to_string()),
            time_limit: Some(30.0),
            letter_position: Some(0),
            target_letter: Some("a".to_string()),
            ..Default::default()
        }
    }

    fn answer_game() -> GameRow {
        GameRow {
            game_mode_id: Some("letters".to_string()),
            level_id: Some("hard".to_string()),
            name: Some("Fruits".to_string()),
            instructions: Some("Name a fruit".to_string()),
            answer_bank: Some("apple, pear ,plum".to_string()),
            ..Default::default()
        }
    }

    fn source() -> PublishSource {
        PublishSource {
            structure: structure(),
            games: vec![word_game(), answer_game()],
        }
    }

    #[test]
    fn test_new_games_get_ids() {
        let mut source = source();
        let mut catalog = Catalog::default();
        let now = Utc::now();

        let summary = publish(&mut source, &mut catalog, now).unwrap();

        assert_eq!(summary.categories_created, 1);
        assert_eq!(summary.groups_created, 2);
        assert_eq!(summary.games_created, 2);
        assert!(source.games.iter().all(|g| g.id.is_some()));

        let id = source.games[1].id.clone().unwrap();
        let category = catalog.category("letters").unwrap();
        let item = category.group("hard").unwrap().item(&id).unwrap();
        assert_eq!(item.created_at, now);
        assert_eq!(item.updated_at, now);
        assert_eq!(
            item.kind,
            ItemKind::CategoryAnswer {
                answer_bank: ["apple", "pear", "plum"].iter().map(|s| s.to_string()).collect()
            }
        );
        assert_eq!(category.group("easy").unwrap().difficulty_or_time_limit, Some(60));
        assert_eq!(catalog.published_at, Some(now));
    }

    #[test]
    fn test_unchanged_games_keep_timestamps() {
        let mut source = source();
        let mut catalog = Catalog::default();
        let first = Utc::now();
        publish(&mut source, &mut catalog, first).unwrap();

        let later = first + Duration::hours(1);
        let summary = publish(&mut source, &mut catalog, later).unwrap();

        assert_eq!(summary.games_created, 0);
        assert_eq!(summary.games_unchanged, 2);
        let id = source.games[0].id.clone().unwrap();
        let item = catalog.category("letters").unwrap().group("easy").unwrap().item(&id).unwrap();
        assert_eq!(item.updated_at, first);
        assert_eq!(catalog.category("letters").unwrap().updated_at, first);
    }

    #[test]
    fn test_changed_game_is_rewritten() {
        let mut source = source();
        let mut catalog = Catalog::default();
        let first = Utc::now();
        publish(&mut source, &mut catalog, first).unwrap();

        source.games[0].instructions = Some("Say a word beginning with A".to_string());
        source.games[0].level_id = Some("hard".to_string());
        let later = first + Duration::hours(1);
        let summary = publish(&mut source, &mut catalog, later).unwrap();

        assert_eq!(summary.games_updated, 1);
        assert_eq!(summary.games_unchanged, 1);
        let id = source.games[0].id.clone().unwrap();
        let category = catalog.category("letters").unwrap();
        assert!(category.group("easy").unwrap().item(&id).is_none());
        let item = category.group("hard").unwrap().item(&id).unwrap();
        assert_eq!(item.instructions, "Say a word beginning with A");
        assert_eq!(item.created_at, first);
        assert_eq!(item.updated_at, later);
    }

    #[test]
    fn test_unknown_id_and_incomplete_rows_are_skipped() {
        let mut source = source();
        source.games.push(GameRow {
            id: Some("ghost".to_string()),
            ..word_game()
        });
        source.games.push(GameRow {
            instructions: None,
            ..word_game()
        });
        source.games.push(GameRow {
            letter_position: None,
            ..word_game()
        });
        let mut catalog = Catalog::default();

        let summary = publish(&mut source, &mut catalog, Utc::now()).unwrap();

        assert_eq!(summary.games_created, 2);
        assert_eq!(summary.skipped.len(), 3);
        assert!(summary.skipped.contains(&"ghost".to_string()));
        assert!(source.games[3].id.is_none());
        assert_eq!(catalog.category("letters").unwrap().item_count(), 2);
    }

    #[test]
    fn test_game_for_unknown_level_is_skipped() {
        let mut source = source();
        source.games[0].level_id = Some("expert".to_string());
        let mut catalog = Catalog::default();

        let summary = publish(&mut source, &mut catalog, Utc::now()).unwrap();

        assert_eq!(summary.games_created, 1);
        assert_eq!(summary.skipped, vec!["game row 1".to_string()]);
    }

    #[test]
    fn test_empty_source_publishes_nothing() {
        let mut catalog = Catalog::default();

        let mut no_games = PublishSource {
            structure: structure(),
            games: Vec::new(),
        };
        assert!(publish(&mut no_games, &mut catalog, Utc::now()).is_none());

        let mut no_structure = PublishSource {
            structure: Vec::new(),
            games: vec![word_game()],
        };
        assert!(publish(&mut no_structure, &mut catalog, Utc::now()).is_none());
        assert_eq!(catalog, Catalog::default());
    }

    #[test]
    fn test_publish_files_writes_ids_back() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("games.yaml");
        let catalog_path = dir.path().join("out").join("catalog.json");
        std::fs::write(&source_path, serde_yaml::to_string(&source()).unwrap()).unwrap();

        let summary = publish_files(&source_path, &catalog_path).unwrap().unwrap();
        assert_eq!(summary.games_created, 2);

        let rewritten: PublishSource =
            serde_yaml::from_str(&std::fs::read_to_string(&source_path).unwrap()).unwrap();
        let catalog = Catalog::load(&catalog_path).unwrap();
        for game in &rewritten.games {
            let id = game.id.as_deref().unwrap();
            assert!(catalog
                .categories
                .iter()
                .flat_map(|c| c.groups.iter())
                .any(|g| g.item(id).is_some()));
        }

        // Second run with ids in place creates nothing.
        let again = publish_files(&source_path, &catalog_path).unwrap().unwrap();
        assert_eq!(again.games_created, 0);
        assert_eq!(again.games_unchanged, 2);
    }

    #[test]
    fn test_publish_files_empty_source_writes_nothing() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("games.yaml");
        let catalog_path = dir.path().join("catalog.json");
        std::fs::write(&source_path, "structure: []\ngames: []\n").unwrap();

        assert!(publish_files(&source_path, &catalog_path).unwrap().is_none());
        assert!(!catalog_path.exists());
    }
}
