use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::Item;

/// A level of a game type. Owns its items; refers to its category by id only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Option<String>,
    pub category_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub difficulty_or_time_limit: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Group {
    pub fn new(
        id: impl Into<String>,
        category_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Some(id.into()),
            category_id: category_id.into(),
            name: name.into(),
            description: String::new(),
            difficulty_or_time_limit: None,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_difficulty(mut self, value: i64) -> Self {
        self.difficulty_or_time_limit = Some(value);
        self
    }

    /// Adds items, re-pointing their `group_id` at this group.
    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        let group_id = self.id_or_empty().to_string();
        self.items = items
            .into_iter()
            .map(|mut item| {
                item.group_id = group_id.clone();
                item
            })
            .collect();
        self
    }

    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id.as_deref() == Some(id))
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(limit) = self.difficulty_or_time_limit {
            write!(f, " (limit {})", limit)?;
        }
        write!(f, " - {} game(s)", self.items.len())
    }
}
