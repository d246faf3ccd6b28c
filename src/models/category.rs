use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::group::Group;

/// Top-level grouping of games (a game type / mode).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Some(id.into()),
            name: name.into(),
            description: String::new(),
            created_at: now,
            updated_at: now,
            groups: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds groups, re-pointing their `category_id` at this category.
    pub fn with_groups(mut self, groups: Vec<Group>) -> Self {
        let category_id = self.id_or_empty().to_string();
        self.groups = groups
            .into_iter()
            .map(|mut group| {
                group.category_id = category_id.clone();
                group
            })
            .collect();
        self
    }

    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id.as_deref() == Some(id))
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id.as_deref() == Some(id))
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.chars().count()))?;

        if !self.description.is_empty() {
            writeln!(f, "{}", self.description)?;
        }

        for group in &self.groups {
            writeln!(f, "\n  {}", group)?;
            for item in &group.items {
                writeln!(f, "    - {}", item)?;
            }
        }

        Ok(())
    }
}
