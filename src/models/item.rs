use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Gameplay behavior of an item, with the fields only that behavior needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ItemKind {
    /// Answer must carry `target_letter` at `letter_position` (0-based).
    Word {
        letter_position: u32,
        target_letter: String,
    },
    /// Answer must be one of the accepted answers.
    CategoryAnswer { answer_bank: BTreeSet<String> },
}

impl ItemKind {
    /// Tag used on the wire and in the local database.
    pub fn tag(&self) -> &'static str {
        match self {
            ItemKind::Word { .. } => "word",
            ItemKind::CategoryAnswer { .. } => "category-answer",
        }
    }
}

/// Bare kind tag, used where only the variant name is known (database rows, CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKindTag {
    Word,
    CategoryAnswer,
}

impl fmt::Display for ItemKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKindTag::Word => write!(f, "word"),
            ItemKindTag::CategoryAnswer => write!(f, "category-answer"),
        }
    }
}

impl FromStr for ItemKindTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "word" => Ok(ItemKindTag::Word),
            "category-answer" => Ok(ItemKindTag::CategoryAnswer),
            _ => Err(format!(
                "Invalid item kind '{}'. Valid options: word, category-answer",
                s
            )),
        }
    }
}

/// A single playable game, nested under a [`super::Group`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Option<String>,
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub time_limit_seconds: Option<f64>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        group_id: impl Into<String>,
        name: impl Into<String>,
        kind: ItemKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Some(id.into()),
            group_id: group_id.into(),
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            time_limit_seconds: None,
            case_sensitive: false,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn word(
        id: impl Into<String>,
        group_id: impl Into<String>,
        name: impl Into<String>,
        letter_position: u32,
        target_letter: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            group_id,
            name,
            ItemKind::Word {
                letter_position,
                target_letter: target_letter.into(),
            },
        )
    }

    pub fn category_answer<I, S>(
        id: impl Into<String>,
        group_id: impl Into<String>,
        name: impl Into<String>,
        answers: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            group_id,
            name,
            ItemKind::CategoryAnswer {
                answer_bank: answers.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_seconds = Some(seconds);
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// Checks a player's answer against this item's rules.
    pub fn check_answer(&self, answer: &str) -> bool {
        let answer = answer.trim();
        if answer.is_empty() {
            return false;
        }

        match &self.kind {
            ItemKind::Word {
                letter_position,
                target_letter,
            } => {
                let Some(actual) = answer.chars().nth(*letter_position as usize) else {
                    return false;
                };
                let mut expected = target_letter.chars();
                let (Some(expected), None) = (expected.next(), expected.next()) else {
                    return false;
                };
                if self.case_sensitive {
                    actual == expected
                } else {
                    actual.to_lowercase().eq(expected.to_lowercase())
                }
            }
            ItemKind::CategoryAnswer { answer_bank } => {
                if self.case_sensitive {
                    answer_bank.iter().any(|candidate| candidate.trim() == answer)
                } else {
                    let answer = answer.to_lowercase();
                    answer_bank
                        .iter()
                        .any(|candidate| candidate.trim().to_lowercase() == answer)
                }
            }
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.kind.tag())?;
        if let Some(limit) = self.time_limit_seconds {
            write!(f, " {}s", limit)?;
        }
        match &self.kind {
            ItemKind::Word {
                letter_position,
                target_letter,
            } => write!(f, " letter '{}' at {}", target_letter, letter_position),
            ItemKind::CategoryAnswer { answer_bank } => {
                write!(f, " {} answer(s)", answer_bank.len())
            }
        }
    }
}
