//! Read-only views of the local catalog cache.

use clap::{Args, ValueEnum};

use gamesync::db::CatalogStore;
use gamesync::models::{Category, Item, ItemKindTag};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// List cached game types, levels and games
#[derive(Args)]
pub struct ListCommand {
    /// Only this game type
    #[arg(long)]
    category: Option<String>,

    /// Only games of this kind (word, category-answer)
    #[arg(long)]
    kind: Option<ItemKindTag>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ListCommand {
    pub async fn run(&self, store: &dyn CatalogStore) -> Result<(), Box<dyn std::error::Error>> {
        let mut categories = match &self.category {
            Some(id) => match store.fetch_category(id).await? {
                Some(category) => vec![category],
                None => return Err(format!("Game type not found: {}", id).into()),
            },
            None => store.fetch_all_categories().await?,
        };

        if let Some(kind) = self.kind {
            let tag = kind.to_string();
            for category in &mut categories {
                for group in &mut category.groups {
                    group.items.retain(|item| item.kind.tag() == tag);
                }
            }
        }

        if categories.is_empty() {
            println!("No games cached. Run `gamesync sync` first.");
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            }
            OutputFormat::Text => {
                for category in &categories {
                    println!("{}", category);
                }
                let games: usize = categories.iter().map(Category::item_count).sum();
                println!("Total: {} game type(s), {} game(s)", categories.len(), games);
            }
        }
        Ok(())
    }
}

/// Check an answer against a cached game
#[derive(Args)]
pub struct CheckCommand {
    /// Game ID
    game_id: String,

    /// The player's answer
    answer: String,
}

impl CheckCommand {
    pub async fn run(&self, store: &dyn CatalogStore) -> Result<(), Box<dyn std::error::Error>> {
        let categories = store.fetch_all_categories().await?;
        let item = find_item(&categories, &self.game_id)
            .ok_or_else(|| format!("Game not found: {}", self.game_id))?;

        if item.check_answer(&self.answer) {
            println!("✓ '{}' is correct for {}", self.answer, item.name);
        } else {
            println!("✗ '{}' is not accepted for {}", self.answer, item.name);
        }
        Ok(())
    }
}

fn find_item<'a>(categories: &'a [Category], id: &str) -> Option<&'a Item> {
    categories
        .iter()
        .flat_map(|c| c.groups.iter())
        .find_map(|g| g.item(id))
}
