use clap::{Args, Subcommand};

use super::catalog_cmd::OutputFormat;
use gamesync::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("state_path: {}", config.state_path.value.display());
                        println!("  source: {}", config.state_path.source);
                        println!();

                        println!(
                            "remote.url: {}",
                            config.remote.url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "remote.catalog_path: {}",
                            config
                                .remote
                                .catalog_path
                                .as_ref()
                                .map(|p| p.display().to_string())
                                .unwrap_or_else(|| "(not set)".to_string())
                        );
                        println!(
                            "remote.api_key: {}",
                            if config.remote.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!();

                        println!("sync.auto_sync: {}", config.sync.auto_sync);
                        println!("sync.fetch_timeout_secs: {}", config.sync.fetch_timeout_secs);
                        println!(
                            "sync.max_concurrent_fetches: {}",
                            config.sync.max_concurrent_fetches
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
