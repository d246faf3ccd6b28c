mod catalog_cmd;
mod config_cmd;
mod sync_cmd;

pub use catalog_cmd::{CheckCommand, ListCommand};
pub use config_cmd::ConfigCommand;
pub use sync_cmd::{try_auto_sync, SyncCommand};
