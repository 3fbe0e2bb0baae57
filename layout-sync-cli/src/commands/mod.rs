mod config_cmd;
mod layout;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use layout::{LayoutCommand, OutputFormat};
pub use sync_cmd::SyncCommand;
