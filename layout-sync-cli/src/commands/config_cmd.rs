use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::OutputFormat;
use crate::config::Config;

const DEFAULT_CONFIG: &str = r#"# layouts configuration

# Path to SQLite database (default: ~/.local/share/layouts/layouts.db)
# database_path: ~/.local/share/layouts/layouts.db

# Namespace (user or organization) the layouts belong to
namespace: default

# Parent used for new layouts and `layouts last`
parent: default

# Sync with a layouts server
# sync:
#   server_url: "http://localhost:8080"
#   api_key: "your-api-key"
#   auto_sync: false
#   interval_secs: 30
#   max_interval_secs: 180
"#;

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

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
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
                                cli_config_path
                                    .unwrap_or_else(Config::default_config_path)
                                    .display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("namespace: {}", config.namespace.value);
                        println!("  source: {}", config.namespace.source);
                        println!();

                        println!("parent: {}", config.parent.value);
                        println!("  source: {}", config.parent.source);
                        println!();

                        match &config.sync.server_url {
                            Some(url) => println!("sync.server_url: {}", url),
                            None => println!("sync.server_url: (not set)"),
                        }
                        println!("sync.auto_sync: {}", config.sync.auto_sync);
                        println!("sync.interval_secs: {}", config.sync.interval_secs);
                        println!("sync.max_interval_secs: {}", config.sync.max_interval_secs);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'layouts config show' to view current configuration.");
                    return Ok(());
                }

                write_default_config(&config_path)?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn write_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(DEFAULT_CONFIG.as_bytes())
}
