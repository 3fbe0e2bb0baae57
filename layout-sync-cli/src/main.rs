use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auto_sync;
mod commands;
mod config;
mod prompt;
mod session;

use auto_sync::try_auto_sync;
use commands::{ConfigCommand, LayoutCommand, SyncCommand};
use config::Config;
use session::Session;

#[derive(Parser)]
#[command(name = "layouts")]
#[command(version)]
#[command(about = "Manage workspace layouts and keep them in sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Layout(LayoutCommand),

    /// Sync with remote server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layouts=warn,layout_sync_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for config init
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    match &cli.command {
        None => {
            println!("Use --help to see available commands");
            Ok(())
        }
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path),
        Some(command) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_with_session(command, &config))
        }
    }
}

async fn run_with_session(
    command: &Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config).await?;

    // Auto-sync BEFORE read commands
    if is_read_command(command) {
        try_auto_sync(&session, config).await;
    }

    let result = match command {
        Commands::Layout(cmd) => cmd.run(&session, config).await,
        Commands::Sync(cmd) => cmd.run(&session, config).await.map_err(Into::into),
        Commands::Config(_) => Ok(()),
    };

    // Auto-sync AFTER write commands (only if command succeeded)
    if result.is_ok() && is_write_command(command) {
        try_auto_sync(&session, config).await;
    }

    result
}

/// Returns true if the command is a read operation that should sync before execution.
fn is_read_command(cmd: &Commands) -> bool {
    matches!(cmd, Commands::Layout(l) if l.is_read())
}

/// Returns true if the command is a write operation that should sync after execution.
fn is_write_command(cmd: &Commands) -> bool {
    matches!(cmd, Commands::Layout(l) if l.is_write())
}
