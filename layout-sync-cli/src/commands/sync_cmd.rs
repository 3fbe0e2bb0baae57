//! Sync CLI commands for synchronizing with the layouts server.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use layout_sync_core::{
    LayoutManagerEvent, SyncError, SyncGates, SyncReport, SyncScheduler, SyncTarget,
};

use crate::config::Config;
use crate::session::Session;

/// How often watch mode probes the server for connectivity changes.
const PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Keep syncing in the background until interrupted
    #[arg(long, short)]
    watch: bool,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, session: &Session, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            Some(SyncSubcommand::Status) => {
                self.status(session, config).await;
                Ok(())
            }
            None if self.watch => self.watch(session, config).await,
            None => self.sync(session, config).await,
        }
    }

    async fn sync(&self, session: &Session, config: &Config) -> Result<(), SyncCommandError> {
        if !config.sync.is_configured() {
            return Err(SyncCommandError::NotConfigured);
        }
        if !session.manager.is_online() {
            return Err(SyncCommandError::Unreachable(
                session.server_url.clone().unwrap_or_default(),
            ));
        }

        println!("Syncing with server...");
        let report = session
            .manager
            .sync_with_remote(&CancellationToken::new())
            .await?;

        if report == SyncReport::default() {
            println!("Already up to date.");
        } else {
            println!("Sync complete: {}", report);
        }
        Ok(())
    }

    async fn watch(&self, session: &Session, config: &Config) -> Result<(), SyncCommandError> {
        if !config.sync.is_configured() {
            return Err(SyncCommandError::NotConfigured);
        }

        let _events = session.manager.subscribe(|event| match event {
            LayoutManagerEvent::Changed { id } => println!("  updated {}", id),
            LayoutManagerEvent::OnlineChanged(true) => println!("Server reachable."),
            LayoutManagerEvent::OnlineChanged(false) => println!("Server unreachable, waiting..."),
            LayoutManagerEvent::ErrorChanged(Some(e)) => eprintln!("  {}", e),
            LayoutManagerEvent::ErrorChanged(None) | LayoutManagerEvent::BusyChanged(_) => {}
        });

        let gates = SyncGates {
            online: session.manager.is_online(),
            visible: true,
            logged_in: true,
        };
        let target: Arc<dyn SyncTarget> = session.manager.clone();
        let scheduler = SyncScheduler::spawn(target, config.sync.scheduler_config(), gates);

        println!(
            "Watching for changes every {}s (Ctrl-C to stop)...",
            config.sync.interval_secs
        );

        let mut probe = tokio::time::interval(PROBE_INTERVAL);
        probe.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = probe.tick() => {
                    let was_online = scheduler.gates().online;
                    let online = session.refresh_online().await;
                    scheduler.set_online(online);
                    if online && !was_online {
                        scheduler.trigger();
                    }
                }
            }
        }

        println!("Stopping...");
        scheduler.shutdown().await;
        Ok(())
    }

    async fn status(&self, session: &Session, config: &Config) {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let Some(server_url) = config.sync.server_url.as_ref() else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!("    api_key: \"your-api-key\"");
            println!();
            println!("Or set environment variables:");
            println!("  LAYOUTS_SYNC_URL");
            println!("  LAYOUTS_SYNC_API_KEY");
            return;
        };

        println!("Server:    {}", server_url);
        println!("Namespace: {}", session.manager.namespace());
        println!(
            "API key:   {}",
            if config.sync.api_key.is_some() {
                "set"
            } else {
                "missing"
            }
        );
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        if session.manager.is_online() {
            println!("Server status: ✓ connected");
        } else {
            println!("Server status: ✗ unreachable");
        }
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    Unreachable(String),
    SyncError(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync is not configured. Run 'layouts sync status' for setup instructions."
            ),
            SyncCommandError::Unreachable(url) => write!(f, "Server unreachable: {}", url),
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}
