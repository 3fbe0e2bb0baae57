//! Best-effort sync around regular commands.
//!
//! Failures never fail the command; the local store stays authoritative
//! until the next successful pass.

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::session::Session;

/// Runs one sync pass if auto-sync is enabled and the server is reachable.
pub async fn try_auto_sync(session: &Session, config: &Config) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }

    if !session.manager.is_online() {
        eprintln!("Auto-sync: server unreachable, skipping");
        return;
    }

    match session
        .manager
        .sync_with_remote(&CancellationToken::new())
        .await
    {
        Ok(report) => tracing::debug!(%report, "Auto-sync finished"),
        Err(e) => eprintln!("Auto-sync: {}", e),
    }
}
