//! Wires the layout manager for one CLI invocation.

use std::sync::Arc;

use layout_sync_core::{
    check_server, HttpLayoutClient, LayoutManager, LocalLayoutStore, Namespace, RemoteLayoutClient,
};

use crate::config::Config;
use crate::prompt::spawn_terminal_prompter;

/// Everything a command needs: the manager plus the server it talks to.
pub struct Session {
    pub manager: Arc<LayoutManager>,
    pub server_url: Option<String>,
}

impl Session {
    /// Opens the local store and, if sync is configured, the remote client.
    ///
    /// The manager is marked online only when the server answers its probe.
    pub async fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = LocalLayoutStore::open(&config.database_path.value).await?;

        let (remote, server_url) = match (&config.sync.server_url, &config.sync.api_key) {
            (Some(url), Some(key)) => {
                let client = HttpLayoutClient::new(url.clone(), key.clone())?;
                (
                    Some(Arc::new(client) as Arc<dyn RemoteLayoutClient>),
                    Some(url.clone()),
                )
            }
            _ => (None, None),
        };

        let manager = LayoutManager::new(
            Namespace::new(config.namespace.value.clone()),
            store,
            remote,
            Arc::new(spawn_terminal_prompter()),
        );

        let session = Self {
            manager: Arc::new(manager),
            server_url,
        };
        session.refresh_online().await;
        Ok(session)
    }

    /// Probes the server and updates the manager's connectivity flag.
    pub async fn refresh_online(&self) -> bool {
        let online = match &self.server_url {
            Some(url) => check_server(url).await,
            None => false,
        };
        self.manager.set_online(online);
        online
    }
}
