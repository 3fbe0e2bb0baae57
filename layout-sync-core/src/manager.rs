//! The layout manager: local-first CRUD plus the reconciliation pass.
//!
//! Every user edit lands in the local store first. Network round-trips never
//! run under the local write lock; once a request returns, the affected record
//! is read again and only advanced if it was not edited in the meantime.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::conflict::{detect, ConflictPrompter, ConflictResolver, Divergence, Resolution};
use crate::error::{LayoutError, RemoteError, StoreError, SyncError};
use crate::events::{LayoutManagerEvent, Listeners, Subscription};
use crate::models::{
    Layout, LayoutData, LayoutHistory, LayoutId, LayoutPermission, LayoutSnapshot, Namespace,
    RemoteLayout, SyncInfo, SyncStatus,
};
use crate::remote::{LayoutPatch, NewRemoteLayout, RemoteLayoutClient, UpdateOutcome};
use crate::scheduler::SyncTarget;
use crate::store::LocalLayoutStore;

/// How long `get_layouts` waits for the remote list before using local data only.
const REMOTE_LIST_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameters for a new layout.
#[derive(Debug, Clone)]
pub struct NewLayout {
    pub name: String,
    pub parent: String,
    pub permission: LayoutPermission,
    pub data: LayoutData,
}

/// A user edit. Fields left as `None` are unchanged.
#[derive(Debug, Clone, Default)]
pub struct LayoutUpdate {
    pub name: Option<String>,
    pub data: Option<LayoutData>,
}

/// What a sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pulled: usize,
    pub pushed: usize,
    pub created: usize,
    pub deleted: usize,
    pub conflicts: usize,
    pub skipped: usize,
    /// Another pass was already running; this call did nothing.
    pub coalesced: bool,
    /// The pass stopped early because it was cancelled.
    pub cancelled: bool,
}

impl SyncReport {
    fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Default::default()
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coalesced {
            return write!(f, "sync already in progress");
        }
        write!(
            f,
            "pulled {}, pushed {}, created {}, deleted {}, conflicts {}, skipped {}",
            self.pulled, self.pushed, self.created, self.deleted, self.conflicts, self.skipped
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Where the remote version handed to `settle` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleMode {
    /// It carries this client's own data, just written.
    Pushed,
    /// It was written elsewhere.
    Pulled,
}

/// Outcome of folding a remote version into a local record.
enum Settled {
    Applied(Layout),
    /// Left alone; the next pass decides again.
    Unchanged,
    /// No local record exists.
    Missing,
}

/// Orchestrates the local store, the remote client and conflict resolution
/// for a single namespace.
pub struct LayoutManager {
    namespace: Namespace,
    store: LocalLayoutStore,
    remote: Option<Arc<dyn RemoteLayoutClient>>,
    resolver: ConflictResolver,
    listeners: Listeners,
    online: AtomicBool,
    busy: AtomicBool,
    last_error: Mutex<Option<String>>,
    /// Serializes read-modify-write cycles on local records.
    write_lock: tokio::sync::Mutex<()>,
}

impl LayoutManager {
    /// Creates a manager. It starts offline; hosts call [`set_online`] once
    /// they know the connectivity state.
    ///
    /// [`set_online`]: LayoutManager::set_online
    pub fn new(
        namespace: Namespace,
        store: LocalLayoutStore,
        remote: Option<Arc<dyn RemoteLayoutClient>>,
        prompter: Arc<dyn ConflictPrompter>,
    ) -> Self {
        Self {
            namespace,
            store,
            remote,
            resolver: ConflictResolver::new(prompter),
            listeners: Listeners::new(),
            online: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            last_error: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LayoutManagerEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::AcqRel) != online {
            tracing::info!(online, "Connectivity changed");
            self.listeners.emit(LayoutManagerEvent::OnlineChanged(online));
        }
    }

    /// Whether a sync pass is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The error of the last failed sync pass, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Shared layouts need a remote backend.
    pub fn supports_sharing(&self) -> bool {
        self.remote.is_some()
    }

    fn set_last_error(&self, error: Option<String>) {
        let changed = match self.last_error.lock() {
            Ok(mut current) if *current != error => {
                *current = error.clone();
                true
            }
            _ => false,
        };
        if changed {
            self.listeners.emit(LayoutManagerEvent::ErrorChanged(error));
        }
    }

    fn emit_changed(&self, id: &LayoutId) {
        self.listeners
            .emit(LayoutManagerEvent::Changed { id: id.clone() });
    }

    fn online_remote(&self) -> Option<Arc<dyn RemoteLayoutClient>> {
        if self.is_online() {
            self.remote.clone()
        } else {
            None
        }
    }

    /// All visible layouts, sorted by name.
    ///
    /// When online, layouts that exist only remotely are pulled in. The remote
    /// request is bounded by a short timeout; any failure falls back to the
    /// local view.
    pub async fn get_layouts(&self) -> Result<Vec<Layout>, LayoutError> {
        let local = self.store.list(&self.namespace).await?;
        let known: HashSet<LayoutId> = local.iter().map(|l| l.id.clone()).collect();
        let mut layouts: Vec<Layout> = local
            .into_iter()
            .filter(|l| l.status() != SyncStatus::LocallyDeleted)
            .collect();

        if let Some(remote) = self.online_remote() {
            match tokio::time::timeout(REMOTE_LIST_TIMEOUT, remote.list_layouts(&self.namespace))
                .await
            {
                Ok(Ok(remote_layouts)) => {
                    for remote_layout in remote_layouts {
                        if known.contains(&remote_layout.id) {
                            continue;
                        }
                        if let Some(layout) = self.pull_new(&remote_layout).await? {
                            layouts.push(layout);
                        }
                    }
                }
                Ok(Err(e)) => tracing::debug!("Using local layouts only: {}", e),
                Err(_) => tracing::debug!("Using local layouts only: remote list timed out"),
            }
        }

        layouts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(layouts)
    }

    /// Local read. Never touches the network.
    pub async fn get_layout(&self, id: &LayoutId) -> Result<Option<Layout>, LayoutError> {
        Ok(self
            .store
            .get(&self.namespace, id)
            .await?
            .filter(|l| l.status() != SyncStatus::LocallyDeleted))
    }

    async fn require_layout(&self, id: &LayoutId) -> Result<Layout, LayoutError> {
        self.get_layout(id)
            .await?
            .ok_or_else(|| LayoutError::NotFound(id.clone()))
    }

    /// Stores a new layout locally, then tries to create it remotely.
    ///
    /// A network failure keeps the layout as `new` for the next sync pass.
    /// A permission failure removes it again and is returned to the caller.
    pub async fn save_new_layout(&self, params: NewLayout) -> Result<Layout, LayoutError> {
        if params.permission.is_shared() && self.online_remote().is_none() {
            return Err(LayoutError::SharingRequiresOnline);
        }

        let layout = Layout::new(params.name, params.parent, params.permission, params.data);
        self.publish_new(layout).await
    }

    /// Copies a layout's current data into a new personal layout.
    pub async fn make_personal_copy(
        &self,
        id: &LayoutId,
        name: impl Into<String>,
    ) -> Result<Layout, LayoutError> {
        let source = self.require_layout(id).await?;
        let copy = Layout::new(
            name,
            source.parent.clone(),
            LayoutPermission::CreatorWrite,
            source.current().data.clone(),
        );
        self.publish_new(copy).await
    }

    async fn publish_new(&self, layout: Layout) -> Result<Layout, LayoutError> {
        {
            let _guard = self.write_lock.lock().await;
            self.store.put(&self.namespace, &layout).await?;
        }
        self.emit_changed(&layout.id);
        tracing::debug!(id = %layout.id, name = %layout.name, "Saved new layout");

        let Some(remote) = self.online_remote() else {
            return Ok(layout);
        };

        match remote
            .create_layout(&self.namespace, NewRemoteLayout::from_layout(&layout))
            .await
        {
            Ok(created) => {
                let settled = self.settle_created(&layout, &created).await?;
                Ok(settled.unwrap_or(layout))
            }
            Err(RemoteError::PermissionDenied(msg)) => {
                self.remove_local(&layout.id).await?;
                Err(LayoutError::PermissionDenied(msg))
            }
            Err(e) => {
                tracing::warn!(id = %layout.id, "Layout saved locally, will retry on next sync: {}", e);
                Ok(layout)
            }
        }
    }

    /// Records a local edit as the working copy.
    pub async fn update_layout(
        &self,
        id: &LayoutId,
        update: LayoutUpdate,
    ) -> Result<Layout, LayoutError> {
        let layout = {
            let _guard = self.write_lock.lock().await;
            let mut layout = self.require_layout(id).await?;

            if let Some(name) = update.name {
                layout.name = name;
            }
            let data = update
                .data
                .unwrap_or_else(|| layout.current().data.clone());
            layout.working = Some(LayoutSnapshot::now(data));
            if layout.status() == SyncStatus::Tracked {
                layout.sync_info.status = SyncStatus::Updated;
            }

            self.store.put(&self.namespace, &layout).await?
        };

        self.emit_changed(id);
        Ok(layout)
    }

    /// Deletes a layout.
    ///
    /// Layouts that never reached the server (or are already gone there) are
    /// removed at once. Synced layouts are marked and removed by the next pass.
    pub async fn delete_layout(&self, id: &LayoutId) -> Result<(), LayoutError> {
        {
            let _guard = self.write_lock.lock().await;
            let mut layout = self.require_layout(id).await?;

            match layout.status() {
                SyncStatus::New | SyncStatus::RemotelyDeleted => {
                    self.store.delete(&self.namespace, id).await?;
                }
                _ => {
                    layout.sync_info.status = SyncStatus::LocallyDeleted;
                    self.store.put(&self.namespace, &layout).await?;
                }
            }
        }

        self.emit_changed(id);
        Ok(())
    }

    /// Drops local edits.
    ///
    /// Returns `None` when the layout was removed, which happens for layouts
    /// already deleted on the server.
    pub async fn revert_layout(&self, id: &LayoutId) -> Result<Option<Layout>, LayoutError> {
        let reverted = {
            let _guard = self.write_lock.lock().await;
            let mut layout = self.require_layout(id).await?;

            if layout.status() == SyncStatus::RemotelyDeleted {
                self.store.delete(&self.namespace, id).await?;
                None
            } else {
                layout.working = None;
                if layout.status() == SyncStatus::Updated {
                    layout.sync_info.status = SyncStatus::Tracked;
                }
                Some(self.store.put(&self.namespace, &layout).await?)
            }
        };

        self.emit_changed(id);
        Ok(reverted)
    }

    /// Remembers `id` as the last layout used for its parent.
    pub async fn select_layout(&self, id: &LayoutId) -> Result<LayoutHistory, LayoutError> {
        let layout = self.require_layout(id).await?;
        let history = LayoutHistory::new(layout.parent, layout.id);
        Ok(self.store.put_history(&self.namespace, &history).await?)
    }

    /// The layout last selected for `parent`, if it still exists.
    pub async fn last_selected_layout(&self, parent: &str) -> Result<Option<Layout>, LayoutError> {
        match self.store.get_history(&self.namespace, parent).await? {
            Some(history) => self.get_layout(&history.layout_id).await,
            None => Ok(None),
        }
    }

    /// Reconciles the local store with the remote backend.
    ///
    /// Does nothing when offline or without a remote. A call made while
    /// another pass is running returns at once with `coalesced` set.
    /// `cancel` is checked before each layout, so every layout ends the pass
    /// either fully reconciled or untouched.
    pub async fn sync_with_remote(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let Some(remote) = self.online_remote() else {
            tracing::debug!("Skipping sync: offline or no remote configured");
            return Ok(SyncReport::default());
        };

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync already in progress");
            return Ok(SyncReport::coalesced());
        }
        let _busy = BusyGuard::new(self);

        let result = self.run_sync(remote.as_ref(), cancel).await;
        match &result {
            Ok(report) => {
                tracing::info!(namespace = %self.namespace, "Sync complete: {}", report);
                self.set_last_error(None);
            }
            Err(e) => {
                tracing::warn!(namespace = %self.namespace, "{}", e);
                self.set_last_error(Some(e.to_string()));
            }
        }
        result
    }

    async fn run_sync(
        &self,
        remote: &dyn RemoteLayoutClient,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let mut remote_layouts: BTreeMap<LayoutId, RemoteLayout> = remote
            .list_layouts(&self.namespace)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let locals = self.store.list(&self.namespace).await?;

        let mut report = SyncReport::default();
        let mut network_error = None;

        for local in locals {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let remote_copy = remote_layouts.remove(&local.id);
            let id = local.id.clone();
            match self
                .sync_layout(remote, local, remote_copy, cancel, &mut report)
                .await
            {
                Ok(()) => {}
                Err(SyncError::Remote(e)) if e.is_retryable() => {
                    tracing::warn!(id = %id, "Layout not synced: {}", e);
                    network_error.get_or_insert(e);
                }
                Err(SyncError::Remote(e)) => {
                    tracing::warn!(id = %id, "Skipping layout: {}", e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if !report.cancelled {
            for remote_layout in remote_layouts.into_values() {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                if self.pull_new(&remote_layout).await?.is_some() {
                    report.pulled += 1;
                }
            }
        }

        match network_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    async fn sync_layout(
        &self,
        remote: &dyn RemoteLayoutClient,
        local: Layout,
        remote_copy: Option<RemoteLayout>,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let status = local.status();
        let Some(remote_copy) = remote_copy else {
            match status {
                SyncStatus::New => {
                    let created = remote
                        .create_layout(&self.namespace, NewRemoteLayout::from_layout(&local))
                        .await?;
                    self.settle_created(&local, &created).await?;
                    tracing::debug!(id = %local.id, "Created remotely");
                    report.created += 1;
                }
                SyncStatus::LocallyDeleted => {
                    self.remove_local(&local.id).await?;
                    report.deleted += 1;
                }
                // Stays until the user discards or forks it.
                SyncStatus::RemotelyDeleted => {}
                SyncStatus::Tracked | SyncStatus::Updated => {
                    if self.apply_remote_deletion(&local.id).await? {
                        report.deleted += 1;
                    }
                }
            }
            return Ok(());
        };

        if status == SyncStatus::LocallyDeleted {
            remote.delete_layout(&local.id).await?;
            self.remove_local(&local.id).await?;
            tracing::debug!(id = %local.id, "Deleted remotely");
            report.deleted += 1;
            return Ok(());
        }

        match detect(&local, &remote_copy) {
            Divergence::InSync => {
                // A create whose response was lost shows up as `new`.
                if status != SyncStatus::Tracked && !local.has_local_changes() {
                    self.settle(
                        &local.id,
                        local.current().saved_at,
                        &remote_copy,
                        SettleMode::Pulled,
                    )
                    .await?;
                }
            }
            Divergence::PullRemote => {
                let settled = self
                    .settle(
                        &local.id,
                        local.current().saved_at,
                        &remote_copy,
                        SettleMode::Pulled,
                    )
                    .await?;
                if let Settled::Applied(_) = settled {
                    tracing::debug!(id = %local.id, "Pulled remote version");
                    report.pulled += 1;
                }
            }
            Divergence::PushLocal => {
                self.push(remote, &local, cancel, report).await?;
            }
            Divergence::Conflict => {
                self.resolve_conflict(remote, &local, remote_copy, cancel, report)
                    .await?;
            }
        }
        Ok(())
    }

    async fn push(
        &self,
        remote: &dyn RemoteLayoutClient,
        local: &Layout,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let Some(working) = &local.working else {
            return Ok(());
        };

        let patch = LayoutPatch {
            name: Some(local.name.clone()),
            data: Some(working.data.clone()),
            saved_at: working.saved_at,
        };

        match remote
            .update_layout(&local.id, local.baseline.saved_at, patch)
            .await?
        {
            UpdateOutcome::Success(updated) => {
                self.settle(&local.id, working.saved_at, &updated, SettleMode::Pushed)
                    .await?;
                tracing::debug!(id = %local.id, "Pushed local changes");
                report.pushed += 1;
            }
            UpdateOutcome::Conflict => match remote.get_layout(&local.id).await? {
                Some(fresh) => {
                    self.resolve_conflict(remote, local, fresh, cancel, report)
                        .await?;
                }
                None => {
                    self.apply_remote_deletion(&local.id).await?;
                }
            },
        }
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        remote: &dyn RemoteLayoutClient,
        local: &Layout,
        mut remote_copy: RemoteLayout,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        report.conflicts += 1;
        let observed = local.current().saved_at;

        loop {
            let resolution = self.resolver.resolve(local, &remote_copy).await;
            tracing::debug!(id = %local.id, ?resolution, "Conflict resolved");

            match resolution {
                Resolution::Cancel => return Ok(()),
                Resolution::Discard => {
                    let settled = self
                        .settle(&local.id, observed, &remote_copy, SettleMode::Pulled)
                        .await?;
                    if let Settled::Applied(_) = settled {
                        report.pulled += 1;
                    }
                    return Ok(());
                }
                Resolution::Fork { name } => {
                    let copy = Layout::new(
                        name,
                        local.parent.clone(),
                        LayoutPermission::CreatorWrite,
                        local.current().data.clone(),
                    );
                    {
                        let _guard = self.write_lock.lock().await;
                        self.store.put(&self.namespace, &copy).await?;
                    }
                    self.emit_changed(&copy.id);

                    // The edits live on in the copy; the original follows the server.
                    let settled = self
                        .settle(&local.id, observed, &remote_copy, SettleMode::Pulled)
                        .await?;
                    if let Settled::Applied(_) = settled {
                        report.pulled += 1;
                    }

                    let created = remote
                        .create_layout(&self.namespace, NewRemoteLayout::from_layout(&copy))
                        .await?;
                    self.settle_created(&copy, &created).await?;
                    report.created += 1;
                    return Ok(());
                }
                Resolution::Overwrite => {
                    let patch = LayoutPatch {
                        name: Some(local.name.clone()),
                        data: Some(local.current().data.clone()),
                        saved_at: Utc::now(),
                    };
                    match remote
                        .update_layout(&local.id, remote_copy.saved_at, patch)
                        .await?
                    {
                        UpdateOutcome::Success(updated) => {
                            self.settle(&local.id, observed, &updated, SettleMode::Pushed)
                                .await?;
                            report.pushed += 1;
                            return Ok(());
                        }
                        UpdateOutcome::Conflict => {
                            // Someone saved again in the meantime; ask again.
                            match remote.get_layout(&local.id).await? {
                                Some(fresh) if !cancel.is_cancelled() => remote_copy = fresh,
                                Some(_) => return Ok(()),
                                None => {
                                    self.apply_remote_deletion(&local.id).await?;
                                    return Ok(());
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Folds a remote version into the local record.
    ///
    /// `observed` is the local `current().saved_at` read before the request.
    /// If the record was edited since and `remote` holds data this client
    /// pushed, the newer working copy is kept on top of the new baseline and
    /// the layout stays `updated`. If `remote` was written elsewhere, the
    /// edited record is left untouched so the next pass sees the conflict.
    async fn settle(
        &self,
        id: &LayoutId,
        observed: DateTime<Utc>,
        remote: &RemoteLayout,
        mode: SettleMode,
    ) -> Result<Settled, StoreError> {
        let layout = {
            let _guard = self.write_lock.lock().await;
            let Some(mut layout) = self.store.get(&self.namespace, id).await? else {
                return Ok(Settled::Missing);
            };
            if layout.status() == SyncStatus::LocallyDeleted {
                return Ok(Settled::Unchanged);
            }

            let edited = layout.working.is_some() && layout.current().saved_at != observed;
            if !edited {
                layout.adopt_remote(remote);
            } else if mode == SettleMode::Pulled {
                tracing::debug!(id = %id, "Layout edited during sync, leaving it for the next pass");
                return Ok(Settled::Unchanged);
            } else {
                tracing::debug!(id = %id, "Keeping local edits made during sync");
                layout.baseline = remote.snapshot();
                layout.sync_info = SyncInfo {
                    status: SyncStatus::Updated,
                    last_remote_saved_at: Some(remote.saved_at),
                };
            }

            // The server is authoritative for ids.
            if remote.id != *id {
                self.store.delete(&self.namespace, id).await?;
                layout.id = remote.id.clone();
            }
            self.store.put(&self.namespace, &layout).await?
        };

        if layout.id != *id {
            self.emit_changed(id);
        }
        self.emit_changed(&layout.id);
        Ok(Settled::Applied(layout))
    }

    /// Settles a freshly created layout. If it was deleted locally while the
    /// request was in flight, a tombstone makes the next pass delete it remotely.
    async fn settle_created(
        &self,
        sent: &Layout,
        created: &RemoteLayout,
    ) -> Result<Option<Layout>, StoreError> {
        match self
            .settle(&sent.id, sent.current().saved_at, created, SettleMode::Pushed)
            .await?
        {
            Settled::Applied(layout) => return Ok(Some(layout)),
            Settled::Unchanged => return Ok(None),
            Settled::Missing => {}
        }

        let mut tombstone = Layout::from_remote(created);
        tombstone.sync_info.status = SyncStatus::LocallyDeleted;
        let _guard = self.write_lock.lock().await;
        self.store.put(&self.namespace, &tombstone).await?;
        Ok(None)
    }

    /// Handles a layout that no longer exists remotely. Local edits are kept
    /// as `remotely-deleted`; otherwise the record is removed.
    ///
    /// Returns whether the record was removed.
    async fn apply_remote_deletion(&self, id: &LayoutId) -> Result<bool, StoreError> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let Some(mut layout) = self.store.get(&self.namespace, id).await? else {
                return Ok(false);
            };

            if layout.has_local_changes() && layout.status() != SyncStatus::LocallyDeleted {
                tracing::debug!(id = %id, "Layout deleted remotely, keeping local edits");
                layout.sync_info.status = SyncStatus::RemotelyDeleted;
                self.store.put(&self.namespace, &layout).await?;
                false
            } else {
                self.store.delete(&self.namespace, id).await?;
                true
            }
        };

        self.emit_changed(id);
        Ok(removed)
    }

    /// Stores a remote-only layout as tracked unless a local record appeared
    /// meanwhile.
    async fn pull_new(&self, remote: &RemoteLayout) -> Result<Option<Layout>, StoreError> {
        let layout = {
            let _guard = self.write_lock.lock().await;
            if self.store.get(&self.namespace, &remote.id).await?.is_some() {
                return Ok(None);
            }
            self.store
                .put(&self.namespace, &Layout::from_remote(remote))
                .await?
        };

        self.emit_changed(&layout.id);
        Ok(Some(layout))
    }

    async fn remove_local(&self, id: &LayoutId) -> Result<(), StoreError> {
        {
            let _guard = self.write_lock.lock().await;
            self.store.delete(&self.namespace, id).await?;
        }
        self.emit_changed(id);
        Ok(())
    }
}

#[async_trait]
impl SyncTarget for LayoutManager {
    async fn sync(&self, cancel: CancellationToken) -> Result<(), SyncError> {
        self.sync_with_remote(&cancel).await.map(|_| ())
    }
}

/// Marks the manager busy for the lifetime of a sync pass.
struct BusyGuard<'a> {
    manager: &'a LayoutManager,
}

impl<'a> BusyGuard<'a> {
    fn new(manager: &'a LayoutManager) -> Self {
        manager.listeners.emit(LayoutManagerEvent::BusyChanged(true));
        Self { manager }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.manager.busy.store(false, Ordering::Release);
        self.manager
            .listeners
            .emit(LayoutManagerEvent::BusyChanged(false));
    }
}
