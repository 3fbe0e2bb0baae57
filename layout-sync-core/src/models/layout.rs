use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque layout payload (panel arrangement, panel configs, variables).
///
/// The engine never interprets it beyond record migrations.
pub type LayoutData = serde_json::Value;

/// Identifier of a layout, stable across the local store and the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutId(String);

impl LayoutId {
    /// Generates a fresh client-side id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LayoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for LayoutId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LayoutId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical partition (user, org, project) that isolates layouts and history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who may read and write a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutPermission {
    /// Owner only
    #[default]
    CreatorWrite,
    /// Shared with the organization, read-only to others
    OrgRead,
    /// Shared with the organization, writable by members
    OrgWrite,
}

impl LayoutPermission {
    /// Returns true for layouts visible to other members of the organization.
    pub fn is_shared(self) -> bool {
        !matches!(self, LayoutPermission::CreatorWrite)
    }
}

impl fmt::Display for LayoutPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutPermission::CreatorWrite => write!(f, "CREATOR_WRITE"),
            LayoutPermission::OrgRead => write!(f, "ORG_READ"),
            LayoutPermission::OrgWrite => write!(f, "ORG_WRITE"),
        }
    }
}

impl FromStr for LayoutPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "CREATOR_WRITE" => Ok(LayoutPermission::CreatorWrite),
            "ORG_READ" => Ok(LayoutPermission::OrgRead),
            "ORG_WRITE" => Ok(LayoutPermission::OrgWrite),
            _ => Err(format!(
                "Invalid permission '{}'. Valid values: creator-write, org-read, org-write",
                s
            )),
        }
    }
}

/// A version of the layout data together with the time it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSnapshot {
    pub data: LayoutData,
    pub saved_at: DateTime<Utc>,
}

impl LayoutSnapshot {
    pub fn new(data: LayoutData, saved_at: DateTime<Utc>) -> Self {
        Self { data, saved_at }
    }

    /// Snapshot of `data` stamped with the current time.
    pub fn now(data: LayoutData) -> Self {
        Self::new(data, Utc::now())
    }
}

/// Synchronization state of a local layout record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// Local-only, never synced
    New,
    /// Local working copy diverges from a synced baseline
    Updated,
    /// In sync with the remote
    Tracked,
    /// Deleted locally, deletion not yet propagated
    LocallyDeleted,
    /// Deleted on the remote while local edits were pending
    RemotelyDeleted,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::New => write!(f, "new"),
            SyncStatus::Updated => write!(f, "updated"),
            SyncStatus::Tracked => write!(f, "tracked"),
            SyncStatus::LocallyDeleted => write!(f, "locally-deleted"),
            SyncStatus::RemotelyDeleted => write!(f, "remotely-deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_remote_saved_at: Option<DateTime<Utc>>,
}

impl SyncInfo {
    pub fn new_local() -> Self {
        Self {
            status: SyncStatus::New,
            last_remote_saved_at: None,
        }
    }

    pub fn tracked(remote_saved_at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Tracked,
            last_remote_saved_at: Some(remote_saved_at),
        }
    }
}

/// The unit of synchronization.
///
/// `baseline` is the last version known to be persisted remotely (or locally if
/// the layout was never synced). `working` holds uncommitted local edits layered
/// over it; `None` means there are no local changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub id: LayoutId,
    pub name: String,
    pub parent: String,
    pub permission: LayoutPermission,
    pub baseline: LayoutSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working: Option<LayoutSnapshot>,
    pub sync_info: SyncInfo,
}

impl Layout {
    /// Creates a local-only layout that has never been synced.
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        permission: LayoutPermission,
        data: LayoutData,
    ) -> Self {
        Self {
            id: LayoutId::new(),
            name: name.into(),
            parent: parent.into(),
            permission,
            baseline: LayoutSnapshot::now(data),
            working: None,
            sync_info: SyncInfo::new_local(),
        }
    }

    /// Builds a tracked local record from a remote layout.
    pub fn from_remote(remote: &RemoteLayout) -> Self {
        Self {
            id: remote.id.clone(),
            name: remote.name.clone(),
            parent: remote.parent.clone(),
            permission: remote.permission,
            baseline: remote.snapshot(),
            working: None,
            sync_info: SyncInfo::tracked(remote.saved_at),
        }
    }

    pub fn has_local_changes(&self) -> bool {
        self.working.is_some()
    }

    /// The version the user currently sees: working copy if present, else baseline.
    pub fn current(&self) -> &LayoutSnapshot {
        self.working.as_ref().unwrap_or(&self.baseline)
    }

    pub fn status(&self) -> SyncStatus {
        self.sync_info.status
    }

    /// Replaces the baseline with the remote version and marks the layout in sync.
    pub fn adopt_remote(&mut self, remote: &RemoteLayout) {
        self.name = remote.name.clone();
        self.parent = remote.parent.clone();
        self.permission = remote.permission;
        self.baseline = remote.snapshot();
        self.working = None;
        self.sync_info = SyncInfo::tracked(remote.saved_at);
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Parent: {}", self.parent)?;
        writeln!(f, "Permission: {}", self.permission)?;
        writeln!(f, "Status: {}", self.sync_info.status)?;
        writeln!(f, "Saved: {}", self.baseline.saved_at.to_rfc3339())?;
        if let Some(working) = &self.working {
            writeln!(f, "Unsaved changes: {}", working.saved_at.to_rfc3339())?;
        }
        Ok(())
    }
}

/// Wire representation of a layout on the remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLayout {
    pub id: LayoutId,
    pub parent: String,
    pub name: String,
    pub permission: LayoutPermission,
    pub data: LayoutData,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub is_project_recommended: bool,
    #[serde(default)]
    pub is_record_recommended: bool,
}

impl RemoteLayout {
    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot::new(self.data.clone(), self.saved_at)
    }
}
