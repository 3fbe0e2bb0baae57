//! Client side of the remote layout backend.
//!
//! [`RemoteLayoutClient`] is the seam between the sync engine and the
//! network. Updates carry an `expected_saved_at` precondition; when the
//! server's copy has moved on, the update reports
//! [`UpdateOutcome::Conflict`] instead of failing.

mod http;

pub use http::{check_server, HttpLayoutClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RemoteError;
use crate::models::{Layout, LayoutData, LayoutId, LayoutPermission, Namespace, RemoteLayout};

/// Request body for creating a layout on the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRemoteLayout {
    /// Client-proposed id; the server may assign a different one.
    pub id: LayoutId,
    pub parent: String,
    pub name: String,
    pub permission: LayoutPermission,
    pub data: LayoutData,
    pub saved_at: DateTime<Utc>,
}

impl NewRemoteLayout {
    /// Describes the current version of a local layout.
    pub fn from_layout(layout: &Layout) -> Self {
        let current = layout.current();
        Self {
            id: layout.id.clone(),
            parent: layout.parent.clone(),
            name: layout.name.clone(),
            permission: layout.permission,
            data: current.data.clone(),
            saved_at: current.saved_at,
        }
    }
}

/// Partial update of a remote layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<LayoutData>,
    pub saved_at: DateTime<Utc>,
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Success(RemoteLayout),
    /// The remote copy was modified since `expected_saved_at`.
    Conflict,
}

/// Operations the sync engine needs from the remote backend.
#[async_trait]
pub trait RemoteLayoutClient: Send + Sync {
    async fn list_layouts(&self, namespace: &Namespace) -> Result<Vec<RemoteLayout>, RemoteError>;

    async fn get_layout(&self, id: &LayoutId) -> Result<Option<RemoteLayout>, RemoteError>;

    /// Fails with [`RemoteError::PermissionDenied`] when the caller may not
    /// write to the target namespace.
    async fn create_layout(
        &self,
        namespace: &Namespace,
        layout: NewRemoteLayout,
    ) -> Result<RemoteLayout, RemoteError>;

    async fn update_layout(
        &self,
        id: &LayoutId,
        expected_saved_at: DateTime<Utc>,
        patch: LayoutPatch,
    ) -> Result<UpdateOutcome, RemoteError>;

    /// Returns whether a record existed and was removed.
    async fn delete_layout(&self, id: &LayoutId) -> Result<bool, RemoteError>;
}
