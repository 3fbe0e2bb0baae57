//! Error types for the layout sync engine.

use thiserror::Error;

use crate::models::LayoutId;

/// Errors raised by the local layout store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to serialize layout {0}: {1}")]
    Serialize(LayoutId, serde_json::Error),
    #[error("Cannot migrate record: {0}")]
    Unmigratable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a remote layout client.
///
/// A failed optimistic-concurrency precondition is not an error; it is
/// reported as [`crate::remote::UpdateOutcome::Conflict`].
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Timeouts, 5xx responses and connectivity loss.
    #[error("Network error: {0}")]
    Network(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Layout not found on server: {0}")]
    NotFound(LayoutId),
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Whether the operation may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::InvalidResponse(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

/// Caller-facing errors of layout manager operations.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Layout not found: {0}")]
    NotFound(LayoutId),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Sharing a layout requires being online")]
    SharingRequiresOnline,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(RemoteError),
}

impl From<RemoteError> for LayoutError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::PermissionDenied(msg) => LayoutError::PermissionDenied(msg),
            other => LayoutError::Remote(other),
        }
    }
}

/// Errors that end a sync pass and count as a scheduler failure.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("Sync failed: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(RemoteError::Network("timeout".to_string()).is_retryable());
        assert!(!RemoteError::PermissionDenied("read-only".to_string()).is_retryable());
        assert!(!RemoteError::NotFound(LayoutId::from("L1")).is_retryable());
        assert!(!RemoteError::InvalidResponse("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_permission_error_surfaces_as_layout_error() {
        let err: LayoutError = RemoteError::PermissionDenied("read-only".to_string()).into();
        assert!(matches!(err, LayoutError::PermissionDenied(_)));

        let err: LayoutError = RemoteError::Network("down".to_string()).into();
        assert!(matches!(err, LayoutError::Remote(RemoteError::Network(_))));
    }
}
