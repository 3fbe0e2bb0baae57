//! Layout Sync Core Library
//!
//! Keeps workspace layouts consistent between an on-device SQLite cache and a
//! remote layouts service. Edits are local-first; a periodic reconciliation
//! pass pushes them, pulls remote changes and routes genuine edit conflicts
//! to the user.

pub mod conflict;
pub mod error;
pub mod events;
pub mod manager;
pub mod models;
pub mod remote;
pub mod scheduler;
pub mod store;

pub use conflict::{
    ChannelPrompter, ConflictOption, ConflictPrompt, ConflictPrompter, ConflictResolver,
    ConflictState, PromptRequest, Resolution,
};
pub use error::{LayoutError, RemoteError, StoreError, SyncError};
pub use events::{LayoutManagerEvent, Subscription};
pub use manager::{LayoutManager, LayoutUpdate, NewLayout, SyncReport};
pub use models::{
    Layout, LayoutData, LayoutHistory, LayoutId, LayoutPermission, LayoutSnapshot, Namespace,
    RemoteLayout, SyncInfo, SyncStatus,
};
pub use remote::{check_server, HttpLayoutClient, RemoteLayoutClient, UpdateOutcome};
pub use scheduler::{SchedulerConfig, SyncGates, SyncScheduler, SyncTarget};
pub use store::LocalLayoutStore;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
