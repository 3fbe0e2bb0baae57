mod history;
mod layout;

pub use history::LayoutHistory;
pub use layout::{
    Layout, LayoutData, LayoutId, LayoutPermission, LayoutSnapshot, Namespace, RemoteLayout,
    SyncInfo, SyncStatus,
};
