use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::layout::LayoutId;

/// The most recently selected layout for a parent, used to restore the
/// user's workspace on startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutHistory {
    pub parent: String,
    pub layout_id: LayoutId,
    pub selected_at: DateTime<Utc>,
}

impl LayoutHistory {
    pub fn new(parent: impl Into<String>, layout_id: LayoutId) -> Self {
        Self {
            parent: parent.into(),
            layout_id,
            selected_at: Utc::now(),
        }
    }
}
