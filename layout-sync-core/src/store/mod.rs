//! On-device persistence for layouts.
//!
//! # Storage Layout
//!
//! ```text
//! layouts.db
//! ├── layouts          (namespace, parent, id) -> versioned JSON record
//! └── layout_history   (namespace, parent)     -> last selected layout id
//! ```

mod local;
pub mod migration;

pub use local::LocalLayoutStore;
pub use migration::{migrate, CURRENT_RECORD_VERSION};
