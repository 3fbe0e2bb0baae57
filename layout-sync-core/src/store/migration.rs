//! Versioned upgrade chain for layout records written by older engine versions.
//!
//! Every stored record carries a version tag. Reading a record applies each
//! upgrade step from its version up to [`CURRENT_RECORD_VERSION`] in order.
//! Steps are pure `Value -> Value` functions.
//!
//! # Versions
//!
//! - **v0**: flat record with the layout payload in `data` (or `state`), no
//!   baseline/working split, optional `permission` and `syncInfo`.
//! - **v1**: `baseline`/`working` snapshots; payloads still carry flat
//!   sidebar keys (`leftSidebarOpen`, ...) and `savedProps`.
//! - **v2**: sidebar state consolidated under `workspace.sidebars`, panel
//!   configs under `configById`.

use serde_json::{json, Map, Value};

use crate::error::StoreError;
use crate::models::{Layout, LayoutId};

pub const CURRENT_RECORD_VERSION: i64 = 2;

const EPOCH: &str = "1970-01-01T00:00:00Z";

type Upgrade = fn(Value) -> Result<Value, StoreError>;

/// Upgrade steps; index `n` upgrades a record from version `n` to `n + 1`.
const UPGRADES: [Upgrade; CURRENT_RECORD_VERSION as usize] = [upgrade_v0_to_v1, upgrade_v1_to_v2];

/// Upgrades a raw record from `version` to the current version.
pub fn upgrade_record(mut record: Value, version: i64) -> Result<Value, StoreError> {
    if version < 0 || version > CURRENT_RECORD_VERSION {
        return Err(StoreError::Unmigratable(format!(
            "unsupported record version {}",
            version
        )));
    }
    for upgrade in &UPGRADES[version as usize..] {
        record = upgrade(record)?;
    }
    Ok(record)
}

/// Parses a stored record of any supported version into a [`Layout`].
pub fn migrate(version: i64, raw: &str) -> Result<Layout, StoreError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| StoreError::Unmigratable(format!("invalid JSON: {}", e)))?;
    let upgraded = upgrade_record(value, version)?;
    serde_json::from_value(upgraded)
        .map_err(|e| StoreError::Unmigratable(format!("invalid layout record: {}", e)))
}

/// Serializes a layout as a record of the current version.
pub fn serialize(layout: &Layout) -> Result<String, StoreError> {
    serde_json::to_string(layout).map_err(|e| StoreError::Serialize(layout.id.clone(), e))
}

fn as_object(record: &mut Value) -> Result<&mut Map<String, Value>, StoreError> {
    record
        .as_object_mut()
        .ok_or_else(|| StoreError::Unmigratable("record is not an object".to_string()))
}

fn upgrade_v0_to_v1(mut record: Value) -> Result<Value, StoreError> {
    let obj = as_object(&mut record)?;

    match obj.get("id") {
        Some(Value::String(id)) if !id.is_empty() => {}
        _ => return Err(StoreError::Unmigratable("record has no id".to_string())),
    }

    if !obj.contains_key("baseline") {
        let data = obj
            .remove("data")
            .or_else(|| obj.remove("state"))
            .ok_or_else(|| StoreError::Unmigratable("record has no layout data".to_string()))?;
        let saved_at = obj
            .remove("savedAt")
            .or_else(|| obj.remove("updatedAt"))
            .filter(Value::is_string)
            .unwrap_or_else(|| json!(EPOCH));
        obj.insert(
            "baseline".to_string(),
            json!({ "data": data, "savedAt": saved_at }),
        );
    }

    obj.remove("path");
    obj.entry("name").or_insert_with(|| json!("Unnamed layout"));
    obj.entry("parent").or_insert_with(|| json!(""));
    obj.entry("permission")
        .or_insert_with(|| json!("CREATOR_WRITE"));
    obj.entry("syncInfo")
        .or_insert_with(|| json!({ "status": "new" }));

    Ok(record)
}

fn upgrade_v1_to_v2(mut record: Value) -> Result<Value, StoreError> {
    let obj = as_object(&mut record)?;

    for key in ["baseline", "working"] {
        if let Some(Value::Object(snapshot)) = obj.get_mut(key) {
            if let Some(data) = snapshot.get_mut("data") {
                consolidate_workspace(data);
            }
        }
    }

    Ok(record)
}

/// Moves flat sidebar keys into `workspace.sidebars.{left,right}` and renames
/// `savedProps` to `configById`.
fn consolidate_workspace(data: &mut Value) {
    let Some(obj) = data.as_object_mut() else {
        return;
    };

    if let Some(props) = obj.remove("savedProps") {
        obj.entry("configById").or_insert(props);
    }

    for side in ["left", "right"] {
        let fields: Vec<(&str, Value)> = [("open", "Open"), ("item", "Item"), ("size", "Size")]
            .into_iter()
            .filter_map(|(field, suffix)| {
                obj.remove(&format!("{}Sidebar{}", side, suffix))
                    .map(|value| (field, value))
            })
            .collect();

        if fields.is_empty() {
            continue;
        }

        let workspace = obj.entry("workspace").or_insert(Value::Null);
        if !(workspace.is_object() || workspace.is_null()) {
            *workspace = Value::Null;
        }
        if !matches!(workspace["sidebars"], Value::Object(_) | Value::Null) {
            workspace["sidebars"] = Value::Null;
        }
        let sidebar = &mut workspace["sidebars"][side];
        if !(sidebar.is_object() || sidebar.is_null()) {
            *sidebar = Value::Null;
        }
        for (field, value) in fields {
            sidebar[field] = value;
        }
    }
}

/// Returns the id of a raw record, if it has one, for log messages.
pub(crate) fn record_id(raw: &str) -> Option<LayoutId> {
    serde_json::from_str::<Value>(raw)
        .ok()?
        .get("id")?
        .as_str()
        .map(LayoutId::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LayoutPermission, LayoutSnapshot, SyncStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_v0_flat_record_gets_baseline() {
        let raw = json!({
            "id": "L1",
            "name": "Old layout",
            "path": ["folder"],
            "data": { "layout": "Plot!a" },
            "savedAt": "2021-03-01T10:00:00Z"
        })
        .to_string();

        let layout = migrate(0, &raw).unwrap();
        assert_eq!(layout.id, LayoutId::from("L1"));
        assert_eq!(layout.name, "Old layout");
        assert_eq!(layout.baseline.data, json!({ "layout": "Plot!a" }));
        assert_eq!(
            layout.baseline.saved_at,
            Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(layout.permission, LayoutPermission::CreatorWrite);
        assert_eq!(layout.status(), SyncStatus::New);
        assert!(layout.working.is_none());
    }

    #[test]
    fn test_v0_state_without_timestamp_uses_epoch() {
        let raw = json!({ "id": "L1", "state": {} }).to_string();
        let layout = migrate(0, &raw).unwrap();
        assert_eq!(layout.baseline.saved_at, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(layout.name, "Unnamed layout");
    }

    #[test]
    fn test_v0_without_data_is_unmigratable() {
        let raw = json!({ "id": "L1", "name": "x" }).to_string();
        assert!(matches!(migrate(0, &raw), Err(StoreError::Unmigratable(_))));
    }

    #[test]
    fn test_record_without_id_is_unmigratable() {
        let raw = json!({ "data": {} }).to_string();
        assert!(migrate(0, &raw).is_err());
    }

    #[test]
    fn test_v1_sidebars_consolidated() {
        let mut data = json!({
            "savedProps": { "Plot!a": { "paths": [] } },
            "leftSidebarOpen": true,
            "leftSidebarItem": "topics",
            "rightSidebarSize": 320,
            "globalVariables": {}
        });
        consolidate_workspace(&mut data);

        assert_eq!(
            data,
            json!({
                "configById": { "Plot!a": { "paths": [] } },
                "globalVariables": {},
                "workspace": {
                    "sidebars": {
                        "left": { "open": true, "item": "topics" },
                        "right": { "size": 320 }
                    }
                }
            })
        );
    }

    #[test]
    fn test_consolidate_keeps_existing_workspace_fields() {
        let mut data = json!({
            "workspace": { "playback": { "speed": 2 } },
            "rightSidebarOpen": false
        });
        consolidate_workspace(&mut data);
        assert_eq!(data["workspace"]["playback"]["speed"], 2);
        assert_eq!(data["workspace"]["sidebars"]["right"]["open"], false);
    }

    #[test]
    fn test_v1_upgrade_touches_working_copy() {
        let raw = json!({
            "id": "L1",
            "name": "A",
            "parent": "proj",
            "permission": "ORG_WRITE",
            "baseline": { "data": { "leftSidebarOpen": false }, "savedAt": EPOCH },
            "working": { "data": { "leftSidebarOpen": true }, "savedAt": EPOCH },
            "syncInfo": { "status": "updated", "lastRemoteSavedAt": EPOCH }
        })
        .to_string();

        let layout = migrate(1, &raw).unwrap();
        assert_eq!(
            layout.baseline.data["workspace"]["sidebars"]["left"]["open"],
            false
        );
        assert_eq!(
            layout.working.as_ref().unwrap().data["workspace"]["sidebars"]["left"]["open"],
            true
        );
        assert_eq!(layout.status(), SyncStatus::Updated);
    }

    #[test]
    fn test_future_version_rejected() {
        assert!(upgrade_record(json!({}), CURRENT_RECORD_VERSION + 1).is_err());
    }

    #[test]
    fn test_current_version_round_trip() {
        let mut layout = Layout::new(
            "Round trip",
            "proj",
            LayoutPermission::OrgRead,
            json!({ "configById": {}, "workspace": { "sidebars": {} } }),
        );
        layout.working = Some(LayoutSnapshot::now(json!({ "configById": { "a": 1 } })));

        let raw = serialize(&layout).unwrap();
        assert_eq!(migrate(CURRENT_RECORD_VERSION, &raw).unwrap(), layout);
    }

    #[test]
    fn test_record_id() {
        assert_eq!(
            record_id(r#"{"id":"abc"}"#),
            Some(LayoutId::from("abc"))
        );
        assert_eq!(record_id("not json"), None);
    }
}
