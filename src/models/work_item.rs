use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical wire keys for the fields the crate reads directly.
///
/// The remote rejects unknown keys at the batch step, so these strings are
/// load-bearing. Anything beyond this list is configured in
/// [`FieldConfig`](crate::config::FieldConfig).
pub mod keys {
    pub const ID: &str = "System.Id";
    pub const TITLE: &str = "System.Title";
    pub const STATE: &str = "System.State";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const DESCRIPTION: &str = "System.Description";
    pub const CREATED_DATE: &str = "System.CreatedDate";
    pub const CHANGED_DATE: &str = "System.ChangedDate";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const CREATED_BY: &str = "System.CreatedBy";
    pub const CHANGED_BY: &str = "System.ChangedBy";
    pub const PARENT: &str = "System.Parent";
    pub const TAGS: &str = "System.Tags";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
    pub const STACK_RANK: &str = "Microsoft.VSTS.Common.StackRank";
}

/// Placeholder shown wherever a display field is missing.
pub const NOT_AVAILABLE: &str = "N/A";

/// A snapshot of a remote work item.
///
/// Created and mutated only by the remote system; `rev` increases on every
/// remote change. The crate reads snapshots and never writes them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    #[serde(default)]
    pub rev: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub fields: WorkItemFields,
}

/// A top-level record with child items (an Epic).
pub type Container = WorkItem;

/// A record scoped under a [`Container`] through `System.Parent` (a Feature).
pub type Item = WorkItem;

/// Known fields of a work item plus every other field the remote returned.
///
/// Custom fields land in `extra` verbatim, keyed by their wire name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemFields {
    #[serde(rename = "System.Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "System.State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "System.WorkItemType", default, skip_serializing_if = "Option::is_none")]
    pub work_item_type: Option<String>,
    /// Rich text (HTML) as stored remotely.
    #[serde(rename = "System.Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "System.CreatedDate", default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(rename = "System.ChangedDate", default, skip_serializing_if = "Option::is_none")]
    pub changed_date: Option<String>,
    #[serde(rename = "System.AssignedTo", default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Identity>,
    #[serde(rename = "System.CreatedBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Identity>,
    #[serde(rename = "System.ChangedBy", default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<Identity>,
    #[serde(rename = "System.Parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A person-valued field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub display_name: String,
    /// Usually the email or UPN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
    /// Sub-keys not modelled above (`_links`, `inactive`, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    /// `Display Name <handle>` when a unique handle is known.
    pub fn label(&self) -> String {
        match &self.unique_name {
            Some(handle) if !handle.is_empty() => format!("{} <{}>", self.display_name, handle),
            _ => self.display_name.clone(),
        }
    }
}

impl WorkItemFields {
    /// Build from a raw wire field object.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// Look up any field by its wire key.
    pub fn get(&self, key: &str) -> Option<Value> {
        fn opt<T: Serialize>(value: &Option<T>) -> Option<Value> {
            value.as_ref().and_then(|v| serde_json::to_value(v).ok())
        }

        match key {
            keys::TITLE => opt(&self.title),
            keys::STATE => opt(&self.state),
            keys::WORK_ITEM_TYPE => opt(&self.work_item_type),
            keys::DESCRIPTION => opt(&self.description),
            keys::CREATED_DATE => opt(&self.created_date),
            keys::CHANGED_DATE => opt(&self.changed_date),
            keys::ASSIGNED_TO => opt(&self.assigned_to),
            keys::CREATED_BY => opt(&self.created_by),
            keys::CHANGED_BY => opt(&self.changed_by),
            keys::PARENT => opt(&self.parent),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Field value flattened to display text. Identities show their label.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|value| value_text(&value))
    }

    /// Identity-valued field by wire key, including custom role fields.
    pub fn identity(&self, key: &str) -> Option<Identity> {
        match key {
            keys::ASSIGNED_TO => self.assigned_to.clone(),
            keys::CREATED_BY => self.created_by.clone(),
            keys::CHANGED_BY => self.changed_by.clone(),
            other => self
                .extra
                .get(other)
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }

    /// All fields as a wire-shaped map.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl WorkItem {
    pub fn title(&self) -> &str {
        self.fields.title.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn state(&self) -> &str {
        self.fields.state.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn work_item_type(&self) -> &str {
        self.fields.work_item_type.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.fields.parent
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.fields.created_date.as_deref()?)
    }

    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.fields.changed_date.as_deref()?)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a wire value as display text.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj
            .get("displayName")
            .and_then(Value::as_str)
            .map(|name| match obj.get("uniqueName").and_then(Value::as_str) {
                Some(handle) if !handle.is_empty() => format!("{} <{}>", name, handle),
                _ => name.to_string(),
            })
            .or_else(|| Some(value.to_string())),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_unknown_fields_in_extra() {
        let item: WorkItem = serde_json::from_value(json!({
            "id": 7,
            "rev": 3,
            "fields": {
                "System.Title": "Checkout",
                "Custom.Readiness": "Green",
                "System.Parent": 2
            }
        }))
        .unwrap();

        assert_eq!(item.title(), "Checkout");
        assert_eq!(item.parent_id(), Some(2));
        assert_eq!(item.fields.extra.get("Custom.Readiness"), Some(&json!("Green")));
        assert_eq!(item.fields.get("Custom.Missing"), None);
    }

    #[test]
    fn missing_display_fields_fall_back() {
        let item: WorkItem = serde_json::from_value(json!({ "id": 1 })).unwrap();
        assert_eq!(item.title(), NOT_AVAILABLE);
        assert_eq!(item.state(), NOT_AVAILABLE);
        assert!(item.created_at().is_none());
    }

    #[test]
    fn custom_identity_fields_are_readable() {
        let fields = WorkItemFields::from_map(
            json!({
                "Custom.SolutionArchitect": {
                    "displayName": "Ada Lovelace",
                    "uniqueName": "ada@example.com"
                }
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .unwrap();

        let who = fields.identity("Custom.SolutionArchitect").unwrap();
        assert_eq!(who.label(), "Ada Lovelace <ada@example.com>");
        assert_eq!(
            fields.text("Custom.SolutionArchitect").as_deref(),
            Some("Ada Lovelace <ada@example.com>")
        );
    }

    #[test]
    fn identities_round_trip_unmodelled_keys() {
        let wire = json!({
            "System.AssignedTo": {
                "displayName": "Grace Hopper",
                "uniqueName": "grace@contoso.com",
                "inactive": false,
                "_links": { "avatar": { "href": "https://example/avatar" } }
            }
        });
        let fields = WorkItemFields::from_map(wire.as_object().cloned().unwrap()).unwrap();

        assert_eq!(fields.to_map(), wire.as_object().cloned().unwrap());
    }

    #[test]
    fn parses_remote_timestamps() {
        let item: WorkItem = serde_json::from_value(json!({
            "id": 1,
            "fields": { "System.CreatedDate": "2024-03-01T10:15:00.123Z" }
        }))
        .unwrap();
        assert_eq!(item.created_at().map(|d| d.timestamp()), Some(1_709_288_100));
    }
}
