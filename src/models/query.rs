use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::WorkItem;

/// One work item reference returned when a saved query is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRef {
    pub id: i64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Raw output of the two-step saved query protocol, before normalization.
///
/// `refs` keeps the order the query resolved to; `items` is whatever the
/// batch fetch returned, in any order and possibly with gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedQueryExecution {
    pub identifier: String,
    pub refs: Vec<QueryRef>,
    pub items: Vec<WorkItem>,
}

/// A hydrated saved-query row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultRow {
    pub id: i64,
    pub title: String,
    pub state: String,
    #[serde(rename = "type")]
    pub work_item_type: String,
    /// Direct link to the item in the web UI.
    pub url: String,
    /// Every field the batch fetch returned, keyed by wire name.
    pub fields: Map<String, Value>,
}
