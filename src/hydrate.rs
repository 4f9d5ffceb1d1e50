//! Saved query hydration.
//!
//! Turns the raw two-step output ([`SavedQueryExecution`]) into display rows.
//! Rows follow the order the query resolved to, one per resolved id, with
//! [`NOT_AVAILABLE`] standing in for any display field the remote omitted.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::Connection;
use crate::models::*;

/// Normalize a saved query execution into result rows.
pub fn hydrate_rows(execution: &SavedQueryExecution, conn: &Connection) -> Vec<QueryResultRow> {
    let by_id: HashMap<i64, &WorkItem> = execution.items.iter().map(|i| (i.id, i)).collect();

    execution
        .refs
        .iter()
        .map(|r| {
            let item = by_id.get(&r.id).copied();
            let url = r
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| conn.item_link(r.id));
            hydrate_row(r.id, item, url)
        })
        .collect()
}

fn hydrate_row(id: i64, item: Option<&WorkItem>, url: String) -> QueryResultRow {
    let mut fields: Map<String, Value> = item.map(|i| i.fields.to_map()).unwrap_or_default();
    fields.insert(keys::ID.to_string(), json!(id));

    let display = |key: &str| {
        fields
            .get(key)
            .and_then(value_text)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };

    QueryResultRow {
        id,
        title: display(keys::TITLE),
        state: display(keys::STATE),
        work_item_type: display(keys::WORK_ITEM_TYPE),
        url,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection {
            organization_url: "https://dev.azure.com/contoso".to_string(),
            project_name: "Shop".to_string(),
            personal_access_token: "pat".to_string(),
        }
    }

    fn item(id: i64, fields: Value) -> WorkItem {
        serde_json::from_value(json!({ "id": id, "fields": fields })).unwrap()
    }

    #[test]
    fn rows_follow_query_order_and_fill_gaps() {
        let execution = SavedQueryExecution {
            identifier: "Shared/Bugs".to_string(),
            refs: vec![
                QueryRef { id: 2, url: Some("https://example/2".to_string()) },
                QueryRef { id: 1, url: None },
                QueryRef { id: 3, url: None },
            ],
            items: vec![
                item(1, json!({ "System.Title": "One", "System.State": "New", "System.WorkItemType": "Bug" })),
                item(2, json!({ "System.Title": "Two", "Custom.Risk": "High" })),
            ],
        };

        let rows = hydrate_rows(&execution, &conn());

        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1, 3]);
        assert_eq!(rows[0].url, "https://example/2");
        assert_eq!(rows[0].state, NOT_AVAILABLE);
        assert_eq!(rows[0].fields.get("Custom.Risk"), Some(&json!("High")));
        assert_eq!(rows[1].url, "https://dev.azure.com/contoso/Shop/_workitems/edit/1");
        assert_eq!(rows[1].work_item_type, "Bug");
        assert_eq!(rows[2].title, NOT_AVAILABLE);
        assert_eq!(rows[2].fields.get(keys::ID), Some(&json!(3)));
    }

    #[test]
    fn identity_fields_keep_every_sub_key() {
        let assigned = json!({
            "displayName": "Grace Hopper",
            "uniqueName": "grace@contoso.com",
            "inactive": false,
            "_links": { "avatar": { "href": "https://example/avatar" } }
        });
        let execution = SavedQueryExecution {
            identifier: "Shared/Bugs".to_string(),
            refs: vec![QueryRef { id: 5, url: None }],
            items: vec![item(5, json!({ "System.AssignedTo": assigned.clone() }))],
        };

        let rows = hydrate_rows(&execution, &conn());

        assert_eq!(rows[0].fields.get(keys::ASSIGNED_TO), Some(&assigned));
    }

    #[test]
    fn empty_execution_has_no_rows() {
        assert!(hydrate_rows(&SavedQueryExecution::default(), &conn()).is_empty());
    }
}
