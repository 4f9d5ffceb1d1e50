//! Typed access to remote work items and saved queries.
//!
//! Every operation is a short protocol over the [`Transport`] capability:
//!
//! | Operation | Steps |
//! |-----------|-------|
//! | [`WorkItemClient::fetch_container_by_id`] | `fetch-item` |
//! | [`WorkItemClient::fetch_items_by_parent`] | `child-query`, then `child-batch` unless empty |
//! | [`WorkItemClient::execute_saved_query`] | `resolve-query`, then `hydrate-query` unless empty |
//!
//! Nothing is retried here. Failures carry the step and the identifier being
//! resolved so callers can scope the message to one element.

mod transport;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub use transport::*;

use crate::config::{Connection, Settings};
use crate::hydrate;
use crate::models::*;

const API_VERSION: &str = "api-version=7.0";

/// Most ids the remote accepts in one batch read.
pub const BATCH_LIMIT: usize = 200;

/// Protocol step an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    FetchItem,
    ChildQuery,
    ChildBatch,
    ResolveQuery,
    HydrateQuery,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchItem => "fetch-item",
            Self::ChildQuery => "child-query",
            Self::ChildBatch => "child-batch",
            Self::ResolveQuery => "resolve-query",
            Self::HydrateQuery => "hydrate-query",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data access errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Azure DevOps is not configured: missing {}", .missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },

    #[error("{step} failed for '{identifier}': {source}")]
    Remote {
        step: Step,
        identifier: String,
        source: TransportError,
    },

    #[error("{step} returned an unexpected payload for '{identifier}': {source}")]
    Decode {
        step: Step,
        identifier: String,
        source: serde_json::Error,
    },

    #[error("Failed to set up HTTP transport: {0}")]
    Setup(#[source] TransportError),
}

impl ClientError {
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::NotConfigured { .. } | Self::Setup(_) => None,
            Self::Remote { step, .. } | Self::Decode { step, .. } => Some(*step),
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::NotConfigured { .. } | Self::Setup(_) => None,
            Self::Remote { identifier, .. } | Self::Decode { identifier, .. } => Some(identifier),
        }
    }

    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured { .. })
    }
}

/// WIQL response. Flat queries fill `work_items`; tree and one-hop queries
/// fill `work_item_relations`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WiqlResponse {
    work_items: Vec<QueryRef>,
    work_item_relations: Vec<WiqlRelation>,
}

#[derive(Debug, Deserialize)]
struct WiqlRelation {
    #[serde(default)]
    source: Option<QueryRef>,
    #[serde(default)]
    target: Option<QueryRef>,
}

impl WiqlResponse {
    /// Referenced ids in result order, each once.
    fn into_refs(self) -> Vec<QueryRef> {
        let mut seen = std::collections::HashSet::new();
        let relation_refs = self
            .work_item_relations
            .into_iter()
            .flat_map(|rel| [rel.source, rel.target])
            .flatten();
        self.work_items
            .into_iter()
            .chain(relation_refs)
            .filter(|r| seen.insert(r.id))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    value: Vec<RawWorkItem>,
}

/// Work item as returned by the batch endpoint, fields still untyped.
#[derive(Debug, Deserialize)]
struct RawWorkItem {
    id: i64,
    #[serde(default)]
    rev: i64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Client for work item reads. Cheap to clone.
#[derive(Clone)]
pub struct WorkItemClient {
    transport: Arc<dyn Transport>,
    settings: Arc<Settings>,
}

impl fmt::Debug for WorkItemClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemClient")
            .field("organization_url", &self.settings.organization_url)
            .field("project_name", &self.settings.project_name)
            .finish_non_exhaustive()
    }
}

impl WorkItemClient {
    pub fn new(transport: Arc<dyn Transport>, settings: Arc<Settings>) -> Self {
        Self { transport, settings }
    }

    /// Create a client over HTTP from settings.
    pub fn connect(settings: Settings) -> Result<Self, ClientError> {
        let conn = settings.connection()?;
        let transport = HttpTransport::new(conn.organization_url, Some(conn.personal_access_token))
            .map_err(ClientError::Setup)?;
        Ok(Self::new(Arc::new(transport), Arc::new(settings)))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Connection values, or `NotConfigured`.
    pub fn connection(&self) -> Result<Connection, ClientError> {
        self.settings.connection()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        step: Step,
        identifier: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        tracing::debug!(%step, identifier, path, "remote call");
        let value = self
            .transport
            .request(method, path, body)
            .await
            .map_err(|source| ClientError::Remote {
                step,
                identifier: identifier.to_string(),
                source,
            })?;
        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            step,
            identifier: identifier.to_string(),
            source,
        })
    }

    // ============================================================
    // Single items
    // ============================================================

    /// Fetch one container (or any work item) with all its fields.
    pub async fn fetch_container_by_id(&self, id: i64) -> Result<Container, ClientError> {
        let conn = self.connection()?;
        let path = format!(
            "/{}/_apis/wit/workitems/{}?{}",
            urlencoding::encode(&conn.project_name),
            id,
            API_VERSION
        );
        self.call(Step::FetchItem, &id.to_string(), Method::Get, &path, None)
            .await
    }

    // ============================================================
    // Children
    // ============================================================

    /// Items whose parent is `parent_id`, ordered by rank then id.
    pub async fn fetch_items_by_parent(&self, parent_id: i64) -> Result<Vec<Item>, ClientError> {
        let conn = self.connection()?;
        let identifier = parent_id.to_string();
        let fields = &self.settings.fields;

        let query = format!(
            "SELECT [{id}] FROM WorkItems WHERE [{parent}] = {parent_id} ORDER BY [{rank}] ASC, [{id}] ASC",
            id = keys::ID,
            parent = keys::PARENT,
            rank = fields.rank_field,
        );
        let path = format!(
            "/{}/_apis/wit/wiql?{}",
            urlencoding::encode(&conn.project_name),
            API_VERSION
        );
        let wiql: WiqlResponse = self
            .call(
                Step::ChildQuery,
                &identifier,
                Method::Post,
                &path,
                Some(json!({ "query": query })),
            )
            .await?;

        let refs = wiql.into_refs();
        if refs.is_empty() {
            tracing::debug!(parent_id, "no child items");
            return Ok(Vec::new());
        }

        let fetched = self
            .batch_fetch(Step::ChildBatch, &identifier, &refs, &fields.children)
            .await?;
        let mut by_id: HashMap<i64, RawWorkItem> =
            fetched.into_iter().map(|item| (item.id, item)).collect();

        refs.into_iter()
            .map(|r| {
                let mut merged = Map::new();
                merged.insert(keys::ID.to_string(), json!(r.id));
                merged.insert(keys::PARENT.to_string(), json!(parent_id));
                let (rev, url) = match by_id.remove(&r.id) {
                    Some(raw) => {
                        merged.extend(raw.fields);
                        (raw.rev, raw.url.or(r.url))
                    }
                    None => (0, r.url),
                };
                let fields =
                    WorkItemFields::from_map(merged).map_err(|source| ClientError::Decode {
                        step: Step::ChildBatch,
                        identifier: identifier.clone(),
                        source,
                    })?;
                Ok(WorkItem {
                    id: r.id,
                    rev,
                    url,
                    fields,
                })
            })
            .collect()
    }

    // ============================================================
    // Saved queries
    // ============================================================

    /// Step 1: resolve a saved query id or path into ordered references.
    pub async fn resolve_saved_query(&self, id_or_path: &str) -> Result<Vec<QueryRef>, ClientError> {
        let conn = self.connection()?;
        let encoded = id_or_path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let path = format!(
            "/{}/_apis/wit/wiql/{}?{}",
            urlencoding::encode(&conn.project_name),
            encoded,
            API_VERSION
        );
        let wiql: WiqlResponse = self
            .call(Step::ResolveQuery, id_or_path, Method::Get, &path, None)
            .await?;
        Ok(wiql.into_refs())
    }

    /// Both protocol steps, without normalization.
    pub async fn run_saved_query(
        &self,
        id_or_path: &str,
        comprehensive: bool,
    ) -> Result<SavedQueryExecution, ClientError> {
        let refs = self.resolve_saved_query(id_or_path).await?;
        if refs.is_empty() {
            tracing::debug!(query = id_or_path, "saved query matched nothing");
            return Ok(SavedQueryExecution {
                identifier: id_or_path.to_string(),
                refs,
                items: Vec::new(),
            });
        }

        let fields = self.settings.fields.query_fields(comprehensive);
        let raw = self
            .batch_fetch(Step::HydrateQuery, id_or_path, &refs, &fields)
            .await?;
        let items = raw
            .into_iter()
            .map(|raw| {
                let fields = WorkItemFields::from_map(raw.fields).map_err(|source| {
                    ClientError::Decode {
                        step: Step::HydrateQuery,
                        identifier: id_or_path.to_string(),
                        source,
                    }
                })?;
                Ok(WorkItem {
                    id: raw.id,
                    rev: raw.rev,
                    url: raw.url,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, ClientError>>()?;

        Ok(SavedQueryExecution {
            identifier: id_or_path.to_string(),
            refs,
            items,
        })
    }

    /// Run a saved query and return one hydrated row per resolved id.
    pub async fn execute_saved_query(
        &self,
        id_or_path: &str,
        comprehensive: bool,
    ) -> Result<Vec<QueryResultRow>, ClientError> {
        let conn = self.connection()?;
        let execution = self.run_saved_query(id_or_path, comprehensive).await?;
        Ok(hydrate::hydrate_rows(&execution, &conn))
    }

    /// Batch read of `fields` for every referenced id, in chunks the remote
    /// accepts. All chunks belong to the same step.
    async fn batch_fetch(
        &self,
        step: Step,
        identifier: &str,
        refs: &[QueryRef],
        fields: &[String],
    ) -> Result<Vec<RawWorkItem>, ClientError> {
        let fields = fields
            .iter()
            .map(|key| urlencoding::encode(key).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let mut items = Vec::with_capacity(refs.len());
        for chunk in refs.chunks(BATCH_LIMIT) {
            let ids = chunk
                .iter()
                .map(|r| r.id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let path = format!(
                "/_apis/wit/workitems?ids={}&fields={}&{}",
                ids, fields, API_VERSION
            );
            let batch: BatchResponse = self
                .call(step, identifier, Method::Get, &path, None)
                .await?;
            items.extend(batch.value);
        }
        Ok(items)
    }
}
