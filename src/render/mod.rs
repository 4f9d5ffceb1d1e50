//! Render surfaces for anchors.
//!
//! Both renderers share the same pieces:
//! - [`RenderContext`]: immutable handle (data client, notifier) given to
//!   every interactive element when it is built.
//! - [`RenderBinding`]: per-anchor load state machine.
//! - [`present_binding`]: the fetch-then-present flow behind a click.
//!
//! Data errors stop at the binding. A failed anchor shows its own error and
//! leaves the rest of the document alone.

mod binding;
pub mod live;
pub mod read;
pub mod tree;

use std::sync::Arc;

pub use binding::*;
pub use live::LiveModeRenderer;
pub use read::ReadModeRenderer;

use crate::anchor::{AnchorKind, AnchorTarget};
use crate::client::{ClientError, WorkItemClient};
use crate::models::{Item, QueryResultRow, WorkItem};
use crate::present::{PresentationController, PresentationHost, View};

/// User-facing notices for configuration and connectivity problems.
pub trait Notifier: Send + Sync {
    fn notice(&self, message: &str);
}

/// Notices as `warn` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notice(&self, message: &str) {
        tracing::warn!(notice = message, "user notice");
    }
}

/// What a binding resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    Anchor(AnchorTarget),
    /// Child items of a loaded container.
    Children { parent_id: i64 },
}

/// Loaded payload of a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    WorkItem(Box<WorkItem>),
    Query(Vec<QueryResultRow>),
    Children(Vec<Item>),
}

impl Resolved {
    /// Zero query rows or zero children. Rendered as "none found".
    pub fn is_empty(&self) -> bool {
        match self {
            Resolved::WorkItem(_) => false,
            Resolved::Query(rows) => rows.is_empty(),
            Resolved::Children(items) => items.is_empty(),
        }
    }
}

/// Shared, immutable state handed to interactive elements.
pub struct RenderContext {
    client: WorkItemClient,
    notifier: Arc<dyn Notifier>,
}

impl RenderContext {
    pub fn new(client: WorkItemClient, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self { client, notifier })
    }

    pub fn client(&self) -> &WorkItemClient {
        &self.client
    }

    /// Fetch the payload for a target.
    pub async fn resolve(&self, target: &BindingTarget) -> Result<Resolved, ClientError> {
        match target {
            BindingTarget::Anchor(anchor) => match anchor.kind {
                AnchorKind::Container => {
                    let id = anchor.container_id().ok_or_else(|| ClientError::Decode {
                        step: crate::client::Step::FetchItem,
                        identifier: anchor.identifier.clone(),
                        source: serde::de::Error::custom("work item id out of range"),
                    })?;
                    let item = self.client.fetch_container_by_id(id).await?;
                    Ok(Resolved::WorkItem(Box::new(item)))
                }
                AnchorKind::SavedQuery => {
                    let comprehensive = self.client.settings().comprehensive_queries;
                    let rows = self
                        .client
                        .execute_saved_query(&anchor.identifier, comprehensive)
                        .await?;
                    Ok(Resolved::Query(rows))
                }
            },
            BindingTarget::Children { parent_id } => {
                let items = self.client.fetch_items_by_parent(*parent_id).await?;
                Ok(Resolved::Children(items))
            }
        }
    }

    /// Report a failed load and return the inline message for the element.
    pub fn report(&self, err: &ClientError) -> String {
        if err.is_not_configured() {
            self.notifier.notice(&err.to_string());
            return "Azure DevOps is not configured".to_string();
        }
        tracing::warn!(error = %err, "failed to load anchor");
        format!("Failed to load: {}", err)
    }
}

/// Expand a binding and, once loaded, open its view.
///
/// Returns the expansion so callers can show in-flight or error states.
pub async fn present_binding<H: PresentationHost>(
    binding: &RenderBinding,
    controller: &mut PresentationController<H>,
) -> Expansion {
    let expansion = binding.expand().await;
    if let Expansion::Loaded(ref resolved) = expansion {
        let view = View::from_resolved(binding.target(), resolved, binding.context().client());
        controller.open(view);
    }
    expansion
}
