//! Read-mode post-processing.
//!
//! The markup compiler isolates anchor text as inline `code` elements. One
//! pass walks a rendered tree, tags every eligible code span as processed,
//! then swaps each for a collapsed expandable control:
//!
//! ```text
//! <code>&lt;&lt;#42&gt;&gt;</code>
//!   => <details data-ado-anchor="processed" data-binding="..."><summary>#42</summary>...</details>
//! ```
//!
//! The host may run the pass repeatedly over overlapping fragments; the
//! marker keeps every span to a single substitution. Nothing is fetched until
//! a control is expanded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::tree::{Element, Node};
use super::{BindingId, BindingTarget, Expansion, LoadState, RenderBinding, RenderContext, Resolved};
use crate::anchor::{self, AnchorKind, AnchorTarget};
use crate::models::{QueryResultRow, WorkItem};
use crate::present::{self, PresentationController, PresentationHost};

/// Idempotency marker set on processed code spans and on their substitutes.
pub const PROCESSED_ATTR: &str = "data-ado-anchor";
pub const PROCESSED_VALUE: &str = "processed";
pub const BINDING_ATTR: &str = "data-binding";

const CONTROL_CLASS: &str = "ado-anchor";
const BODY_CLASS: &str = "ado-anchor__body";

/// Where the pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Scanning,
    Substituting,
}

/// Per-pass information from the markup compiler.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    pub source_path: Option<String>,
}

struct Registry {
    phase: PassPhase,
    order: Vec<BindingId>,
    bindings: HashMap<BindingId, Arc<RenderBinding>>,
}

/// Read-mode renderer for one document view.
pub struct ReadModeRenderer {
    ctx: Arc<RenderContext>,
    registry: Mutex<Registry>,
}

impl ReadModeRenderer {
    pub fn new(ctx: Arc<RenderContext>) -> Self {
        Self {
            ctx,
            registry: Mutex::new(Registry {
                phase: PassPhase::Idle,
                order: Vec::new(),
                bindings: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> PassPhase {
        self.lock().phase
    }

    /// Bindings created so far, in substitution order.
    pub fn bindings(&self) -> Vec<Arc<RenderBinding>> {
        let registry = self.lock();
        registry
            .order
            .iter()
            .filter_map(|id| registry.bindings.get(id).cloned())
            .collect()
    }

    pub fn binding(&self, id: BindingId) -> Option<Arc<RenderBinding>> {
        self.lock().bindings.get(&id).cloned()
    }

    /// Post-process one rendered fragment. Returns the bindings this pass
    /// created; spans already processed are skipped.
    pub fn process(&self, root: &mut Node, cx: &PassContext) -> Vec<BindingId> {
        self.lock().phase = PassPhase::Scanning;
        let mut found = Vec::new();
        let mut path = Vec::new();
        scan(root, &mut path, false, &mut found);

        self.lock().phase = PassPhase::Substituting;
        let mut created = Vec::with_capacity(found.len());
        for (path, target) in found {
            let Some(slot) = root.at_path_mut(&path) else {
                continue;
            };
            let binding = RenderBinding::new(BindingTarget::Anchor(target.clone()), self.ctx.clone());
            *slot = control(&target, &binding);
            created.push(binding.id());

            let mut registry = self.lock();
            registry.order.push(binding.id());
            registry.bindings.insert(binding.id(), binding);
        }

        self.lock().phase = PassPhase::Idle;
        tracing::debug!(
            source = cx.source_path.as_deref().unwrap_or("-"),
            substituted = created.len(),
            "read pass complete"
        );
        created
    }

    /// Expand a control; the first expansion fetches.
    pub async fn expand(&self, id: BindingId) -> Option<Expansion> {
        let binding = self.binding(id)?;
        Some(binding.expand().await)
    }

    /// Open the children sub-view of a loaded container control.
    pub async fn open_children(&self, id: BindingId) -> Option<Expansion> {
        let binding = self.binding(id)?;
        binding.open_children().await
    }

    /// Expand and open the detail view for a control.
    pub async fn open_details<H: PresentationHost>(
        &self,
        id: BindingId,
        controller: &mut PresentationController<H>,
    ) -> Option<Expansion> {
        let binding = self.binding(id)?;
        Some(super::present_binding(&binding, controller).await)
    }

    /// Rewrite every control body in `root` from its binding state.
    pub fn sync(&self, root: &mut Node) {
        let Node::Element(element) = root else {
            return;
        };
        if let Some(id) = element.get_attr(BINDING_ATTR).and_then(BindingId::parse) {
            if let Some(binding) = self.binding(id) {
                refresh_control(element, &binding);
                return;
            }
        }
        for child in &mut element.children {
            self.sync(child);
        }
    }

    /// The view is gone: detach every binding so late responses are dropped.
    pub fn teardown(&self) {
        let bindings: Vec<_> = {
            let mut registry = self.lock();
            registry.order.clear();
            registry.bindings.drain().map(|(_, b)| b).collect()
        };
        for binding in bindings {
            binding.detach();
        }
    }
}

/// Scanning phase: mark eligible code spans and record their paths.
fn scan(node: &mut Node, path: &mut Vec<usize>, in_pre: bool, found: &mut Vec<(Vec<usize>, AnchorTarget)>) {
    let Node::Element(element) = node else {
        return;
    };
    if element.get_attr(PROCESSED_ATTR).is_some() {
        return;
    }
    if element.tag == "code" && !in_pre {
        if let Some(target) = anchor::parse_exact(&element.text_content()) {
            element.set_attr(PROCESSED_ATTR, PROCESSED_VALUE);
            found.push((path.clone(), target));
        }
        return;
    }

    let in_pre = in_pre || element.tag == "pre";
    for (index, child) in element.children.iter_mut().enumerate() {
        path.push(index);
        scan(child, path, in_pre, found);
        path.pop();
    }
}

fn label(target: &AnchorTarget) -> String {
    match target.kind {
        AnchorKind::Container => format!("#{}", target.identifier),
        AnchorKind::SavedQuery => format!("Query: {}", target.identifier),
    }
}

/// The collapsed control that replaces an anchor code span.
fn control(target: &AnchorTarget, binding: &RenderBinding) -> Node {
    Element::new("details")
        .attr("class", format!("{CONTROL_CLASS} {CONTROL_CLASS}--{}", target.kind.as_str()))
        .attr(PROCESSED_ATTR, PROCESSED_VALUE)
        .attr("data-anchor-kind", target.kind.as_str())
        .attr("data-anchor-id", target.identifier.clone())
        .attr(BINDING_ATTR, binding.id().to_string())
        .attr("data-state", LoadState::Unloaded.as_str())
        .child(Element::new("summary").text(label(target)))
        .child(Element::new("div").attr("class", BODY_CLASS))
        .into()
}

fn refresh_control(element: &mut Element, binding: &RenderBinding) {
    let state = binding.load_state();
    element.set_attr("data-state", state.as_str());
    if binding.is_expanded() {
        element.set_attr("open", "");
    } else {
        element.attrs.remove("open");
    }

    if let (LoadState::Loaded(resolved), Some(summary)) = (&state, element.children.get_mut(0)) {
        if let (Resolved::WorkItem(item), Some(summary)) = (resolved.as_ref(), summary.as_element_mut()) {
            summary.children = vec![Node::text(format!("#{} {}", item.id, item.title()))];
        }
    }

    let body = state_body(&state, binding);
    match element.children.get_mut(1) {
        Some(slot) => *slot = body,
        None => element.children.push(body),
    }
}

fn state_body(state: &LoadState, binding: &RenderBinding) -> Node {
    let body = Element::new("div").attr("class", BODY_CLASS);
    let body = match state {
        LoadState::Unloaded => body,
        LoadState::Loading => body.child(notice("loading", "Loading…")),
        LoadState::Error(message) => body.child(notice("error", message)),
        LoadState::Loaded(resolved) => match resolved.as_ref() {
            Resolved::WorkItem(item) => work_item_body(body, item, binding),
            Resolved::Query(rows) if rows.is_empty() => {
                body.child(notice("empty", "No work items found."))
            }
            Resolved::Query(rows) => body.child(rows_table(rows)),
            Resolved::Children(items) if items.is_empty() => {
                body.child(notice("empty", "No child items found."))
            }
            Resolved::Children(items) => body.child(children_list(items)),
        },
    };
    body.into()
}

fn notice(kind: &str, text: &str) -> Element {
    Element::new("p")
        .attr("class", format!("{CONTROL_CLASS}__{kind}"))
        .text(text)
}

fn work_item_body(body: Element, item: &WorkItem, binding: &RenderBinding) -> Element {
    let description = item
        .fields
        .description
        .as_deref()
        .map(present::html_to_text)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "No description.".to_string());

    let mut body = body
        .child(
            Element::new("p")
                .attr("class", format!("{CONTROL_CLASS}__meta"))
                .text(format!("{} · {}", item.work_item_type(), item.state())),
        )
        .child(
            Element::new("div")
                .attr("class", format!("{CONTROL_CLASS}__description"))
                .text(description),
        );

    let children = Element::new("section").attr("class", format!("{CONTROL_CLASS}__children"));
    let children = match binding.existing_children() {
        None => children.child(notice("hint", "Children not loaded.")),
        Some(child) => match state_body(&child.load_state(), &child) {
            Node::Element(inner) => children.child(inner),
            text => children.child(text),
        },
    };
    body.children.push(children.into());
    body
}

fn rows_table(rows: &[QueryResultRow]) -> Element {
    let header = Element::new("tr")
        .child(Element::new("th").text("ID"))
        .child(Element::new("th").text("Type"))
        .child(Element::new("th").text("Title"))
        .child(Element::new("th").text("State"));
    rows.iter().fold(Element::new("table").child(header), |table, row| {
        table.child(
            Element::new("tr")
                .child(
                    Element::new("td").child(
                        Element::new("a")
                            .attr("href", row.url.clone())
                            .text(row.id.to_string()),
                    ),
                )
                .child(Element::new("td").text(row.work_item_type.clone()))
                .child(Element::new("td").text(row.title.clone()))
                .child(Element::new("td").text(row.state.clone())),
        )
    })
}

fn children_list(items: &[WorkItem]) -> Element {
    items.iter().fold(Element::new("ul"), |list, item| {
        list.child(
            Element::new("li")
                .attr("data-item-id", item.id.to_string())
                .text(format!("#{} {} [{}]", item.id, item.title(), item.state())),
        )
    })
}
