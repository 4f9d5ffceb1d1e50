use std::collections::BTreeSet;

use crate::client::WorkItemClient;
use crate::config::FieldSpec;
use crate::models::{Identity, Item, QueryResultRow, WorkItem};
use crate::render::{BindingTarget, Resolved};

/// Tabs of a detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Description,
    Contacts,
    Children,
    /// A configured extra field group, by index.
    Group(usize),
}

/// Children tab contents, cached for the life of the view.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildrenState {
    NotLoaded,
    Loaded(Vec<Item>),
    Failed(String),
}

/// A view mounted by the presentation controller.
#[derive(Debug)]
pub enum View {
    Detail(DetailView),
    Query(QueryView),
    Items(ItemsView),
}

impl View {
    /// Build the view for a loaded binding.
    pub fn from_resolved(target: &BindingTarget, resolved: &Resolved, client: &WorkItemClient) -> Self {
        match resolved {
            Resolved::WorkItem(item) => View::Detail(DetailView::new(item.as_ref().clone(), client.clone())),
            Resolved::Query(rows) => View::Query(QueryView {
                identifier: match target {
                    BindingTarget::Anchor(anchor) => anchor.identifier.clone(),
                    BindingTarget::Children { parent_id } => parent_id.to_string(),
                },
                rows: rows.clone(),
            }),
            Resolved::Children(items) => View::Items(ItemsView {
                parent_id: match target {
                    BindingTarget::Children { parent_id } => Some(*parent_id),
                    BindingTarget::Anchor(anchor) => anchor.container_id(),
                },
                items: items.clone(),
            }),
        }
    }

    pub fn title(&self) -> String {
        match self {
            View::Detail(d) => format!("#{} {}", d.item.id, d.item.title()),
            View::Query(q) => format!("Query: {}", q.identifier),
            View::Items(i) => match i.parent_id {
                Some(id) => format!("Children of #{}", id),
                None => "Children".to_string(),
            },
        }
    }

    /// Terminal rendering of the view.
    pub fn render(&self) -> String {
        match self {
            View::Detail(d) => super::render_detail(d),
            View::Query(q) => super::render_query(q),
            View::Items(i) => super::render_items(i),
        }
    }
}

/// Saved query result table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryView {
    pub identifier: String,
    pub rows: Vec<QueryResultRow>,
}

/// A bare list of child items.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemsView {
    pub parent_id: Option<i64>,
    pub items: Vec<Item>,
}

/// Tabbed details of one work item.
#[derive(Debug)]
pub struct DetailView {
    item: WorkItem,
    client: WorkItemClient,
    active_tab: Tab,
    children: ChildrenState,
    expanded: BTreeSet<i64>,
}

impl DetailView {
    pub fn new(item: WorkItem, client: WorkItemClient) -> Self {
        Self {
            item,
            client,
            active_tab: Tab::Description,
            children: ChildrenState::NotLoaded,
            expanded: BTreeSet::new(),
        }
    }

    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn children(&self) -> &ChildrenState {
        &self.children
    }

    /// Every tab with its label, configured groups last.
    pub fn tabs(&self) -> Vec<(Tab, String)> {
        let mut tabs = vec![
            (Tab::Description, "Description".to_string()),
            (Tab::Contacts, "Contacts".to_string()),
            (Tab::Children, "Children".to_string()),
        ];
        tabs.extend(
            self.client
                .settings()
                .fields
                .groups
                .iter()
                .enumerate()
                .map(|(i, g)| (Tab::Group(i), g.name.clone())),
        );
        tabs
    }

    /// "Open externally" link: configured organization and project, falling
    /// back to the record's own URL.
    pub fn link(&self) -> Option<String> {
        self.client
            .connection()
            .ok()
            .map(|conn| conn.item_link(self.item.id))
            .or_else(|| self.item.url.clone())
    }

    /// Contact roles and whoever fills them.
    pub fn contacts(&self) -> Vec<(String, Option<Identity>)> {
        self.client
            .settings()
            .fields
            .contacts
            .iter()
            .map(|spec| (spec.label.clone(), self.item.fields.identity(&spec.key)))
            .collect()
    }

    /// Fields of a configured group with their display text.
    pub fn group(&self, index: usize) -> Option<(String, Vec<(FieldSpec, Option<String>)>)> {
        let group = self.client.settings().fields.groups.get(index)?;
        let values = group
            .fields
            .iter()
            .map(|spec| (spec.clone(), self.item.fields.text(&spec.key)))
            .collect();
        Some((group.name.clone(), values))
    }

    /// Select a tab. The first visit to Children fetches the child items; a
    /// failed fetch is retried on the next visit.
    pub async fn select_tab(&mut self, tab: Tab) {
        if let Tab::Group(index) = tab {
            if index >= self.client.settings().fields.groups.len() {
                return;
            }
        }
        self.active_tab = tab;
        if tab != Tab::Children || matches!(self.children, ChildrenState::Loaded(_)) {
            return;
        }

        self.children = match self.client.fetch_items_by_parent(self.item.id).await {
            Ok(items) => ChildrenState::Loaded(items),
            Err(err) => {
                tracing::warn!(error = %err, parent = self.item.id, "failed to load children");
                ChildrenState::Failed(format!("Failed to load children: {}", err))
            }
        };
    }

    pub fn toggle_child(&mut self, child_id: i64) {
        if !self.expanded.remove(&child_id) {
            self.expanded.insert(child_id);
        }
    }

    pub fn is_child_expanded(&self, child_id: i64) -> bool {
        self.expanded.contains(&child_id)
    }
}
