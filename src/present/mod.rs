//! Popover and modal presentation.
//!
//! [`PresentationController`] owns the single active view. Opening a view
//! closes the previous one first, removing its outside-click listener in
//! the same call so no listener outlives its popover.

mod text;
mod view;

use std::collections::BTreeMap;

pub use text::*;
pub use view::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// How a view is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Dismissed by a click outside it.
    Popover,
    /// Stays until closed explicitly.
    Modal,
}

/// The UI root views are mounted into.
pub trait PresentationHost {
    fn mount(&mut self, view: &View, presentation: Presentation) -> MountId;
    fn unmount(&mut self, mount: MountId);
    fn listen_outside_click(&mut self, mount: MountId) -> ListenerId;
    fn remove_listener(&mut self, listener: ListenerId);
    /// Redraw a mounted view after its state changed.
    fn refresh(&mut self, mount: MountId, view: &View);
}

/// In-process host that keeps rendered text per mounted view.
#[derive(Debug, Default)]
pub struct MemoryHost {
    next_id: u64,
    mounted: BTreeMap<MountId, String>,
    listeners: BTreeMap<ListenerId, MountId>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Rendered text of every mounted view.
    pub fn mounted(&self) -> Vec<&str> {
        self.mounted.values().map(String::as_str).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listener registered for `mount`, if any.
    pub fn listener_for(&self, mount: MountId) -> Option<ListenerId> {
        self.listeners
            .iter()
            .find(|(_, m)| **m == mount)
            .map(|(l, _)| *l)
    }
}

impl PresentationHost for MemoryHost {
    fn mount(&mut self, view: &View, _presentation: Presentation) -> MountId {
        let id = MountId(self.next());
        self.mounted.insert(id, view.render());
        id
    }

    fn unmount(&mut self, mount: MountId) {
        self.mounted.remove(&mount);
    }

    fn listen_outside_click(&mut self, mount: MountId) -> ListenerId {
        let id = ListenerId(self.next());
        self.listeners.insert(id, mount);
        id
    }

    fn remove_listener(&mut self, listener: ListenerId) {
        self.listeners.remove(&listener);
    }

    fn refresh(&mut self, mount: MountId, view: &View) {
        if let Some(slot) = self.mounted.get_mut(&mount) {
            *slot = view.render();
        }
    }
}

struct ActiveView {
    view: View,
    mount: MountId,
    listener: Option<ListenerId>,
}

/// Owns at most one open view.
pub struct PresentationController<H: PresentationHost> {
    host: H,
    presentation: Presentation,
    active: Option<ActiveView>,
}

impl<H: PresentationHost> PresentationController<H> {
    /// Controller opening views as transient popovers.
    pub fn new(host: H) -> Self {
        Self::with_presentation(host, Presentation::Popover)
    }

    pub fn with_presentation(host: H, presentation: Presentation) -> Self {
        Self {
            host,
            presentation,
            active: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_view(&self) -> Option<&View> {
        self.active.as_ref().map(|a| &a.view)
    }

    pub fn active_mount(&self) -> Option<MountId> {
        self.active.as_ref().map(|a| a.mount)
    }

    /// Show `view`, closing whatever was open.
    pub fn open(&mut self, view: View) -> MountId {
        self.close();
        let mount = self.host.mount(&view, self.presentation);
        let listener = match self.presentation {
            Presentation::Popover => Some(self.host.listen_outside_click(mount)),
            Presentation::Modal => None,
        };
        tracing::debug!(?mount, title = %view.title(), "view opened");
        self.active = Some(ActiveView {
            view,
            mount,
            listener,
        });
        mount
    }

    /// Close the active view and detach its listener.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(listener) = active.listener {
                self.host.remove_listener(listener);
            }
            self.host.unmount(active.mount);
        }
    }

    /// Outside-click callback from the host.
    pub fn handle_outside_click(&mut self, listener: ListenerId) {
        let matches = self
            .active
            .as_ref()
            .is_some_and(|a| a.listener == Some(listener));
        if matches {
            self.close();
        }
    }

    /// Switch tabs on the active detail view, loading children lazily.
    pub async fn select_tab(&mut self, tab: Tab) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let View::Detail(detail) = &mut active.view {
            detail.select_tab(tab).await;
        }
        self.host.refresh(active.mount, &active.view);
    }

    /// Expand or collapse one row of the active view's children list.
    pub fn toggle_child(&mut self, child_id: i64) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let View::Detail(detail) = &mut active.view {
            detail.toggle_child(child_id);
        }
        self.host.refresh(active.mount, &active.view);
    }
}
