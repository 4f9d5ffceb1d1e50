use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{BindingTarget, RenderContext, Resolved};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(Uuid);

impl BindingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Load state of one binding.
///
/// Moves forward only: `Unloaded → Loading → Loaded | Error`, and `Error`
/// re-enters `Loading` when the user retries.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded(Arc<Resolved>),
    Error(String),
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Error(_) => "error",
        }
    }
}

/// Result of one expansion request.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    Loaded(Arc<Resolved>),
    Failed(String),
    /// A fetch for this binding is already running; nothing new was started.
    InFlight,
    /// The binding was torn down; any late response was dropped.
    Discarded,
}

struct BindingState {
    load: LoadState,
    attached: bool,
    expanded: bool,
    children: Option<Arc<RenderBinding>>,
}

/// Associates one anchor occurrence with its interactive element.
pub struct RenderBinding {
    id: BindingId,
    target: BindingTarget,
    ctx: Arc<RenderContext>,
    state: Mutex<BindingState>,
}

impl fmt::Debug for RenderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderBinding")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("state", &self.load_state().as_str())
            .finish()
    }
}

impl RenderBinding {
    pub fn new(target: BindingTarget, ctx: Arc<RenderContext>) -> Arc<Self> {
        Arc::new(Self {
            id: BindingId::new(),
            target,
            ctx,
            state: Mutex::new(BindingState {
                load: LoadState::Unloaded,
                attached: true,
                expanded: false,
                children: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn target(&self) -> &BindingTarget {
        &self.target
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.ctx
    }

    pub fn load_state(&self) -> LoadState {
        self.lock().load.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    pub fn is_expanded(&self) -> bool {
        self.lock().expanded
    }

    pub fn collapse(&self) {
        self.lock().expanded = false;
    }

    /// Tear down: the element is gone, so late responses must not land.
    pub fn detach(&self) {
        let children = {
            let mut state = self.lock();
            state.attached = false;
            state.children.take()
        };
        if let Some(children) = children {
            children.detach();
        }
    }

    /// Expand the element, fetching on first use or after an error.
    pub async fn expand(&self) -> Expansion {
        {
            let mut state = self.lock();
            if !state.attached {
                return Expansion::Discarded;
            }
            state.expanded = true;
            match &state.load {
                LoadState::Loading => return Expansion::InFlight,
                LoadState::Loaded(resolved) => return Expansion::Loaded(resolved.clone()),
                LoadState::Unloaded | LoadState::Error(_) => state.load = LoadState::Loading,
            }
        }

        tracing::debug!(binding = %self.id, target = ?self.target, "loading");
        let mut pending = PendingLoad {
            binding: self,
            settled: false,
        };
        let result = self.ctx.resolve(&self.target).await;
        pending.settled = true;
        self.complete(result)
    }

    fn complete(&self, result: Result<Resolved, crate::client::ClientError>) -> Expansion {
        let mut state = self.lock();
        if !state.attached {
            tracing::debug!(binding = %self.id, "discarding response for torn-down binding");
            return Expansion::Discarded;
        }
        match result {
            Ok(resolved) => {
                let resolved = Arc::new(resolved);
                state.load = LoadState::Loaded(resolved.clone());
                Expansion::Loaded(resolved)
            }
            Err(err) => {
                let message = self.ctx.report(&err);
                state.load = LoadState::Error(message.clone());
                Expansion::Failed(message)
            }
        }
    }

    /// Back to `Unloaded` when a fetch was abandoned mid-flight.
    fn abandon(&self) {
        let mut state = self.lock();
        if state.load == LoadState::Loading {
            tracing::debug!(binding = %self.id, "load dropped before completion");
            state.load = LoadState::Unloaded;
        }
    }

    /// The nested children binding of a loaded container, created on first
    /// request. `None` for anything that is not a loaded work item.
    pub fn children(&self) -> Option<Arc<RenderBinding>> {
        let mut state = self.lock();
        if !state.attached {
            return None;
        }
        let parent_id = match &state.load {
            LoadState::Loaded(resolved) => match resolved.as_ref() {
                Resolved::WorkItem(item) => item.id,
                _ => return None,
            },
            _ => return None,
        };
        let ctx = self.ctx.clone();
        let child = state
            .children
            .get_or_insert_with(|| RenderBinding::new(BindingTarget::Children { parent_id }, ctx));
        Some(child.clone())
    }

    /// Open the children sub-view, loading it lazily.
    pub async fn open_children(&self) -> Option<Expansion> {
        let children = self.children()?;
        Some(children.expand().await)
    }

    /// Children binding if it has been opened before.
    pub fn existing_children(&self) -> Option<Arc<RenderBinding>> {
        self.lock().children.clone()
    }
}

/// Resets a binding stuck in `Loading` when the expanding future is dropped.
struct PendingLoad<'a> {
    binding: &'a RenderBinding,
    settled: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.binding.abandon();
        }
    }
}
