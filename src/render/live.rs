//! Live-mode decorations.
//!
//! The editing surface calls [`LiveModeRenderer::recompute`] on every text or
//! viewport change. Each visible range is parsed on its own and matches are
//! mapped back to absolute offsets; every anchor span gets an [`Overlay`]
//! drawn in place of its text. The buffer itself is only ever read.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BindingId, BindingTarget, Expansion, RenderBinding, RenderContext};
use crate::anchor::{self, AnchorKind, AnchorRef, AnchorTarget};
use crate::present::{PresentationController, PresentationHost};

/// Read-only view of the live editing surface.
pub trait LiveSurface {
    /// Full document text.
    fn document(&self) -> &str;
    /// Visible byte ranges, in any order, possibly overlapping.
    fn visible_ranges(&self) -> Vec<Range<usize>>;
}

/// A plain in-memory surface.
#[derive(Debug, Clone, Default)]
pub struct TextSurface {
    pub text: String,
    pub visible: Vec<Range<usize>>,
}

impl TextSurface {
    pub fn new(text: impl Into<String>, visible: Vec<Range<usize>>) -> Self {
        Self {
            text: text.into(),
            visible,
        }
    }

    /// Whole document visible.
    pub fn fully_visible(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.len();
        Self::new(text, vec![0..len])
    }
}

impl LiveSurface for TextSurface {
    fn document(&self) -> &str {
        &self.text
    }

    fn visible_ranges(&self) -> Vec<Range<usize>> {
        self.visible.clone()
    }
}

/// Byte range covering zero-based lines `lines` of `text`.
pub fn line_range(text: &str, lines: Range<usize>) -> Range<usize> {
    let mut starts = std::iter::once(0).chain(text.match_indices('\n').map(|(i, _)| i + 1));
    let start = starts.nth(lines.start).unwrap_or(text.len());
    let end = if lines.end > lines.start {
        starts
            .nth(lines.end - lines.start - 1)
            .unwrap_or(text.len())
    } else {
        start
    };
    start..end.max(start)
}

/// Widget drawn in place of an anchor span.
///
/// Equality is `(kind, id)` only, so recomputations that find the same
/// anchors produce equal overlays and the surface can skip redraws.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub target: AnchorTarget,
    pub label: String,
    pub binding: BindingId,
}

impl PartialEq for Overlay {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for Overlay {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub range: Range<usize>,
    pub overlay: Overlay,
}

/// A visible anchor and the binding that follows it across edits.
struct Tracked {
    span: Range<usize>,
    target: AnchorTarget,
    binding: Arc<RenderBinding>,
}

struct LiveState {
    tracked: Vec<Tracked>,
    decorations: Vec<Decoration>,
}

/// Live-mode renderer for one editor.
pub struct LiveModeRenderer {
    ctx: Arc<RenderContext>,
    state: Mutex<LiveState>,
}

impl LiveModeRenderer {
    pub fn new(ctx: Arc<RenderContext>) -> Self {
        Self {
            ctx,
            state: Mutex::new(LiveState {
                tracked: Vec::new(),
                decorations: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild decorations for the current text and viewport.
    ///
    /// Bindings carry over by target, matched in order of appearance, so
    /// edits that only shift an anchor keep its state. Unmatched bindings
    /// left the visible range and are torn down.
    pub fn recompute(&self, surface: &dyn LiveSurface) -> Vec<Decoration> {
        let text = surface.document();
        let anchors = visible_anchors(text, surface.visible_ranges());

        let mut state = self.lock();
        let mut previous: Vec<Option<Tracked>> =
            std::mem::take(&mut state.tracked).into_iter().map(Some).collect();
        let mut decorations = Vec::with_capacity(anchors.len());

        for found in anchors {
            let binding = previous
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|t| t.target == found.target))
                .and_then(Option::take)
                .map(|t| t.binding)
                .unwrap_or_else(|| {
                    RenderBinding::new(BindingTarget::Anchor(found.target.clone()), self.ctx.clone())
                });
            decorations.push(Decoration {
                range: found.span.clone(),
                overlay: Overlay {
                    label: overlay_label(&found.target),
                    target: found.target.clone(),
                    binding: binding.id(),
                },
            });
            state.tracked.push(Tracked {
                span: found.span,
                target: found.target,
                binding,
            });
        }

        for stale in previous.into_iter().flatten() {
            tracing::debug!(span = ?stale.span, "anchor left the visible range");
            stale.binding.detach();
        }

        state.decorations = decorations.clone();
        decorations
    }

    /// Decorations from the last recompute.
    pub fn decorations(&self) -> Vec<Decoration> {
        self.lock().decorations.clone()
    }

    /// Binding of the overlay covering `position`.
    pub fn binding_at(&self, position: usize) -> Option<Arc<RenderBinding>> {
        self.lock()
            .tracked
            .iter()
            .find(|t| t.span.contains(&position))
            .map(|t| t.binding.clone())
    }

    /// Click on the overlay at `position`: fetch, then present.
    pub async fn activate<H: PresentationHost>(
        &self,
        position: usize,
        controller: &mut PresentationController<H>,
    ) -> Option<Expansion> {
        let binding = self.binding_at(position)?;
        Some(super::present_binding(&binding, controller).await)
    }

    /// Editor closed: drop every binding.
    pub fn teardown(&self) {
        let mut state = self.lock();
        state.decorations.clear();
        for tracked in state.tracked.drain(..) {
            tracked.binding.detach();
        }
    }
}

fn overlay_label(target: &AnchorTarget) -> String {
    match target.kind {
        AnchorKind::Container => format!("#{}", target.identifier),
        AnchorKind::SavedQuery => format!("Q: {}", target.identifier),
    }
}

/// Parse each visible slice and return absolute, de-duplicated anchors.
fn visible_anchors(text: &str, mut ranges: Vec<Range<usize>>) -> Vec<AnchorRef> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        let start = anchor::floor_char_boundary(text, range.start);
        let end = anchor::ceil_char_boundary(text, range.end.max(range.start));
        if start >= end {
            continue;
        }
        match merged.last_mut() {
            Some(last) if start <= last.end => last.end = last.end.max(end),
            _ => merged.push(start..end),
        }
    }

    merged
        .into_iter()
        .flat_map(|range| {
            let offset = range.start;
            anchor::parse(&text[range]).map(move |a| a.offset_by(offset))
        })
        .collect()
}
