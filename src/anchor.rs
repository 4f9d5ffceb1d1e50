//! Anchor token parsing and insertion.
//!
//! Two token shapes are recognized:
//!
//! ```text
//! <<#123>>            work item (container) reference, decimal id
//! <<Q#Shared/My Bugs>> saved query reference, id or hierarchical path
//! ```
//!
//! Anything that does not match is left alone as ordinary prose.

use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use regex::{CaptureMatches, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const OPEN: &str = "<<";
const CLOSE: &str = ">>";

fn anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Leftmost-first alternation gives non-overlapping, earliest-wins matches.
    // A query identifier never contains `>>` or a line break, nor ends in `>`.
    RE.get_or_init(|| {
        Regex::new(r"<<(?:#([0-9]+)|Q#((?:[^>\n]|>[^>\n])+?))>>").expect("anchor pattern is valid")
    })
}

/// What an anchor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// `<<#N>>`: a container work item by numeric id.
    Container,
    /// `<<Q#S>>`: a saved query by id or path.
    SavedQuery,
}

impl AnchorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::SavedQuery => "saved_query",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "container" => Some(Self::Container),
            "saved_query" => Some(Self::SavedQuery),
            _ => None,
        }
    }
}

/// Kind and identifier of an anchor, independent of where it appears.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorTarget {
    pub kind: AnchorKind,
    pub identifier: String,
}

/// Rejected anchor construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidAnchor {
    #[error("saved query identifier must not be empty")]
    EmptyIdentifier,

    #[error("saved query identifier must not contain '>>' or a line break: {0}")]
    ForbiddenSequence(String),

    #[error("work item id must be a decimal number: {0}")]
    NotNumeric(String),
}

impl AnchorTarget {
    pub fn container(id: u64) -> Self {
        Self {
            kind: AnchorKind::Container,
            identifier: id.to_string(),
        }
    }

    pub fn saved_query(identifier: impl Into<String>) -> Result<Self, InvalidAnchor> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(InvalidAnchor::EmptyIdentifier);
        }
        if identifier.contains(CLOSE) || identifier.contains('\n') || identifier.ends_with('>') {
            return Err(InvalidAnchor::ForbiddenSequence(identifier));
        }
        Ok(Self {
            kind: AnchorKind::SavedQuery,
            identifier,
        })
    }

    /// Build a target from a kind and raw identifier, validating the identifier.
    pub fn new(kind: AnchorKind, identifier: &str) -> Result<Self, InvalidAnchor> {
        match kind {
            AnchorKind::Container => identifier
                .parse::<u64>()
                .ok()
                .filter(|_| identifier.bytes().all(|b| b.is_ascii_digit()))
                .map(|_| Self {
                    kind,
                    identifier: identifier.to_string(),
                })
                .ok_or_else(|| InvalidAnchor::NotNumeric(identifier.to_string())),
            AnchorKind::SavedQuery => Self::saved_query(identifier),
        }
    }

    /// Numeric id for container anchors.
    pub fn container_id(&self) -> Option<i64> {
        match self.kind {
            AnchorKind::Container => self.identifier.parse().ok(),
            AnchorKind::SavedQuery => None,
        }
    }
}

impl fmt::Display for AnchorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AnchorKind::Container => write!(f, "{OPEN}#{}{CLOSE}", self.identifier),
            AnchorKind::SavedQuery => write!(f, "{OPEN}Q#{}{CLOSE}", self.identifier),
        }
    }
}

/// One anchor occurrence found in a text buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnchorRef {
    pub target: AnchorTarget,
    /// Byte offsets of the whole token, delimiters included.
    pub span: Range<usize>,
}

impl AnchorRef {
    pub fn kind(&self) -> AnchorKind {
        self.target.kind
    }

    pub fn identifier(&self) -> &str {
        &self.target.identifier
    }

    /// Shift the span by `offset`, for slices cut out of a larger buffer.
    pub fn offset_by(mut self, offset: usize) -> Self {
        self.span = (self.span.start + offset)..(self.span.end + offset);
        self
    }
}

/// Lazy iterator over the anchors of a text, in ascending start order.
///
/// Restart by calling [`parse`] again; the text is never modified.
pub struct Anchors<'t> {
    inner: CaptureMatches<'static, 't>,
}

impl Iterator for Anchors<'_> {
    type Item = AnchorRef;

    fn next(&mut self) -> Option<AnchorRef> {
        let caps = self.inner.next()?;
        let whole = caps.get(0)?;
        let target = match (caps.get(1), caps.get(2)) {
            (Some(id), _) => AnchorTarget {
                kind: AnchorKind::Container,
                identifier: id.as_str().to_string(),
            },
            (None, Some(query)) => AnchorTarget {
                kind: AnchorKind::SavedQuery,
                identifier: query.as_str().to_string(),
            },
            (None, None) => return None,
        };
        Some(AnchorRef {
            target,
            span: whole.range(),
        })
    }
}

/// Scan `text` for anchor tokens.
pub fn parse(text: &str) -> Anchors<'_> {
    Anchors {
        inner: anchor_regex().captures_iter(text),
    }
}

/// The single anchor that makes up all of `text` (surrounding whitespace
/// ignored), if there is exactly one.
pub fn parse_exact(text: &str) -> Option<AnchorTarget> {
    let trimmed = text.trim();
    let mut anchors = parse(trimmed);
    let first = anchors.next()?;
    if first.span == (0..trimmed.len()) {
        Some(first.target)
    } else {
        None
    }
}

/// Replace `selection` in `text` with the token for `target`.
///
/// Returns the byte span the token now occupies. The selection is clamped to
/// the buffer and widened to character boundaries.
pub fn insert_anchor(text: &mut String, selection: Range<usize>, target: &AnchorTarget) -> Range<usize> {
    let start = floor_char_boundary(text, selection.start.min(text.len()));
    let end = if selection.end <= selection.start {
        start
    } else {
        ceil_char_boundary(text, selection.end.clamp(start, text.len()))
    };
    let token = target.to_string();
    text.replace_range(start..end, &token);
    start..start + token.len()
}

/// Largest char boundary at or below `index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `index`.
pub fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
