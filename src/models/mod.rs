//! Domain models for remote work item records.
//!
//! # Core Concepts
//!
//! - [`WorkItem`]: a read-only snapshot of a remote record. [`Container`]
//!   (an Epic) and [`Item`] (a Feature scoped under one) share this shape.
//! - [`Identity`]: a person-valued field (assignee, creator, contact roles).
//! - [`QueryRef`]: one id returned by resolving a saved query, before hydration.
//! - [`QueryResultRow`]: a hydrated saved-query row ready for display.
//!
//! Snapshots are never cached beyond the view that requested them.

mod query;
mod work_item;

pub use query::*;
pub use work_item::*;
