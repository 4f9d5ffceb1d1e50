//! Inline Azure DevOps references for plain-text documents.
//!
//! Documents embed `<<#123>>` (a work item) and `<<Q#path-or-id>>` (a saved
//! query) anchors. This crate parses them, fetches and hydrates the remote
//! records, and drives two render surfaces over the same text:
//!
//! - [`render::ReadModeRenderer`]: a post-processing pass over a rendered
//!   document tree that swaps anchor code spans for lazy expandable controls.
//! - [`render::LiveModeRenderer`]: an overlay recomputed on every edit or
//!   viewport change, never touching the text buffer.
//!
//! Both open detail views through a [`present::PresentationController`].

pub mod anchor;
pub mod client;
pub mod config;
pub mod hydrate;
pub mod markdown;
pub mod models;
pub mod present;
pub mod render;
