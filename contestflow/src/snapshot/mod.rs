//! Snapshot export and import of procedure template trees.
//!
//! An export is a [`SnapshotDocument`]: the procedure template, its contest
//! templates and their stage chains with explicit links, guarded by a
//! checksum. Import validates the document, then clones it under fresh
//! identities as unpublished version 1 templates.

mod clone;
mod document;
mod service;

pub use clone::{clone_tree, imported_name, ClonedTree};
pub use document::{
    ContestTemplateSnapshot, ProcedureTemplateSnapshot, SnapshotDocument, EXPORT_VERSION,
};
pub use service::SnapshotService;
