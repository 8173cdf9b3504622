//! Versioned, publishable procedure and contest templates.
//!
//! Templates are edited only while unpublished and uninstantiated; every edit
//! rebuilds the stage chain wholesale. Publishing enforces that at most one
//! template of a name is published at a time.

mod model;
pub(crate) mod ops;
mod service;

pub use model::{
    ContestTemplate, ContestTemplateDraft, ProcedureTemplate, ProcedureTemplateDraft, TemplateKey,
};
pub use service::TemplateService;
