//! Template store service.

use uuid::Uuid;

use super::{ops, ContestTemplate, ContestTemplateDraft, ProcedureTemplate, ProcedureTemplateDraft, TemplateKey};
use crate::engine::Engine;
use crate::errors::Result;
use crate::utils::now_utc;

/// Create, edit, publish and delete templates.
#[derive(Debug, Clone)]
pub struct TemplateService {
    engine: Engine,
}

impl TemplateService {
    /// Creates a new template service.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Creates an unpublished procedure template.
    pub async fn create_procedure_template(&self, draft: ProcedureTemplateDraft) -> Result<ProcedureTemplate> {
        self.engine
            .transact(move |tables, _| ops::create_procedure_template(tables, draft, now_utc()))
            .await
    }

    /// Replaces an unpublished procedure template.
    pub async fn update_procedure_template(
        &self,
        id: Uuid,
        draft: ProcedureTemplateDraft,
    ) -> Result<ProcedureTemplate> {
        self.engine
            .transact(move |tables, _| ops::update_procedure_template(tables, id, draft, now_utc()))
            .await
    }

    /// Publishes a procedure template.
    pub async fn publish_procedure_template(&self, id: Uuid) -> Result<ProcedureTemplate> {
        self.engine
            .transact(move |tables, _| ops::publish_procedure_template(tables, id, now_utc()))
            .await
    }

    /// Deletes a procedure template together with its contest templates.
    pub async fn delete_procedure_template(&self, id: Uuid) -> Result<()> {
        self.engine
            .transact(move |tables, _| ops::delete_procedure_template(tables, id))
            .await
    }

    /// Returns a procedure template.
    pub async fn get_procedure_template(&self, id: Uuid) -> Result<ProcedureTemplate> {
        self.engine
            .read(move |tables| tables.procedure_template(id).cloned())
            .await
    }

    /// Returns all procedure templates ordered by name and version.
    pub async fn list_procedure_templates(&self) -> Result<Vec<ProcedureTemplate>> {
        self.engine
            .read(|tables| {
                let mut templates: Vec<_> = tables.procedure_templates().cloned().collect();
                templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
                Ok(templates)
            })
            .await
    }

    /// Creates version 1 of a contest template.
    pub async fn create_contest_template(
        &self,
        procedure_template_id: Uuid,
        draft: ContestTemplateDraft,
    ) -> Result<ContestTemplate> {
        self.engine
            .transact(move |tables, _| {
                ops::create_contest_template(tables, procedure_template_id, draft, now_utc())
            })
            .await
    }

    /// Replaces an unpublished contest template version.
    pub async fn update_contest_template(
        &self,
        key: TemplateKey,
        draft: ContestTemplateDraft,
    ) -> Result<ContestTemplate> {
        self.engine
            .transact(move |tables, _| ops::update_contest_template(tables, key, draft, now_utc()))
            .await
    }

    /// Copies the latest version of a contest template into a new unpublished version.
    pub async fn create_contest_template_version(&self, id: Uuid) -> Result<ContestTemplate> {
        self.engine
            .transact(move |tables, _| ops::create_contest_template_version(tables, id, now_utc()))
            .await
    }

    /// Publishes a contest template version and announces it.
    pub async fn publish_contest_template(&self, key: TemplateKey) -> Result<ContestTemplate> {
        self.engine
            .transact(move |tables, outbox| {
                ops::publish_contest_template(tables, outbox, key, now_utc())
            })
            .await
    }

    /// Deletes a contest template version.
    pub async fn delete_contest_template(&self, key: TemplateKey) -> Result<()> {
        self.engine
            .transact(move |tables, _| ops::delete_contest_template(tables, key))
            .await
    }

    /// Returns one contest template version.
    pub async fn get_contest_template(&self, key: TemplateKey) -> Result<ContestTemplate> {
        self.engine
            .read(move |tables| tables.contest_template(key).cloned())
            .await
    }

    /// Returns the latest version of a contest template.
    pub async fn get_latest_contest_template(&self, id: Uuid) -> Result<ContestTemplate> {
        self.engine
            .read(move |tables| tables.latest_contest_template(id).cloned())
            .await
    }

    /// Returns the contest templates of a procedure template.
    pub async fn list_contest_templates(&self, procedure_template_id: Uuid) -> Result<Vec<ContestTemplate>> {
        self.engine
            .read(move |tables| {
                let mut templates: Vec<_> = tables
                    .contest_templates()
                    .filter(|t| t.procedure_template_id == procedure_template_id)
                    .cloned()
                    .collect();
                templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
                Ok(templates)
            })
            .await
    }
}
