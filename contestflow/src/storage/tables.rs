//! The persisted state layout.
//!
//! One map per relation plus the unique indexes the engine relies on.
//! Referential and chain integrity are enforced by the callers, not here.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{ContestflowError, EntityKind, NotFoundError, Result};
use crate::instances::{
    ApplicationInstance, ContestInstance, ProcedureInstance, StageConfiguration, StageResult,
};
use crate::templates::{ContestTemplate, ProcedureTemplate, TemplateKey};

/// One relation. Cloned tables share each relation until it is first written.
type Relation<K, V> = Arc<HashMap<K, V>>;

/// All relations of the workflow store.
///
/// Cloning is cheap: a clone copies a relation only when it mutates it, so a
/// transaction pays for the relations it writes and nothing else.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    procedure_templates: Relation<Uuid, ProcedureTemplate>,
    contest_templates: Relation<TemplateKey, ContestTemplate>,
    procedure_instances: Relation<Uuid, ProcedureInstance>,
    contest_instances: Relation<Uuid, ContestInstance>,
    application_instances: Relation<Uuid, ApplicationInstance>,
    stage_configurations: Relation<Uuid, StageConfiguration>,
    stage_results: Relation<Uuid, StageResult>,
    // unique: integration event id -> stage result id
    stage_results_by_event: Relation<Uuid, Uuid>,
    // unique: submission event id -> application id
    applications_by_submission: Relation<Uuid, Uuid>,
}

impl Tables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- procedure templates ---

    /// Looks up a procedure template.
    pub fn procedure_template(&self, id: Uuid) -> Result<&ProcedureTemplate> {
        self.procedure_templates
            .get(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ProcedureTemplate, id).into())
    }

    /// Looks up a procedure template for mutation.
    pub fn procedure_template_mut(&mut self, id: Uuid) -> Result<&mut ProcedureTemplate> {
        Arc::make_mut(&mut self.procedure_templates)
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ProcedureTemplate, id).into())
    }

    /// Inserts or replaces a procedure template.
    pub fn put_procedure_template(&mut self, template: ProcedureTemplate) {
        Arc::make_mut(&mut self.procedure_templates).insert(template.id, template);
    }

    /// Removes a procedure template.
    pub fn remove_procedure_template(&mut self, id: Uuid) -> Option<ProcedureTemplate> {
        Arc::make_mut(&mut self.procedure_templates).remove(&id)
    }

    /// Iterates over every procedure template.
    pub fn procedure_templates(&self) -> impl Iterator<Item = &ProcedureTemplate> {
        self.procedure_templates.values()
    }

    /// Iterates mutably over every procedure template.
    pub fn procedure_templates_mut(&mut self) -> impl Iterator<Item = &mut ProcedureTemplate> {
        Arc::make_mut(&mut self.procedure_templates).values_mut()
    }

    // --- contest templates ---

    /// Looks up one contest template version.
    pub fn contest_template(&self, key: TemplateKey) -> Result<&ContestTemplate> {
        self.contest_templates.get(&key).ok_or_else(|| {
            NotFoundError::version(EntityKind::ContestTemplate, key.id, key.version).into()
        })
    }

    /// Looks up one contest template version for mutation.
    pub fn contest_template_mut(&mut self, key: TemplateKey) -> Result<&mut ContestTemplate> {
        Arc::make_mut(&mut self.contest_templates).get_mut(&key).ok_or_else(|| {
            NotFoundError::version(EntityKind::ContestTemplate, key.id, key.version).into()
        })
    }

    /// Returns the highest version of a contest template.
    pub fn latest_contest_template(&self, id: Uuid) -> Result<&ContestTemplate> {
        self.contest_templates
            .values()
            .filter(|t| t.id == id)
            .max_by_key(|t| t.version)
            .ok_or_else(|| NotFoundError::new(EntityKind::ContestTemplate, id).into())
    }

    /// Inserts or replaces a contest template version.
    pub fn put_contest_template(&mut self, template: ContestTemplate) {
        Arc::make_mut(&mut self.contest_templates).insert(template.key(), template);
    }

    /// Removes a contest template version.
    pub fn remove_contest_template(&mut self, key: TemplateKey) -> Option<ContestTemplate> {
        Arc::make_mut(&mut self.contest_templates).remove(&key)
    }

    /// Iterates over every contest template version.
    pub fn contest_templates(&self) -> impl Iterator<Item = &ContestTemplate> {
        self.contest_templates.values()
    }

    /// Iterates mutably over every contest template version.
    pub fn contest_templates_mut(&mut self) -> impl Iterator<Item = &mut ContestTemplate> {
        Arc::make_mut(&mut self.contest_templates).values_mut()
    }

    // --- procedure instances ---

    /// Looks up a procedure instance.
    pub fn procedure_instance(&self, id: Uuid) -> Result<&ProcedureInstance> {
        self.procedure_instances
            .get(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ProcedureInstance, id).into())
    }

    /// Looks up a procedure instance for mutation.
    pub fn procedure_instance_mut(&mut self, id: Uuid) -> Result<&mut ProcedureInstance> {
        Arc::make_mut(&mut self.procedure_instances)
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ProcedureInstance, id).into())
    }

    /// Inserts or replaces a procedure instance.
    pub fn put_procedure_instance(&mut self, instance: ProcedureInstance) {
        Arc::make_mut(&mut self.procedure_instances).insert(instance.id, instance);
    }

    /// Iterates over every procedure instance.
    pub fn procedure_instances(&self) -> impl Iterator<Item = &ProcedureInstance> {
        self.procedure_instances.values()
    }

    // --- contest instances ---

    /// Looks up a contest instance.
    pub fn contest_instance(&self, id: Uuid) -> Result<&ContestInstance> {
        self.contest_instances
            .get(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ContestInstance, id).into())
    }

    /// Looks up a contest instance for mutation.
    pub fn contest_instance_mut(&mut self, id: Uuid) -> Result<&mut ContestInstance> {
        Arc::make_mut(&mut self.contest_instances)
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ContestInstance, id).into())
    }

    /// Inserts or replaces a contest instance.
    pub fn put_contest_instance(&mut self, instance: ContestInstance) {
        Arc::make_mut(&mut self.contest_instances).insert(instance.id, instance);
    }

    /// Iterates over every contest instance.
    pub fn contest_instances(&self) -> impl Iterator<Item = &ContestInstance> {
        self.contest_instances.values()
    }

    /// Returns the ids of the contests owned by a procedure.
    #[must_use]
    pub fn contest_ids_of(&self, procedure_instance_id: Uuid) -> Vec<Uuid> {
        self.contest_instances
            .values()
            .filter(|c| c.procedure_instance_id == procedure_instance_id)
            .map(|c| c.id)
            .collect()
    }

    // --- application instances ---

    /// Looks up an application instance.
    pub fn application_instance(&self, id: Uuid) -> Result<&ApplicationInstance> {
        self.application_instances
            .get(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ApplicationInstance, id).into())
    }

    /// Looks up an application instance for mutation.
    pub fn application_instance_mut(&mut self, id: Uuid) -> Result<&mut ApplicationInstance> {
        Arc::make_mut(&mut self.application_instances)
            .get_mut(&id)
            .ok_or_else(|| NotFoundError::new(EntityKind::ApplicationInstance, id).into())
    }

    /// Inserts or replaces an application instance, maintaining the submission index.
    pub fn put_application_instance(&mut self, instance: ApplicationInstance) {
        if let Some(event_id) = instance.submission_event_id {
            Arc::make_mut(&mut self.applications_by_submission).insert(event_id, instance.id);
        }
        Arc::make_mut(&mut self.application_instances).insert(instance.id, instance);
    }

    /// Finds the application created by a submission event.
    #[must_use]
    pub fn application_by_submission(&self, integration_event_id: Uuid) -> Option<&ApplicationInstance> {
        self.applications_by_submission
            .get(&integration_event_id)
            .and_then(|id| self.application_instances.get(id))
    }

    /// Iterates over the applications of one contest.
    pub fn applications_of(
        &self,
        contest_instance_id: Uuid,
    ) -> impl Iterator<Item = &ApplicationInstance> {
        self.application_instances
            .values()
            .filter(move |a| a.contest_instance_id == contest_instance_id)
    }

    /// Returns the ids of the applications owned by a contest.
    #[must_use]
    pub fn application_ids_of(&self, contest_instance_id: Uuid) -> Vec<Uuid> {
        self.applications_of(contest_instance_id).map(|a| a.id).collect()
    }

    /// Returns true if any instance references the contest template id.
    #[must_use]
    pub fn contest_template_in_use(&self, key: TemplateKey) -> bool {
        self.contest_instances
            .values()
            .any(|c| c.template_key() == key)
            || self
                .application_instances
                .values()
                .any(|a| a.template_key() == key)
    }

    /// Returns true if any procedure instance references the template.
    #[must_use]
    pub fn procedure_template_in_use(&self, id: Uuid) -> bool {
        self.procedure_instances.values().any(|p| p.template_id == id)
    }

    // --- stage configurations ---

    /// Inserts or replaces a stage configuration.
    pub fn put_stage_configuration(&mut self, configuration: StageConfiguration) {
        Arc::make_mut(&mut self.stage_configurations)
            .insert(configuration.id, configuration);
    }

    /// Iterates over the stage configurations of one contest.
    pub fn configurations_of(
        &self,
        contest_instance_id: Uuid,
    ) -> impl Iterator<Item = &StageConfiguration> {
        self.stage_configurations
            .values()
            .filter(move |c| c.contest_instance_id == contest_instance_id)
    }

    /// Iterates mutably over the stage configurations of one contest.
    pub fn configurations_of_mut(
        &mut self,
        contest_instance_id: Uuid,
    ) -> impl Iterator<Item = &mut StageConfiguration> {
        Arc::make_mut(&mut self.stage_configurations)
            .values_mut()
            .filter(move |c| c.contest_instance_id == contest_instance_id)
    }

    // --- stage results ---

    /// Returns true if a stage result with this idempotency key exists.
    #[must_use]
    pub fn has_integration_event(&self, integration_event_id: Uuid) -> bool {
        self.stage_results_by_event.contains_key(&integration_event_id)
    }

    /// Records a stage result, enforcing idempotency-key uniqueness.
    pub fn insert_stage_result(&mut self, result: StageResult) -> Result<()> {
        if self.has_integration_event(result.integration_event_id) {
            return Err(ContestflowError::DuplicateEvent {
                integration_event_id: result.integration_event_id,
            });
        }
        Arc::make_mut(&mut self.stage_results_by_event)
            .insert(result.integration_event_id, result.id);
        Arc::make_mut(&mut self.stage_results).insert(result.id, result);
        Ok(())
    }

    /// Returns the results of one application, oldest first.
    #[must_use]
    pub fn results_of(&self, application_instance_id: Uuid) -> Vec<StageResult> {
        let mut results: Vec<StageResult> = self
            .stage_results
            .values()
            .filter(|r| r.application_instance_id == application_instance_id)
            .cloned()
            .collect();
        results.sort_by_key(|r| r.completed_at);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResultStatus;
    use crate::utils::now_utc;

    fn result(event_id: Uuid) -> StageResult {
        StageResult {
            id: Uuid::new_v4(),
            application_instance_id: Uuid::new_v4(),
            stage_definition_id: Uuid::new_v4(),
            result_status: ResultStatus::Success,
            result_data: None,
            completed_at: now_utc(),
            integration_event_id: event_id,
        }
    }

    #[test]
    fn test_duplicate_integration_event_is_rejected() {
        let mut tables = Tables::new();
        let event_id = Uuid::new_v4();
        tables.insert_stage_result(result(event_id)).unwrap();

        let err = tables.insert_stage_result(result(event_id)).unwrap_err();
        assert!(matches!(
            err,
            ContestflowError::DuplicateEvent { integration_event_id } if integration_event_id == event_id
        ));
        assert!(tables.has_integration_event(event_id));
    }

    #[test]
    fn test_clone_copies_only_written_relations() {
        let mut committed = Tables::new();
        committed.insert_stage_result(result(Uuid::new_v4())).unwrap();

        let mut working = committed.clone();
        working.insert_stage_result(result(Uuid::new_v4())).unwrap();
        assert!(Arc::ptr_eq(&committed.procedure_instances, &working.procedure_instances));
        assert!(!Arc::ptr_eq(&committed.stage_results, &working.stage_results));
        assert_eq!(committed.stage_results.len(), 1);
        assert_eq!(working.stage_results.len(), 2);
    }

    #[test]
    fn test_missing_entities_are_not_found() {
        let tables = Tables::new();
        assert!(matches!(
            tables.procedure_instance(Uuid::new_v4()),
            Err(ContestflowError::NotFound(_))
        ));
        let err = tables
            .contest_template(TemplateKey::new(Uuid::nil(), 3))
            .unwrap_err();
        assert!(err.to_string().contains("@v3"));
    }
}
