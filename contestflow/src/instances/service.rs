//! Administrative instance operations.

use uuid::Uuid;

use super::{
    ops, ApplicationInstance, ContestInstance, ProcedureInstance, StageConfiguration,
    StageConfigurationInput, StageResult,
};
use crate::engine::Engine;
use crate::errors::Result;
use crate::events::ApplicationSubmitted;
use crate::migration::{migrate_contest, MigrationReport};
use crate::orchestrator::cascade;
use crate::templates::TemplateKey;
use crate::utils::now_utc;

/// Create, inspect and drive instances outside the event flow.
#[derive(Debug, Clone)]
pub struct InstanceService {
    engine: Engine,
}

impl InstanceService {
    /// Creates a new instance service.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    // --- procedures ---

    /// Starts a procedure from a published template.
    pub async fn create_procedure(&self, template_id: Uuid) -> Result<ProcedureInstance> {
        self.engine
            .transact(move |tables, outbox| {
                ops::create_procedure_instance(tables, outbox, template_id, now_utc())
            })
            .await
    }

    /// Returns a procedure instance.
    pub async fn get_procedure(&self, id: Uuid) -> Result<ProcedureInstance> {
        self.engine
            .read(move |tables| tables.procedure_instance(id).cloned())
            .await
    }

    /// Returns all procedure instances, oldest first.
    pub async fn list_procedures(&self) -> Result<Vec<ProcedureInstance>> {
        self.engine
            .read(|tables| {
                let mut all: Vec<_> = tables.procedure_instances().cloned().collect();
                all.sort_by_key(|p| p.created_at);
                Ok(all)
            })
            .await
    }

    /// Moves a procedure to its next stage, honouring the contests guard.
    pub async fn advance_procedure(&self, id: Uuid) -> Result<ProcedureInstance> {
        self.engine
            .transact(move |tables, outbox| ops::advance_procedure(tables, outbox, id, now_utc()))
            .await
    }

    /// Interrupts a procedure with everything below it.
    pub async fn interrupt_procedure(&self, id: Uuid, reason: impl Into<String>) -> Result<ProcedureInstance> {
        let reason = reason.into();
        self.engine
            .transact(move |tables, outbox| {
                ops::interrupt_procedure(tables, outbox, id, &reason, now_utc())
            })
            .await
    }

    // --- contests ---

    /// Starts a contest inside a procedure positioned at its `Contests` stage.
    pub async fn create_contest(
        &self,
        procedure_instance_id: Uuid,
        template_key: TemplateKey,
        configurations: Vec<StageConfigurationInput>,
    ) -> Result<ContestInstance> {
        self.engine
            .transact(move |tables, outbox| {
                ops::create_contest_instance(
                    tables,
                    outbox,
                    procedure_instance_id,
                    template_key,
                    configurations,
                    now_utc(),
                )
            })
            .await
    }

    /// Returns a contest instance.
    pub async fn get_contest(&self, id: Uuid) -> Result<ContestInstance> {
        self.engine
            .read(move |tables| tables.contest_instance(id).cloned())
            .await
    }

    /// Returns the contests of a procedure, oldest first.
    pub async fn list_contests(&self, procedure_instance_id: Uuid) -> Result<Vec<ContestInstance>> {
        self.engine
            .read(move |tables| {
                let mut contests: Vec<_> = tables
                    .contest_ids_of(procedure_instance_id)
                    .into_iter()
                    .map(|id| tables.contest_instance(id).cloned())
                    .collect::<Result<_>>()?;
                contests.sort_by_key(|c| c.created_at);
                Ok(contests)
            })
            .await
    }

    /// Returns the stage configurations of a contest.
    pub async fn contest_configurations(&self, contest_instance_id: Uuid) -> Result<Vec<StageConfiguration>> {
        self.engine
            .read(move |tables| {
                tables.contest_instance(contest_instance_id)?;
                Ok(tables.configurations_of(contest_instance_id).cloned().collect())
            })
            .await
    }

    /// Moves a contest to its next stage; at the end of the chain the contest completes.
    pub async fn advance_contest(&self, id: Uuid) -> Result<ContestInstance> {
        let contest = self
            .engine
            .transact(move |tables, outbox| ops::advance_contest(tables, outbox, id, now_utc()))
            .await?;
        if contest.is_terminal() {
            cascade::recheck_procedure(&self.engine, contest.procedure_instance_id).await?;
        }
        Ok(contest)
    }

    /// Interrupts a contest and its running applications.
    pub async fn interrupt_contest(&self, id: Uuid, reason: impl Into<String>) -> Result<ContestInstance> {
        let reason = reason.into();
        let contest = self
            .engine
            .transact(move |tables, outbox| {
                ops::interrupt_contest(tables, outbox, id, &reason, now_utc())?;
                tables.contest_instance(id).cloned()
            })
            .await?;
        cascade::recheck_procedure(&self.engine, contest.procedure_instance_id).await?;
        Ok(contest)
    }

    /// Migrates one contest to another published version of its template.
    pub async fn update_contest_template_version(
        &self,
        id: Uuid,
        target_version: u32,
    ) -> Result<MigrationReport> {
        self.engine
            .transact(move |tables, _| migrate_contest(tables, id, target_version, now_utc()))
            .await
    }

    // --- applications ---

    /// Submits an application outside the event flow.
    pub async fn submit_application(&self, submission: ApplicationSubmitted) -> Result<ApplicationInstance> {
        self.engine
            .transact(move |tables, outbox| {
                ops::submit_application(tables, outbox, submission, None, now_utc())
            })
            .await
    }

    /// Returns an application instance.
    pub async fn get_application(&self, id: Uuid) -> Result<ApplicationInstance> {
        self.engine
            .read(move |tables| tables.application_instance(id).cloned())
            .await
    }

    /// Returns the applications of a contest, oldest first.
    pub async fn list_applications(&self, contest_instance_id: Uuid) -> Result<Vec<ApplicationInstance>> {
        self.engine
            .read(move |tables| {
                let mut apps: Vec<_> = tables.applications_of(contest_instance_id).cloned().collect();
                apps.sort_by_key(|a| a.created_at);
                Ok(apps)
            })
            .await
    }

    /// Returns the stage results of an application, oldest first.
    pub async fn stage_results(&self, application_instance_id: Uuid) -> Result<Vec<StageResult>> {
        self.engine
            .read(move |tables| {
                tables.application_instance(application_instance_id)?;
                Ok(tables.results_of(application_instance_id))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ApplicationStatus, ContestStageType, ProcedureStatus, STATUS_IN_PROGRESS};
    use crate::errors::{ContestflowError, ValidationError};
    use crate::testing::{assert_application_status, assert_contest_status, fixtures};
    use crate::utils::generate_uuid;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_contest_requires_procedure_at_contests_stage() {
        let world = fixtures::published_world().await.unwrap();
        let procedure = world
            .instances
            .create_procedure(world.procedure_template.id)
            .await
            .unwrap();
        assert_eq!(procedure.status, ProcedureStatus::Active);

        let err = world.open_contest(procedure.id).await.unwrap_err();
        assert!(matches!(err, ContestflowError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_unpublished_procedure_template_cannot_be_instantiated() {
        let world = fixtures::published_world().await.unwrap();
        let draft = world
            .templates
            .create_procedure_template(crate::templates::ProcedureTemplateDraft::new(
                "Draft Programme",
                fixtures::procedure_stages(),
            ))
            .await
            .unwrap();

        let err = world.instances.create_procedure(draft.id).await.unwrap_err();
        assert!(matches!(err, ContestflowError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_stage_configurations_are_validated_and_defaulted() {
        let world = fixtures::published_world().await.unwrap();
        let procedure = world.start_procedure().await.unwrap();
        let validation = world.contest_stage(ContestStageType::Validation).unwrap();
        let expertise = world.contest_stage(ContestStageType::Expertise).unwrap();

        let foreign = world
            .open_contest_with(procedure.id, vec![StageConfigurationInput::executor(generate_uuid(), "x")])
            .await
            .unwrap_err();
        assert!(matches!(
            foreign,
            ContestflowError::Validation(ValidationError::ForeignStage { .. })
        ));

        let duplicated = world
            .open_contest_with(
                procedure.id,
                vec![
                    StageConfigurationInput::executor(validation, "a"),
                    StageConfigurationInput::executor(validation, "b"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            duplicated,
            ContestflowError::Validation(ValidationError::DuplicateStageConfiguration { .. })
        ));
        assert!(world.instances.list_contests(procedure.id).await.unwrap().is_empty());

        let contest = world
            .open_contest_with(
                procedure.id,
                vec![
                    StageConfigurationInput::executor(validation, "  "),
                    StageConfigurationInput::executor(expertise, "panel-b"),
                ],
            )
            .await
            .unwrap();
        let mut executors: Vec<String> = world
            .instances
            .contest_configurations(contest.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.executor_name)
            .collect();
        executors.sort();
        assert_eq!(executors, vec!["panel-b", "validator"]);
    }

    #[tokio::test]
    async fn test_advance_contest_completes_only_without_running_applications() {
        let world = fixtures::published_world().await.unwrap();
        let procedure = world.start_procedure().await.unwrap();
        let busy = world.open_contest(procedure.id).await.unwrap();
        let idle = world.open_contest(procedure.id).await.unwrap();
        world.submit(busy.id).await.unwrap();

        for _ in 0..2 {
            world.instances.advance_contest(busy.id).await.unwrap();
        }
        let moved = world.instances.get_contest(busy.id).await.unwrap();
        assert_contest_status(&moved, STATUS_IN_PROGRESS);
        let err = world.instances.advance_contest(busy.id).await.unwrap_err();
        assert!(matches!(err, ContestflowError::InvalidTransition(_)));

        world.publisher.clear();
        for _ in 0..3 {
            world.instances.advance_contest(idle.id).await.unwrap();
        }
        let done = world.instances.get_contest(idle.id).await.unwrap();
        assert_contest_status(&done, "Completed");
        // The other contest still runs, so the procedure stays put.
        assert!(world
            .publisher
            .events_on("orchestrator.procedure-stage-transition")
            .is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_procedure_cascades_down() {
        let world = fixtures::published_world().await.unwrap();
        let procedure = world.start_procedure().await.unwrap();
        let contest = world.open_contest(procedure.id).await.unwrap();
        let running = world.submit(contest.id).await.unwrap();
        let approved = world.submit(contest.id).await.unwrap();
        world.approve(approved.id).await.unwrap();

        let stopped = world
            .instances
            .interrupt_procedure(procedure.id, "programme cancelled")
            .await
            .unwrap();
        assert_eq!(stopped.status, ProcedureStatus::Interrupted);
        assert_eq!(stopped.current_stage_id, None);

        let contest = world.instances.get_contest(contest.id).await.unwrap();
        assert_contest_status(&contest, "Interrupted");
        assert_application_status(
            &world.instances.get_application(running.id).await.unwrap(),
            ApplicationStatus::Interrupted,
        );
        assert_application_status(
            &world.instances.get_application(approved.id).await.unwrap(),
            ApplicationStatus::Approved,
        );

        let again = world.instances.interrupt_procedure(procedure.id, "again").await;
        assert!(matches!(again, Err(ContestflowError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_update_to_current_version_is_a_noop() {
        let world = fixtures::published_world().await.unwrap();
        let procedure = world.start_procedure().await.unwrap();
        let contest = world.open_contest(procedure.id).await.unwrap();

        let report = world
            .instances
            .update_contest_template_version(contest.id, 1)
            .await
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(world.instances.get_contest(contest.id).await.unwrap(), contest);
    }

    #[tokio::test]
    async fn test_direct_submission_has_no_event_id() {
        let world = fixtures::published_world().await.unwrap();
        let procedure = world.start_procedure().await.unwrap();
        let contest = world.open_contest(procedure.id).await.unwrap();

        let application = world
            .instances
            .submit_application(ApplicationSubmitted::new(contest.id))
            .await
            .unwrap();
        assert_eq!(application.submission_event_id, None);
        assert_eq!(application.template_version, 1);
        assert!(world.instances.stage_results(application.id).await.unwrap().is_empty());
    }
}
