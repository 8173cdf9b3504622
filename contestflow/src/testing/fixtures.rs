//! Seeded template trees and a harness to drive them.

use std::sync::Arc;
use uuid::Uuid;

use crate::chain::{build_chain, StageSpec};
use crate::core::{
    ContestStageType, ProcedureStageType, ResultStatus, STATUS_COMPLETED, STATUS_INTERRUPTED,
    STATUS_IN_PROGRESS, STATUS_NOT_STARTED,
};
use crate::engine::Engine;
use crate::errors::{ContestflowError, EntityKind, NotFoundError, Result};
use crate::events::{
    ApplicationSubmitted, CollectingPublisher, InboundEvent, IntegrationEnvelope, StageCompleted,
};
use crate::instances::{
    ApplicationInstance, ContestInstance, InstanceService, ProcedureInstance,
    StageConfigurationInput,
};
use crate::orchestrator::{HandlerOutcome, Orchestrator};
use crate::storage::{InMemoryStore, WorkflowStore};
use crate::templates::{
    ContestTemplate, ContestTemplateDraft, ProcedureTemplate, ProcedureTemplateDraft,
    TemplateService,
};
use crate::utils::{generate_uuid, now_utc};

/// Name of the seeded procedure template.
pub const PROCEDURE_NAME: &str = "Grant Programme";

/// Name of the seeded contest template.
pub const CONTEST_NAME: &str = "Research Grants";

/// Setup, Contests, Contracts.
#[must_use]
pub fn procedure_stages() -> Vec<StageSpec<ProcedureStageType>> {
    vec![
        StageSpec::new(ProcedureStageType::Setup, 1, "procedure-setup"),
        StageSpec::new(ProcedureStageType::Contests, 2, "contest-runner"),
        StageSpec::new(ProcedureStageType::Contracts, 3, "contracts-office"),
    ]
}

/// ApplicationSubmission, Validation, Expertise.
#[must_use]
pub fn contest_stages() -> Vec<StageSpec<ContestStageType>> {
    vec![
        StageSpec::new(ContestStageType::ApplicationSubmission, 1, "intake"),
        StageSpec::new(ContestStageType::Validation, 2, "validator"),
        StageSpec::new(ContestStageType::Expertise, 3, "experts"),
    ]
}

/// NotStarted, InProgress, Completed, Interrupted.
#[must_use]
pub fn status_model() -> Vec<String> {
    [STATUS_NOT_STARTED, STATUS_IN_PROGRESS, STATUS_COMPLETED, STATUS_INTERRUPTED]
        .into_iter()
        .map(String::from)
        .collect()
}

/// An unpublished procedure template with one contest template, not stored anywhere.
pub fn template_tree() -> Result<(ProcedureTemplate, Vec<ContestTemplate>)> {
    let now = now_utc();
    let procedure_id = generate_uuid();
    let procedure = ProcedureTemplate {
        id: procedure_id,
        name: PROCEDURE_NAME.to_string(),
        version: 1,
        is_published: false,
        stages: build_chain(procedure_id, &procedure_stages())?,
        created_at: now,
        updated_at: now,
    };
    let contest_id = generate_uuid();
    let contest = ContestTemplate {
        id: contest_id,
        procedure_template_id: procedure_id,
        name: CONTEST_NAME.to_string(),
        version: 1,
        is_published: false,
        status_model: status_model(),
        stages: build_chain(contest_id, &contest_stages())?,
        created_at: now,
        updated_at: now,
    };
    Ok((procedure, vec![contest]))
}

/// Services over one store with a published template tree.
#[derive(Clone)]
pub struct World {
    /// The store.
    pub store: Arc<dyn WorkflowStore>,
    /// Everything published after commit.
    pub publisher: Arc<CollectingPublisher>,
    /// Engine shared by the services.
    pub engine: Engine,
    /// Template service.
    pub templates: TemplateService,
    /// Instance service.
    pub instances: InstanceService,
    /// Event handlers.
    pub orchestrator: Orchestrator,
    /// Published procedure template.
    pub procedure_template: ProcedureTemplate,
    /// Published contest template, version 1.
    pub contest_template: ContestTemplate,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("procedure_template", &self.procedure_template.id)
            .field("contest_template", &self.contest_template.key())
            .finish_non_exhaustive()
    }
}

/// A published world on a fresh in-memory store.
pub async fn published_world() -> Result<World> {
    World::published(Arc::new(InMemoryStore::new())).await
}

impl World {
    /// Creates and publishes the seeded templates on `store`.
    pub async fn published(store: Arc<dyn WorkflowStore>) -> Result<Self> {
        let publisher = Arc::new(CollectingPublisher::new());
        let engine = Engine::new(Arc::clone(&store), publisher.clone());
        let templates = TemplateService::new(engine.clone());

        let procedure = templates
            .create_procedure_template(ProcedureTemplateDraft::new(PROCEDURE_NAME, procedure_stages()))
            .await?;
        let procedure_template = templates.publish_procedure_template(procedure.id).await?;
        let contest = templates
            .create_contest_template(
                procedure_template.id,
                ContestTemplateDraft::new(CONTEST_NAME, status_model(), contest_stages()),
            )
            .await?;
        let contest_template = templates.publish_contest_template(contest.key()).await?;
        publisher.clear();

        Ok(Self {
            store,
            instances: InstanceService::new(engine.clone()),
            orchestrator: Orchestrator::new(engine.clone()),
            publisher,
            engine,
            templates,
            procedure_template,
            contest_template,
        })
    }

    /// Id of the procedure stage with the given type.
    pub fn procedure_stage(&self, stage_type: ProcedureStageType) -> Result<Uuid> {
        self.procedure_template
            .stages
            .by_type(stage_type)
            .map(|stage| stage.id)
            .ok_or_else(|| NotFoundError::new(EntityKind::Stage, stage_type).into())
    }

    /// Id of the contest stage with the given type.
    pub fn contest_stage(&self, stage_type: ContestStageType) -> Result<Uuid> {
        self.contest_template
            .stages
            .by_type(stage_type)
            .map(|stage| stage.id)
            .ok_or_else(|| NotFoundError::new(EntityKind::Stage, stage_type).into())
    }

    /// Starts a procedure and moves it to its `Contests` stage.
    pub async fn start_procedure(&self) -> Result<ProcedureInstance> {
        let procedure = self.instances.create_procedure(self.procedure_template.id).await?;
        self.instances.advance_procedure(procedure.id).await
    }

    /// Opens a contest on the published contest template with no configurations.
    pub async fn open_contest(&self, procedure_instance_id: Uuid) -> Result<ContestInstance> {
        self.open_contest_with(procedure_instance_id, Vec::new()).await
    }

    /// Opens a contest with explicit stage configurations.
    pub async fn open_contest_with(
        &self,
        procedure_instance_id: Uuid,
        configurations: Vec<StageConfigurationInput>,
    ) -> Result<ContestInstance> {
        self.instances
            .create_contest(procedure_instance_id, self.contest_template.key(), configurations)
            .await
    }

    /// Submits an application through the event handler and returns it.
    pub async fn submit(&self, contest_instance_id: Uuid) -> Result<ApplicationInstance> {
        let envelope = IntegrationEnvelope::fresh(InboundEvent::ApplicationSubmitted(
            ApplicationSubmitted::new(contest_instance_id),
        ));
        let submission_id = envelope.integration_event_id;
        self.orchestrator.handle(envelope).await?;
        self.engine
            .read(move |tables| {
                tables
                    .application_by_submission(submission_id)
                    .cloned()
                    .ok_or_else(|| ContestflowError::storage("submission not recorded"))
            })
            .await
    }

    /// Builds a `StageCompleted` envelope.
    #[must_use]
    pub fn completion(
        application_instance_id: Uuid,
        stage_id: Uuid,
        status: ResultStatus,
    ) -> IntegrationEnvelope<InboundEvent> {
        IntegrationEnvelope::fresh(InboundEvent::StageCompleted(StageCompleted::new(
            application_instance_id,
            stage_id,
            status,
        )))
    }

    /// Reports a stage outcome through the event handler.
    pub async fn complete(
        &self,
        application_instance_id: Uuid,
        stage_id: Uuid,
        status: ResultStatus,
    ) -> Result<HandlerOutcome> {
        self.orchestrator
            .handle(Self::completion(application_instance_id, stage_id, status))
            .await
    }

    /// Drives an application through every contest stage with `Success`.
    pub async fn approve(&self, application_instance_id: Uuid) -> Result<ApplicationInstance> {
        for stage in self.contest_template.stages.stages() {
            self.complete(application_instance_id, stage.id, ResultStatus::Success)
                .await?;
        }
        self.instances.get_application(application_instance_id).await
    }
}
