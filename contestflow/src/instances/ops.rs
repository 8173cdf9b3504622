//! Instance operations running inside a transaction.

use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::machine::Step;
use super::{
    ApplicationInstance, ContestInstance, ProcedureInstance, StageConfiguration,
    StageConfigurationInput, StageResult,
};
use crate::chain::StageDefinition;
use crate::core::{
    ApplicationStatus, ContestStageType, ProcedureStageType, ProcedureStatus, StageType,
    STATUS_INTERRUPTED, STATUS_NOT_STARTED,
};
use crate::errors::{
    ChainValidationError, ContestflowError, EntityKind, InvalidTransitionError, NotFoundError,
    Result, ValidationError,
};
use crate::events::{
    ApplicationSubmitted, ContestInterruptedNotice, Outbox, ProcedureStageTransition,
    StageCompleted, StageStarted,
};
use crate::storage::Tables;
use crate::templates::TemplateKey;
use crate::utils::{generate_uuid, Timestamp};

fn stage_not_found(stage_id: Uuid) -> ContestflowError {
    NotFoundError::new(EntityKind::Stage, stage_id).into()
}

// ---------------------------------------------------------------------------
// Executor resolution
// ---------------------------------------------------------------------------

/// Resolves the executor for a contest stage.
///
/// Order: a configuration for the exact stage, then a configuration for the
/// stage of the same type in the contest's bound chain, then the stage default.
/// The second rule lets applications still on an older template version pick
/// up overrides that were migrated to the contest's newer version.
pub(crate) fn resolve_executor(
    tables: &Tables,
    contest: &ContestInstance,
    stage: &StageDefinition<ContestStageType>,
) -> Result<String> {
    if let Some(config) = tables
        .configurations_of(contest.id)
        .find(|c| c.stage_definition_id == stage.id)
    {
        return Ok(config.executor_name.clone());
    }

    let bound = tables.contest_template(contest.template_key())?;
    if let Some(same_type) = bound.stages.by_type(stage.stage_type) {
        if let Some(config) = tables
            .configurations_of(contest.id)
            .find(|c| c.stage_definition_id == same_type.id)
        {
            return Ok(config.executor_name.clone());
        }
    }

    Ok(stage.default_executor_name.clone())
}

fn contest_stage_started(
    tables: &Tables,
    contest: &ContestInstance,
    application_instance_id: Option<Uuid>,
    stage: &StageDefinition<ContestStageType>,
) -> Result<StageStarted> {
    Ok(StageStarted {
        procedure_instance_id: contest.procedure_instance_id,
        contest_instance_id: Some(contest.id),
        application_instance_id,
        stage_id: stage.id,
        stage_type: stage.stage_type.name().to_string(),
        executor_name: resolve_executor(tables, contest, stage)?,
    })
}

fn procedure_stage_started(
    procedure: &ProcedureInstance,
    stage: &StageDefinition<ProcedureStageType>,
) -> StageStarted {
    StageStarted {
        procedure_instance_id: procedure.id,
        contest_instance_id: None,
        application_instance_id: None,
        stage_id: stage.id,
        stage_type: stage.stage_type.name().to_string(),
        executor_name: stage.default_executor_name.clone(),
    }
}

// ---------------------------------------------------------------------------
// Procedure instances
// ---------------------------------------------------------------------------

/// Instantiates a published procedure template at its first stage.
pub(crate) fn create_procedure_instance(
    tables: &mut Tables,
    outbox: &mut Outbox,
    template_id: Uuid,
    now: Timestamp,
) -> Result<ProcedureInstance> {
    let template = tables.procedure_template(template_id)?;
    if !template.is_published {
        return Err(InvalidTransitionError::new(
            EntityKind::ProcedureTemplate,
            template_id,
            "only published templates can be instantiated",
        )
        .into());
    }
    let first = template
        .stages
        .first()
        .ok_or_else(|| ContestflowError::from(ChainValidationError::Empty))?
        .clone();

    let instance = ProcedureInstance {
        id: generate_uuid(),
        template_id,
        template_version: template.version,
        current_stage_id: Some(first.id),
        status: ProcedureStatus::Active,
        created_at: now,
        updated_at: now,
    };
    outbox.push(procedure_stage_started(&instance, &first));
    tables.put_procedure_instance(instance.clone());
    info!(procedure_instance_id = %instance.id, %template_id, "Created procedure instance");
    Ok(instance)
}

/// Decides whether a procedure may leave its current stage.
///
/// A procedure at its `Contests` stage may only move on once every owned
/// contest is terminal; violating this is an [`InvalidTransitionError`].
pub(crate) fn plan_procedure_transition(
    tables: &Tables,
    procedure_instance_id: Uuid,
) -> Result<ProcedureStageTransition> {
    let procedure = tables.procedure_instance(procedure_instance_id)?;
    let current_stage_id = procedure.active_stage()?;
    let template = tables.procedure_template(procedure.template_id)?;
    let current = template
        .stages
        .get(current_stage_id)
        .ok_or_else(|| stage_not_found(current_stage_id))?;

    if current.stage_type.is_contests() {
        let running = tables
            .contest_ids_of(procedure_instance_id)
            .into_iter()
            .filter_map(|id| tables.contest_instance(id).ok())
            .filter(|c| !c.is_terminal())
            .count();
        if running > 0 {
            return Err(InvalidTransitionError::new(
                EntityKind::ProcedureInstance,
                procedure_instance_id,
                format!("{running} contest(s) are still running"),
            )
            .into());
        }
    }

    Ok(ProcedureStageTransition {
        procedure_instance_id,
        current_stage_id,
        next_stage_id: template.stages.next_stage_id(current_stage_id),
    })
}

/// Returns a transition if the procedure is at its `Contests` stage and every contest is terminal.
pub(crate) fn procedure_ready_to_leave_contests(
    tables: &Tables,
    procedure_instance_id: Uuid,
) -> Result<Option<ProcedureStageTransition>> {
    let procedure = tables.procedure_instance(procedure_instance_id)?;
    if procedure.status != ProcedureStatus::Active {
        return Ok(None);
    }
    let Some(current_stage_id) = procedure.current_stage_id else {
        return Ok(None);
    };
    let template = tables.procedure_template(procedure.template_id)?;
    let at_contests = template
        .stages
        .get(current_stage_id)
        .is_some_and(|stage| stage.stage_type.is_contests());
    if !at_contests {
        return Ok(None);
    }

    match plan_procedure_transition(tables, procedure_instance_id) {
        Ok(transition) => Ok(Some(transition)),
        Err(ContestflowError::InvalidTransition(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Replays a transition decision on the procedure.
///
/// Returns `Ok(false)` when the procedure is no longer at the decision's stage;
/// the trigger is then a duplicate. The contests guard is checked again.
pub(crate) fn apply_procedure_transition(
    tables: &mut Tables,
    outbox: &mut Outbox,
    transition: &ProcedureStageTransition,
    now: Timestamp,
) -> Result<bool> {
    let procedure = tables.procedure_instance(transition.procedure_instance_id)?;
    if procedure.is_terminal() || procedure.current_stage_id != Some(transition.current_stage_id) {
        return Ok(false);
    }
    plan_procedure_transition(tables, transition.procedure_instance_id)?;

    let template = tables.procedure_template(procedure.template_id)?;
    let next = match transition.next_stage_id {
        Some(next_id) => Some(
            template
                .stages
                .get(next_id)
                .ok_or_else(|| ValidationError::ForeignStage {
                    stage_id: next_id,
                    template: format!("procedure template {}", template.id),
                })?
                .clone(),
        ),
        None => None,
    };

    let procedure = tables.procedure_instance_mut(transition.procedure_instance_id)?;
    match procedure.move_to(next.as_ref().map(|s| s.id), now) {
        Step::Moved { .. } => {
            if let Some(stage) = &next {
                outbox.push(procedure_stage_started(procedure, stage));
            }
        }
        Step::Finished => {}
    }
    info!(
        procedure_instance_id = %procedure.id,
        next_stage_id = ?transition.next_stage_id,
        status = %procedure.status,
        "Procedure stage advanced"
    );
    Ok(true)
}

/// Administrative advance: plans, announces and applies a procedure transition.
pub(crate) fn advance_procedure(
    tables: &mut Tables,
    outbox: &mut Outbox,
    procedure_instance_id: Uuid,
    now: Timestamp,
) -> Result<ProcedureInstance> {
    let transition = plan_procedure_transition(tables, procedure_instance_id)?;
    apply_procedure_transition(tables, outbox, &transition, now)?;
    outbox.push(transition);
    tables.procedure_instance(procedure_instance_id).cloned()
}

/// Interrupts a procedure and every non-terminal contest and application below it.
pub(crate) fn interrupt_procedure(
    tables: &mut Tables,
    outbox: &mut Outbox,
    procedure_instance_id: Uuid,
    reason: &str,
    now: Timestamp,
) -> Result<ProcedureInstance> {
    tables.procedure_instance_mut(procedure_instance_id)?.interrupt(now)?;

    for contest_id in tables.contest_ids_of(procedure_instance_id) {
        if tables.contest_instance(contest_id)?.is_terminal() {
            continue;
        }
        interrupt_contest_in_place(tables, outbox, contest_id, reason, true, now)?;
    }
    info!(%procedure_instance_id, reason, "Procedure interrupted");
    tables.procedure_instance(procedure_instance_id).cloned()
}

// ---------------------------------------------------------------------------
// Contest instances
// ---------------------------------------------------------------------------

/// Instantiates a published contest template inside a procedure at its `Contests` stage.
pub(crate) fn create_contest_instance(
    tables: &mut Tables,
    outbox: &mut Outbox,
    procedure_instance_id: Uuid,
    template_key: TemplateKey,
    configurations: Vec<StageConfigurationInput>,
    now: Timestamp,
) -> Result<ContestInstance> {
    let procedure = tables.procedure_instance(procedure_instance_id)?;
    let current_stage_id = procedure.active_stage()?;
    let procedure_template = tables.procedure_template(procedure.template_id)?;
    if procedure_template.contests_stage_id() != Some(current_stage_id) {
        return Err(InvalidTransitionError::new(
            EntityKind::ProcedureInstance,
            procedure_instance_id,
            "contests can only be created while the procedure is at its Contests stage",
        )
        .into());
    }

    let template = tables.contest_template(template_key)?;
    if !template.is_published {
        return Err(InvalidTransitionError::new(
            EntityKind::ContestTemplate,
            template_key.id,
            "only published templates can be instantiated",
        )
        .into());
    }
    if template.procedure_template_id != procedure.template_id {
        return Err(ValidationError::ForeignContestTemplate {
            contest_template_id: template_key.id,
            procedure_template_id: procedure.template_id,
        }
        .into());
    }

    let contest_id = generate_uuid();
    let mut seen = HashSet::new();
    let mut stored = Vec::with_capacity(configurations.len());
    for input in configurations {
        let stage = template.stages.get(input.stage_definition_id).ok_or_else(|| {
            ValidationError::ForeignStage {
                stage_id: input.stage_definition_id,
                template: format!("contest template {template_key}"),
            }
        })?;
        if !seen.insert(stage.id) {
            return Err(ValidationError::DuplicateStageConfiguration { stage_id: stage.id }.into());
        }
        let executor_name = input
            .executor_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| stage.default_executor_name.clone());
        stored.push(StageConfiguration {
            id: generate_uuid(),
            contest_instance_id: contest_id,
            stage_definition_id: stage.id,
            start_date: input.start_date,
            end_date: input.end_date,
            executor_name,
        });
    }

    let first = template
        .stages
        .first()
        .ok_or_else(|| ContestflowError::from(ChainValidationError::Empty))?
        .clone();
    let contest = ContestInstance {
        id: contest_id,
        procedure_instance_id,
        template_id: template.id,
        template_version: template.version,
        current_stage_id: Some(first.id),
        status: template
            .status_model
            .first()
            .cloned()
            .unwrap_or_else(|| STATUS_NOT_STARTED.to_string()),
        interruption_reason: None,
        created_at: now,
        updated_at: now,
    };

    tables.put_contest_instance(contest.clone());
    for config in stored {
        tables.put_stage_configuration(config);
    }
    outbox.push(contest_stage_started(tables, &contest, None, &first)?);
    info!(contest_instance_id = %contest.id, %procedure_instance_id, template = %template_key, "Created contest instance");
    Ok(contest)
}

/// Administrative advance of a contest along its own chain.
///
/// Completing the contest requires every application to be terminal.
pub(crate) fn advance_contest(
    tables: &mut Tables,
    outbox: &mut Outbox,
    contest_instance_id: Uuid,
    now: Timestamp,
) -> Result<ContestInstance> {
    let contest = tables.contest_instance(contest_instance_id)?;
    let current = contest.active_stage()?;
    let template = tables.contest_template(contest.template_key())?.clone();

    if template.stages.next_stage_id(current).is_none()
        && tables.applications_of(contest_instance_id).any(|a| !a.is_terminal())
    {
        return Err(InvalidTransitionError::new(
            EntityKind::ContestInstance,
            contest_instance_id,
            "applications are still running",
        )
        .into());
    }

    let contest = tables.contest_instance_mut(contest_instance_id)?;
    let step = contest.advance(&template, now)?;
    let contest = contest.clone();
    if let Step::Moved { stage_id } = step {
        let stage = template.stages.get(stage_id).ok_or_else(|| stage_not_found(stage_id))?;
        outbox.push(contest_stage_started(tables, &contest, None, stage)?);
    }
    Ok(contest)
}

/// Completes the contest if every application is terminal and the status model permits it.
///
/// Returns whether the contest was completed. Repeated calls on a contest
/// that does not qualify leave it untouched.
pub(crate) fn complete_contest_if_done(
    tables: &mut Tables,
    contest_instance_id: Uuid,
    now: Timestamp,
) -> Result<bool> {
    let contest = tables.contest_instance(contest_instance_id)?;
    if contest.is_terminal() {
        return Ok(false);
    }
    let template = tables.contest_template(contest.template_key())?.clone();
    if !template.permits_completion() {
        return Ok(false);
    }
    if tables.applications_of(contest_instance_id).any(|a| !a.is_terminal()) {
        return Ok(false);
    }

    tables
        .contest_instance_mut(contest_instance_id)?
        .complete(&template, now)?;
    info!(%contest_instance_id, "Contest completed");
    Ok(true)
}

fn interrupt_contest_in_place(
    tables: &mut Tables,
    outbox: &mut Outbox,
    contest_instance_id: Uuid,
    reason: &str,
    force: bool,
    now: Timestamp,
) -> Result<()> {
    let key = tables.contest_instance(contest_instance_id)?.template_key();
    let template = tables.contest_template(key)?.clone();
    let contest = tables.contest_instance_mut(contest_instance_id)?;
    contest.interrupt(&template, reason, force, now)?;
    let procedure_instance_id = contest.procedure_instance_id;

    let mut interrupted = 0;
    for app_id in tables.application_ids_of(contest_instance_id) {
        if tables.application_instance_mut(app_id)?.interrupt(now) {
            interrupted += 1;
        }
    }

    outbox.push(ContestInterruptedNotice {
        contest_instance_id,
        procedure_instance_id,
        reason: reason.to_string(),
    });
    info!(%contest_instance_id, reason, applications = interrupted, "Contest interrupted");
    Ok(())
}

/// Interrupts a contest and its non-terminal applications.
///
/// Returns `Ok(false)` if the contest is already interrupted.
pub(crate) fn interrupt_contest(
    tables: &mut Tables,
    outbox: &mut Outbox,
    contest_instance_id: Uuid,
    reason: &str,
    now: Timestamp,
) -> Result<bool> {
    let contest = tables.contest_instance(contest_instance_id)?;
    if contest.status == STATUS_INTERRUPTED {
        return Ok(false);
    }
    interrupt_contest_in_place(tables, outbox, contest_instance_id, reason, false, now)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Application instances
// ---------------------------------------------------------------------------

/// Creates an application at the first stage of its contest's bound template.
///
/// With a `submission_event_id` that already created an application, the
/// call fails with [`ContestflowError::DuplicateEvent`].
pub(crate) fn submit_application(
    tables: &mut Tables,
    outbox: &mut Outbox,
    submission: ApplicationSubmitted,
    submission_event_id: Option<Uuid>,
    now: Timestamp,
) -> Result<ApplicationInstance> {
    if let Some(event_id) = submission_event_id {
        if tables.application_by_submission(event_id).is_some() {
            return Err(ContestflowError::DuplicateEvent {
                integration_event_id: event_id,
            });
        }
    }

    let contest = tables.contest_instance(submission.contest_instance_id)?.clone();
    if contest.is_terminal() {
        return Err(InvalidTransitionError::new(
            EntityKind::ContestInstance,
            contest.id,
            format!("cannot submit applications to a contest that is {}", contest.status),
        )
        .into());
    }
    let template = tables.contest_template(contest.template_key())?;
    let first = template
        .stages
        .first()
        .ok_or_else(|| ContestflowError::from(ChainValidationError::Empty))?
        .clone();

    let application = ApplicationInstance {
        id: generate_uuid(),
        contest_instance_id: contest.id,
        template_id: contest.template_id,
        template_version: contest.template_version,
        current_stage_id: Some(first.id),
        status: ApplicationStatus::Submitted,
        external_application_id: submission.external_application_id,
        application_data: submission.application_data,
        submission_event_id,
        created_at: now,
        updated_at: now,
    };

    outbox.push(contest_stage_started(tables, &contest, Some(application.id), &first)?);
    tables.put_application_instance(application.clone());
    info!(application_instance_id = %application.id, contest_instance_id = %contest.id, "Application submitted");
    Ok(application)
}

/// Records a stage result and advances the application.
///
/// The idempotency key is checked before the stage match, so a late
/// redelivery of an already applied result is reported as a duplicate.
pub(crate) fn record_stage_result(
    tables: &mut Tables,
    outbox: &mut Outbox,
    integration_event_id: Uuid,
    completed: StageCompleted,
    now: Timestamp,
) -> Result<ApplicationInstance> {
    if tables.has_integration_event(integration_event_id) {
        return Err(ContestflowError::DuplicateEvent { integration_event_id });
    }

    let application = tables.application_instance(completed.application_instance_id)?;
    let current = application.active_stage()?;
    if current != completed.stage_id {
        warn!(
            application_instance_id = %application.id,
            expected = %current,
            reported = %completed.stage_id,
            "Stage completion does not match the current stage"
        );
        return Err(InvalidTransitionError::new(
            EntityKind::ApplicationInstance,
            application.id,
            format!("stage {} is not the current stage {current}", completed.stage_id),
        )
        .into());
    }
    let template = tables.contest_template(application.template_key())?.clone();

    tables.insert_stage_result(StageResult {
        id: generate_uuid(),
        application_instance_id: completed.application_instance_id,
        stage_definition_id: completed.stage_id,
        result_status: completed.result_status,
        result_data: completed.result_data,
        completed_at: now,
        integration_event_id,
    })?;

    let application = tables.application_instance_mut(completed.application_instance_id)?;
    let step = application.apply_result(&template.stages, completed.result_status, now)?;
    let application = application.clone();

    if let Step::Moved { stage_id } = step {
        let contest = tables.contest_instance(application.contest_instance_id)?;
        let stage = template.stages.get(stage_id).ok_or_else(|| stage_not_found(stage_id))?;
        outbox.push(contest_stage_started(tables, contest, Some(application.id), stage)?);
    }
    info!(
        application_instance_id = %application.id,
        result = %completed.result_status,
        status = %application.status,
        "Stage result recorded"
    );
    Ok(application)
}
