//! One handler per inbound event kind.

use tracing::{debug, info};
use uuid::Uuid;

use super::{cascade, HandlerOutcome, Orchestrator};
use crate::errors::{ContestflowError, Result};
use crate::events::{
    ApplicationSubmitted, ContestTemplateVersionChanged, InterruptContest, ProcedureStageTransition,
    StageCompleted,
};
use crate::instances::ops;
use crate::migration::{contests_to_migrate, migrate_contest};
use crate::templates::TemplateKey;
use crate::utils::now_utc;

fn absorb_duplicate(result: Result<HandlerOutcome>) -> Result<HandlerOutcome> {
    match result {
        Err(ContestflowError::DuplicateEvent { .. }) => Ok(HandlerOutcome::Duplicate),
        other => other,
    }
}

impl Orchestrator {
    /// Creates an application at the first stage of its contest.
    pub async fn on_application_submitted(
        &self,
        integration_event_id: Uuid,
        event: ApplicationSubmitted,
    ) -> Result<HandlerOutcome> {
        let result = self
            .engine
            .transact(move |tables, outbox| {
                ops::submit_application(tables, outbox, event, Some(integration_event_id), now_utc())
            })
            .await
            .map(|_| HandlerOutcome::Applied);
        absorb_duplicate(result)
    }

    /// Records a stage result, advances the application and cascades upward.
    ///
    /// The application and its contest change in one transaction. The
    /// procedure re-check runs in a second one.
    pub async fn on_stage_completed(
        &self,
        integration_event_id: Uuid,
        event: StageCompleted,
    ) -> Result<HandlerOutcome> {
        let application_instance_id = event.application_instance_id;
        let result = self
            .engine
            .transact(move |tables, outbox| {
                let now = now_utc();
                let application =
                    ops::record_stage_result(tables, outbox, integration_event_id, event, now)?;
                let contest_completed = application.is_terminal()
                    && ops::complete_contest_if_done(tables, application.contest_instance_id, now)?;
                let procedure_instance_id = tables
                    .contest_instance(application.contest_instance_id)?
                    .procedure_instance_id;
                Ok(contest_completed.then_some(procedure_instance_id))
            })
            .await;

        match result {
            Ok(Some(procedure_instance_id)) => {
                cascade::recheck_procedure(&self.engine, procedure_instance_id).await?;
                Ok(HandlerOutcome::Applied)
            }
            Ok(None) => Ok(HandlerOutcome::Applied),
            Err(ContestflowError::DuplicateEvent { .. }) => {
                self.finish_interrupted_cascade(application_instance_id).await?;
                Ok(HandlerOutcome::Duplicate)
            }
            Err(err) => Err(err),
        }
    }

    // A redelivery after the first transaction committed but the procedure
    // re-check failed must still reach the procedure.
    async fn finish_interrupted_cascade(&self, application_instance_id: Uuid) -> Result<()> {
        let procedure = self
            .engine
            .read(move |tables| {
                let application = tables.application_instance(application_instance_id)?;
                let contest = tables.contest_instance(application.contest_instance_id)?;
                Ok(contest.is_terminal().then_some(contest.procedure_instance_id))
            })
            .await?;
        if let Some(procedure_instance_id) = procedure {
            debug!(%application_instance_id, "Re-checking procedure after duplicate completion");
            cascade::recheck_procedure(&self.engine, procedure_instance_id).await?;
        }
        Ok(())
    }

    /// Interrupts a contest and its running applications, then re-checks the procedure.
    pub async fn on_contest_interrupted(
        &self,
        _integration_event_id: Uuid,
        event: InterruptContest,
    ) -> Result<HandlerOutcome> {
        let contest_instance_id = event.contest_instance_id;
        let (changed, procedure_instance_id) = self
            .engine
            .transact(move |tables, outbox| {
                let changed = ops::interrupt_contest(
                    tables,
                    outbox,
                    contest_instance_id,
                    &event.reason,
                    now_utc(),
                )?;
                let procedure_instance_id = tables.contest_instance(contest_instance_id)?.procedure_instance_id;
                Ok((changed, procedure_instance_id))
            })
            .await?;

        cascade::recheck_procedure(&self.engine, procedure_instance_id).await?;
        Ok(if changed {
            HandlerOutcome::Applied
        } else {
            HandlerOutcome::Duplicate
        })
    }

    /// Migrates every running contest bound to the template onto the new version.
    ///
    /// A notice for a version that is no longer published is stale and absorbed.
    pub async fn on_contest_template_version_changed(
        &self,
        _integration_event_id: Uuid,
        event: ContestTemplateVersionChanged,
    ) -> Result<HandlerOutcome> {
        let ContestTemplateVersionChanged {
            contest_template_id,
            new_version,
        } = event;
        self.engine
            .transact(move |tables, _| {
                let target = tables.contest_template(TemplateKey::new(contest_template_id, new_version))?;
                if !target.is_published {
                    info!(%contest_template_id, new_version, "Template version no longer published; skipping migration");
                    return Ok(HandlerOutcome::Duplicate);
                }

                let pending = contests_to_migrate(tables, contest_template_id, new_version);
                if pending.is_empty() {
                    return Ok(HandlerOutcome::Duplicate);
                }
                let now = now_utc();
                for contest_instance_id in &pending {
                    migrate_contest(tables, *contest_instance_id, new_version, now)?;
                }
                info!(%contest_template_id, new_version, migrated = pending.len(), "Contests migrated");
                Ok(HandlerOutcome::Applied)
            })
            .await
    }

    /// Replays a procedure stage transition decided by a cascade.
    pub async fn on_procedure_stage_advanced(
        &self,
        _integration_event_id: Uuid,
        event: ProcedureStageTransition,
    ) -> Result<HandlerOutcome> {
        let applied = self
            .engine
            .transact(move |tables, outbox| {
                ops::apply_procedure_transition(tables, outbox, &event, now_utc())
            })
            .await?;
        Ok(if applied {
            HandlerOutcome::Applied
        } else {
            HandlerOutcome::Duplicate
        })
    }
}
