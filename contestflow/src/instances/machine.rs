//! Per-entity stage advancement.
//!
//! These transitions only touch the instance they are called on. Loading
//! templates, recording results and emitting events is left to the callers.

use uuid::Uuid;

use super::{ApplicationInstance, ContestInstance, ProcedureInstance};
use crate::chain::StageChain;
use crate::core::{
    is_terminal_status, ApplicationStatus, ContestStageType, ProcedureStatus, ResultStatus,
    STATUS_COMPLETED, STATUS_INTERRUPTED, STATUS_IN_PROGRESS,
};
use crate::errors::{EntityKind, InvalidTransitionError, Result};
use crate::templates::ContestTemplate;
use crate::utils::Timestamp;

/// Where an entity ended up after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Moved to another stage.
    Moved {
        /// The new current stage.
        stage_id: Uuid,
    },
    /// Left the chain; the pointer is cleared.
    Finished,
}

impl ProcedureInstance {
    /// Returns true once the procedure left its chain.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current_stage_id.is_none() || self.status.is_terminal()
    }

    /// Returns the current stage, or an error if the procedure is terminal.
    pub fn active_stage(&self) -> Result<Uuid> {
        match self.current_stage_id {
            Some(stage_id) if !self.status.is_terminal() => Ok(stage_id),
            _ => Err(InvalidTransitionError::new(
                EntityKind::ProcedureInstance,
                self.id,
                format!("procedure is {}", self.status),
            )
            .into()),
        }
    }

    /// Moves to `next`, or completes the procedure when `next` is `None`.
    pub(crate) fn move_to(&mut self, next: Option<Uuid>, now: Timestamp) -> Step {
        self.updated_at = now;
        match next {
            Some(stage_id) => {
                self.current_stage_id = Some(stage_id);
                Step::Moved { stage_id }
            }
            None => {
                self.current_stage_id = None;
                self.status = ProcedureStatus::Completed;
                Step::Finished
            }
        }
    }

    /// Forces the procedure to `Interrupted`.
    pub(crate) fn interrupt(&mut self, now: Timestamp) -> Result<()> {
        self.active_stage()?;
        self.current_stage_id = None;
        self.status = ProcedureStatus::Interrupted;
        self.updated_at = now;
        Ok(())
    }
}

impl ContestInstance {
    /// Returns true once the contest left its chain.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current_stage_id.is_none() || is_terminal_status(&self.status)
    }

    /// Returns the current stage, or an error if the contest is terminal.
    pub fn active_stage(&self) -> Result<Uuid> {
        match self.current_stage_id {
            Some(stage_id) if !is_terminal_status(&self.status) => Ok(stage_id),
            _ => Err(self.rejected(format!("contest is {}", self.status))),
        }
    }

    fn rejected(&self, reason: impl Into<String>) -> crate::errors::ContestflowError {
        InvalidTransitionError::new(EntityKind::ContestInstance, self.id, reason).into()
    }

    /// Moves to the next stage of `template`, completing the contest at the end of the chain.
    ///
    /// Completion requires `Completed` in the status model. The in-progress
    /// label is only assigned when the status model contains it.
    pub(crate) fn advance(&mut self, template: &ContestTemplate, now: Timestamp) -> Result<Step> {
        let current = self.active_stage()?;
        if !template.stages.contains(current) {
            return Err(self.rejected("current stage is not part of the bound template"));
        }
        match template.stages.next_stage_id(current) {
            Some(stage_id) => {
                self.current_stage_id = Some(stage_id);
                if template.permits(STATUS_IN_PROGRESS) {
                    self.status = STATUS_IN_PROGRESS.to_string();
                }
                self.updated_at = now;
                Ok(Step::Moved { stage_id })
            }
            None => {
                self.complete(template, now)?;
                Ok(Step::Finished)
            }
        }
    }

    /// Moves the contest to `Completed` with the pointer cleared.
    pub(crate) fn complete(&mut self, template: &ContestTemplate, now: Timestamp) -> Result<()> {
        self.active_stage()?;
        if !template.permits_completion() {
            return Err(self.rejected("status model does not permit Completed"));
        }
        self.current_stage_id = None;
        self.status = STATUS_COMPLETED.to_string();
        self.updated_at = now;
        Ok(())
    }

    /// Moves the contest to `Interrupted`.
    ///
    /// With `force` the status model is not consulted; this is used when the
    /// owning procedure is interrupted.
    pub(crate) fn interrupt(
        &mut self,
        template: &ContestTemplate,
        reason: &str,
        force: bool,
        now: Timestamp,
    ) -> Result<()> {
        self.active_stage()?;
        if !force && !template.permits_interruption() {
            return Err(self.rejected("status model does not permit Interrupted"));
        }
        self.current_stage_id = None;
        self.status = STATUS_INTERRUPTED.to_string();
        self.interruption_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }
}

impl ApplicationInstance {
    /// Returns true once the application left its chain.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current_stage_id.is_none() || self.status.is_terminal()
    }

    /// Returns the current stage, or an error if the application is terminal.
    pub fn active_stage(&self) -> Result<Uuid> {
        match self.current_stage_id {
            Some(stage_id) if !self.status.is_terminal() => Ok(stage_id),
            _ => Err(InvalidTransitionError::new(
                EntityKind::ApplicationInstance,
                self.id,
                format!("application is {}", self.status),
            )
            .into()),
        }
    }

    /// Applies a stage result.
    ///
    /// Rejected and failed results end the application immediately. A
    /// successful result moves to the next stage, or approves the application
    /// at the end of the chain.
    pub(crate) fn apply_result(
        &mut self,
        chain: &StageChain<ContestStageType>,
        result: ResultStatus,
        now: Timestamp,
    ) -> Result<Step> {
        let current = self.active_stage()?;
        self.updated_at = now;

        if let Some(terminal) = ApplicationStatus::from_result(result) {
            self.finish(terminal);
            return Ok(Step::Finished);
        }

        match chain.next_stage_id(current) {
            Some(stage_id) => {
                self.current_stage_id = Some(stage_id);
                self.status = ApplicationStatus::InProgress;
                Ok(Step::Moved { stage_id })
            }
            None => {
                self.finish(ApplicationStatus::Approved);
                Ok(Step::Finished)
            }
        }
    }

    /// Forces a non-terminal application to `Interrupted`; returns false if it was already terminal.
    pub(crate) fn interrupt(&mut self, now: Timestamp) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.finish(ApplicationStatus::Interrupted);
        self.updated_at = now;
        true
    }

    fn finish(&mut self, status: ApplicationStatus) {
        self.current_stage_id = None;
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{build_chain, StageSpec};
    use crate::errors::ContestflowError;
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    fn chain() -> StageChain<ContestStageType> {
        build_chain(
            Uuid::new_v4(),
            &[
                StageSpec::new(ContestStageType::Validation, 1, "a"),
                StageSpec::new(ContestStageType::Expertise, 2, "b"),
                StageSpec::new(ContestStageType::WinnerAnnouncement, 3, "c"),
            ],
        )
        .unwrap()
    }

    fn template(status_model: &[&str]) -> ContestTemplate {
        let stages = chain();
        ContestTemplate {
            id: stages.owner_template_id(),
            procedure_template_id: Uuid::new_v4(),
            name: "Main".to_string(),
            version: 1,
            is_published: true,
            status_model: status_model.iter().map(|s| (*s).to_string()).collect(),
            stages,
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    fn application(chain: &StageChain<ContestStageType>) -> ApplicationInstance {
        ApplicationInstance {
            id: Uuid::new_v4(),
            contest_instance_id: Uuid::new_v4(),
            template_id: chain.owner_template_id(),
            template_version: 1,
            current_stage_id: chain.first().map(|s| s.id),
            status: ApplicationStatus::Submitted,
            external_application_id: None,
            application_data: None,
            submission_event_id: None,
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    fn contest(template: &ContestTemplate) -> ContestInstance {
        ContestInstance {
            id: Uuid::new_v4(),
            procedure_instance_id: Uuid::new_v4(),
            template_id: template.id,
            template_version: template.version,
            current_stage_id: template.stages.first().map(|s| s.id),
            status: "NotStarted".to_string(),
            interruption_reason: None,
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    #[test]
    fn test_success_walks_the_chain_then_approves() {
        let chain = chain();
        let mut app = application(&chain);

        let step = app.apply_result(&chain, ResultStatus::Success, now_utc()).unwrap();
        assert_eq!(step, Step::Moved { stage_id: chain.stages()[1].id });
        assert_eq!(app.status, ApplicationStatus::InProgress);

        app.apply_result(&chain, ResultStatus::Success, now_utc()).unwrap();
        let step = app.apply_result(&chain, ResultStatus::Success, now_utc()).unwrap();
        assert_eq!(step, Step::Finished);
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(app.current_stage_id, None);
    }

    #[test]
    fn test_rejected_and_failed_bypass_remaining_stages() {
        let chain = chain();
        for (result, status) in [
            (ResultStatus::Rejected, ApplicationStatus::Rejected),
            (ResultStatus::Failed, ApplicationStatus::Failed),
        ] {
            let mut app = application(&chain);
            assert_eq!(app.apply_result(&chain, result, now_utc()).unwrap(), Step::Finished);
            assert_eq!(app.status, status);
            assert_eq!(app.current_stage_id, None);
        }
    }

    #[test]
    fn test_terminal_application_rejects_results() {
        let chain = chain();
        let mut app = application(&chain);
        assert!(app.interrupt(now_utc()));
        assert!(!app.interrupt(now_utc()));

        let err = app.apply_result(&chain, ResultStatus::Success, now_utc()).unwrap_err();
        assert!(matches!(err, ContestflowError::InvalidTransition(_)));
    }

    #[test]
    fn test_contest_advance_sets_in_progress_only_when_modelled() {
        let modelled = template(&["NotStarted", "InProgress", "Completed"]);
        let mut c = contest(&modelled);
        c.advance(&modelled, now_utc()).unwrap();
        assert_eq!(c.status, "InProgress");

        let unmodelled = template(&["Open", "Completed"]);
        let mut c = contest(&unmodelled);
        c.advance(&unmodelled, now_utc()).unwrap();
        assert_eq!(c.status, "NotStarted");
    }

    #[test]
    fn test_contest_completion_requires_status_model() {
        let without = template(&["Open"]);
        let mut c = contest(&without);
        let err = c.complete(&without, now_utc()).unwrap_err();
        assert!(matches!(err, ContestflowError::InvalidTransition(_)));
        assert!(!c.is_terminal());

        let with = template(&["Open", "Completed"]);
        let mut c = contest(&with);
        c.advance(&with, now_utc()).unwrap();
        c.advance(&with, now_utc()).unwrap();
        assert_eq!(c.advance(&with, now_utc()).unwrap(), Step::Finished);
        assert_eq!(c.status, "Completed");
        assert!(c.is_terminal());
    }

    #[test]
    fn test_contest_interrupt_respects_status_model_unless_forced() {
        let template = template(&["Open", "Completed"]);
        let mut c = contest(&template);
        assert!(c.interrupt(&template, "no budget", false, now_utc()).is_err());

        c.interrupt(&template, "procedure interrupted", true, now_utc()).unwrap();
        assert_eq!(c.status, "Interrupted");
        assert_eq!(c.interruption_reason.as_deref(), Some("procedure interrupted"));
        assert!(c.interrupt(&template, "again", true, now_utc()).is_err());
    }

    #[test]
    fn test_procedure_move_to_none_completes() {
        let mut p = ProcedureInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            template_version: 1,
            current_stage_id: Some(Uuid::new_v4()),
            status: ProcedureStatus::Active,
            created_at: now_utc(),
            updated_at: now_utc(),
        };
        assert_eq!(p.move_to(None, now_utc()), Step::Finished);
        assert_eq!(p.status, ProcedureStatus::Completed);
        assert!(p.active_stage().is_err());
        assert!(p.interrupt(now_utc()).is_err());
    }
}
