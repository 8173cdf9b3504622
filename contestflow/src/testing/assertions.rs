//! Assertions over instances and published events.

use uuid::Uuid;

use crate::core::ApplicationStatus;
use crate::events::CollectingPublisher;
use crate::instances::{ApplicationInstance, ContestInstance, ProcedureInstance};

/// Asserts that the procedure points at `stage_id`.
pub fn assert_procedure_at(procedure: &ProcedureInstance, stage_id: Uuid) {
    assert_eq!(
        procedure.current_stage_id,
        Some(stage_id),
        "Expected procedure {} at stage {}, got {:?} ({:?})",
        procedure.id,
        stage_id,
        procedure.current_stage_id,
        procedure.status
    );
}

/// Asserts the contest status label.
pub fn assert_contest_status(contest: &ContestInstance, expected: &str) {
    assert_eq!(
        contest.status, expected,
        "Expected contest {} to be {}, got {}",
        contest.id, expected, contest.status
    );
}

/// Asserts the application status.
pub fn assert_application_status(application: &ApplicationInstance, expected: ApplicationStatus) {
    assert_eq!(
        application.status, expected,
        "Expected application {} to be {:?}, got {:?}",
        application.id, expected, application.status
    );
}

/// Asserts the exact sequence of published topics.
pub fn assert_topics(publisher: &CollectingPublisher, expected: &[&str]) {
    let actual: Vec<&str> = publisher.events().iter().map(|event| event.topic()).collect();
    assert_eq!(actual, expected, "Unexpected published topics");
}
