//! Core domain enums.
//!
//! This module contains the closed enumerations every other module builds on:
//! - Stage types for procedure and contest chains
//! - Instance statuses and stage result statuses

mod stage_type;
mod status;

pub use stage_type::{ContestStageType, ProcedureStageType, StageType};
pub use status::{
    is_terminal_status, ApplicationStatus, ProcedureStatus, ResultStatus, STATUS_COMPLETED,
    STATUS_INTERRUPTED, STATUS_IN_PROGRESS, STATUS_NOT_STARTED, TERMINAL_STATUSES,
};
