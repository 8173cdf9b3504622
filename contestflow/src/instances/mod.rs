//! Procedure, contest and application instances.
//!
//! Instances track a current-stage pointer and a status. A cleared pointer
//! marks a terminal instance. Instances are never deleted.

mod machine;
mod model;
pub(crate) mod ops;
mod service;

pub use machine::Step;
pub use model::{
    ApplicationInstance, ContestInstance, ProcedureInstance, StageConfiguration,
    StageConfigurationInput, StageResult,
};
pub use service::InstanceService;
