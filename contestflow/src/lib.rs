//! # Contestflow
//!
//! An event-driven orchestration engine for multi-level administrative
//! workflows: a procedure runs through an ordered chain of stages, its
//! `Contests` stage spawns contests, and each contest accepts applications
//! that move through the contest's own stage chain independently.
//!
//! Contestflow provides:
//!
//! - **Stage chains**: validated, ordered stage sequences owned by templates
//! - **Versioned templates**: publish, edit while unpublished, migrate running contests
//! - **Idempotent event handling**: every inbound event may arrive more than once
//! - **Upward cascades**: applications complete contests, contests release procedures
//! - **Snapshots**: export a template tree and import it under fresh identities
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contestflow::prelude::*;
//!
//! let flow = Contestflow::builder()
//!     .with_publisher(Arc::new(LoggingPublisher::default()))
//!     .with_config(OrchestratorConfig::default().apply_env()?)
//!     .build();
//! flow.spawn_pump();
//!
//! let procedure = flow
//!     .templates()
//!     .create_procedure_template(ProcedureTemplateDraft::new("Grants", stages))
//!     .await?;
//!
//! // Broker deliveries are fed into the pump.
//! flow.deliver(Delivery { topic, payload }).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chain;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod events;
pub mod instances;
pub mod migration;
pub mod observability;
pub mod orchestrator;
pub mod runtime;
pub mod snapshot;
pub mod storage;
pub mod templates;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{build_chain, StageChain, StageDefinition, StageRecord, StageSpec};
    pub use crate::config::{LogFormat, LoggingConfig, OrchestratorConfig};
    pub use crate::core::{
        ApplicationStatus, ContestStageType, ProcedureStageType, ProcedureStatus, ResultStatus,
        StageType,
    };
    pub use crate::dispatch::{
        EventHandler, HandlerTable, MessagePump, PumpHandle, PumpReport, RetryConfig,
    };
    pub use crate::engine::Engine;
    pub use crate::errors::{
        ChainValidationError, ContestflowError, ErrorInfo, InvalidTransitionError, NotFoundError,
        TransportError, ValidationError,
    };
    pub use crate::events::{
        ApplicationSubmitted, CollectingPublisher, Delivery, EventKind, EventPublisher,
        InboundEvent, IntegrationEnvelope, LoggingPublisher, NoOpPublisher, OutboundEvent,
        StageCompleted,
    };
    pub use crate::instances::{
        ApplicationInstance, ContestInstance, InstanceService, ProcedureInstance,
        StageConfigurationInput,
    };
    pub use crate::orchestrator::{HandlerOutcome, Orchestrator};
    pub use crate::runtime::{Contestflow, ContestflowBuilder};
    pub use crate::snapshot::{SnapshotDocument, SnapshotService};
    pub use crate::storage::{InMemoryStore, WorkflowStore};
    pub use crate::templates::{
        ContestTemplate, ContestTemplateDraft, ProcedureTemplate, ProcedureTemplateDraft,
        TemplateKey, TemplateService,
    };
    pub use crate::utils::{generate_uuid, now_utc, Timestamp};
}
