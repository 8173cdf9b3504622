//! Error types for the orchestration engine.
//!
//! The taxonomy follows how callers react to a failure: missing entities,
//! malformed input, forbidden transitions, absorbed duplicates, transport
//! problems and storage failures.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for contestflow operations.
#[derive(Debug, Error)]
pub enum ContestflowError {
    /// A referenced template, instance or stage does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// Input failed validation before any mutation took place.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The entity's current state forbids the operation.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// An event with an already recorded integration event id.
    #[error("Duplicate integration event: {integration_event_id}")]
    DuplicateEvent {
        /// The repeated idempotency key.
        integration_event_id: Uuid,
    },

    /// The message broker could not be reached.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The transactional store failed; the transaction was rolled back.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ContestflowError {
    /// Creates a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Returns true if redelivering the triggering message may succeed.
    ///
    /// Only storage and transport failures are transient. Everything else is
    /// a verdict about the message itself and will fail identically again.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Transport(_))
    }

    /// Returns diagnostic information for this error.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        match self {
            Self::NotFound(err) => ErrorInfo::new("CF-NOT_FOUND", err.to_string())
                .with_context_entry("entity", err.entity.to_string())
                .with_context_entry("id", err.id.clone()),
            Self::Validation(err) => err.info(),
            Self::InvalidTransition(err) => {
                ErrorInfo::new("CF-INVALID_TRANSITION", err.to_string())
                    .with_context_entry("entity", err.entity.to_string())
                    .with_context_entry("id", err.id.to_string())
            }
            Self::DuplicateEvent { integration_event_id } => {
                ErrorInfo::new("CF-DUPLICATE_EVENT", self.to_string())
                    .with_context_entry("integration_event_id", integration_event_id.to_string())
            }
            Self::Transport(err) => ErrorInfo::new("CF-TRANSPORT", err.to_string())
                .with_fix_hint("The state change is committed; replay the notification once the broker is reachable."),
            Self::Storage(_) => ErrorInfo::new("CF-STORAGE", self.to_string()),
            Self::Serialization(_) => ErrorInfo::new("CF-SERIALIZATION", self.to_string()),
        }
    }
}

impl From<ChainValidationError> for ContestflowError {
    fn from(err: ChainValidationError) -> Self {
        Self::Validation(ValidationError::Chain(err))
    }
}

impl From<serde_json::Error> for ContestflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = ContestflowError> = std::result::Result<T, E>;

/// Metadata about an error for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "CF-CHAIN-DUPLICATE_ORDER").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        map
    }
}

/// The kinds of entity the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A procedure template.
    ProcedureTemplate,
    /// A contest template.
    ContestTemplate,
    /// A stage definition inside a template chain.
    Stage,
    /// A running procedure.
    ProcedureInstance,
    /// A running contest.
    ContestInstance,
    /// A running application.
    ApplicationInstance,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcedureTemplate => write!(f, "procedure template"),
            Self::ContestTemplate => write!(f, "contest template"),
            Self::Stage => write!(f, "stage"),
            Self::ProcedureInstance => write!(f, "procedure instance"),
            Self::ContestInstance => write!(f, "contest instance"),
            Self::ApplicationInstance => write!(f, "application instance"),
        }
    }
}

/// Error raised when a referenced entity does not exist.
#[derive(Debug, Clone, Error)]
#[error("{entity} '{id}' not found")]
pub struct NotFoundError {
    /// What was looked up.
    pub entity: EntityKind,
    /// The identifier that was looked up (may include a version).
    pub id: String,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a not-found error for a specific template version.
    #[must_use]
    pub fn version(entity: EntityKind, id: Uuid, version: u32) -> Self {
        Self {
            entity,
            id: format!("{id}@v{version}"),
        }
    }
}

/// Error raised when an operation is attempted on an entity whose state forbids it.
#[derive(Debug, Clone, Error)]
#[error("Invalid transition for {entity} '{id}': {reason}")]
pub struct InvalidTransitionError {
    /// The entity kind.
    pub entity: EntityKind,
    /// The entity id.
    pub id: Uuid,
    /// Why the transition was rejected.
    pub reason: String,
}

impl InvalidTransitionError {
    /// Creates a new invalid transition error.
    #[must_use]
    pub fn new(entity: EntityKind, id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            entity,
            id,
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a stage chain.
///
/// Validation runs in a fixed order and stops at the first violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainValidationError {
    /// No stages were supplied.
    #[error("A stage chain must contain at least one stage")]
    Empty,

    /// Two stages share an order value.
    #[error("Duplicate stage order {order}")]
    DuplicateOrder {
        /// The repeated order value.
        order: u32,
    },

    /// Two stages share a stage type.
    #[error("Duplicate stage type {stage_type}")]
    DuplicateStageType {
        /// The repeated stage type.
        stage_type: String,
    },

    /// Order values do not form `1..=N`.
    #[error("Stage orders must be contiguous starting from 1, found {orders:?}")]
    NonContiguousOrder {
        /// The sorted order values that were supplied.
        orders: Vec<u32>,
    },
}

impl ChainValidationError {
    /// Returns the error code for this violation.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "CF-CHAIN-EMPTY",
            Self::DuplicateOrder { .. } => "CF-CHAIN-DUPLICATE_ORDER",
            Self::DuplicateStageType { .. } => "CF-CHAIN-DUPLICATE_TYPE",
            Self::NonContiguousOrder { .. } => "CF-CHAIN-ORDER_GAP",
        }
    }
}

/// Error raised when input is malformed.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The stage chain is malformed.
    #[error("{0}")]
    Chain(#[from] ChainValidationError),

    /// A stage type that the template kind requires is missing.
    #[error("Template must include a {stage_type} stage")]
    MissingStageType {
        /// The required stage type.
        stage_type: String,
    },

    /// A contest template without any status labels.
    #[error("Contest template must define a non-empty status model")]
    EmptyStatusModel,

    /// A referenced stage does not belong to the template in question.
    #[error("Stage '{stage_id}' does not belong to {template}")]
    ForeignStage {
        /// The stage id.
        stage_id: Uuid,
        /// Human readable template reference.
        template: String,
    },

    /// Two configurations target the same stage.
    #[error("Stage '{stage_id}' is configured more than once")]
    DuplicateStageConfiguration {
        /// The stage id.
        stage_id: Uuid,
    },

    /// A contest template that belongs to another procedure template.
    #[error("Contest template '{contest_template_id}' does not belong to procedure template '{procedure_template_id}'")]
    ForeignContestTemplate {
        /// The contest template id.
        contest_template_id: Uuid,
        /// The procedure template id of the procedure instance.
        procedure_template_id: Uuid,
    },

    /// A template name that is blank.
    #[error("Template name must not be empty")]
    EmptyName,

    /// A template version that is not a positive integer.
    #[error("Template version must be positive, got {version}")]
    InvalidVersion {
        /// The rejected version.
        version: u32,
    },

    /// A snapshot document that cannot be accepted.
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),
}

impl ValidationError {
    /// Returns diagnostic information for this error.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        let code = match self {
            Self::Chain(err) => err.code(),
            Self::MissingStageType { .. } => "CF-TEMPLATE-MISSING_STAGE",
            Self::EmptyStatusModel => "CF-TEMPLATE-STATUS_MODEL",
            Self::ForeignStage { .. } => "CF-TEMPLATE-FOREIGN_STAGE",
            Self::DuplicateStageConfiguration { .. } => "CF-INSTANCE-DUPLICATE_CONFIG",
            Self::ForeignContestTemplate { .. } => "CF-TEMPLATE-FOREIGN_CONTEST",
            Self::EmptyName => "CF-TEMPLATE-NAME",
            Self::InvalidVersion { .. } => "CF-TEMPLATE-VERSION",
            Self::Snapshot(_) => "CF-SNAPSHOT",
        };
        let info = ErrorInfo::new(code, self.to_string());
        match self {
            Self::Chain(ChainValidationError::NonContiguousOrder { .. }) => {
                info.with_fix_hint("Number stages 1, 2, 3, ... without gaps.")
            }
            Self::MissingStageType { stage_type } => {
                info.with_fix_hint(format!("Add a {stage_type} stage to the chain."))
            }
            _ => info,
        }
    }
}

/// Error raised when an outbound event cannot be handed to the broker.
#[derive(Debug, Clone, Error)]
#[error("Transport unavailable for topic '{topic}': {reason}")]
pub struct TransportError {
    /// The topic being published to.
    pub topic: String,
    /// Why publishing failed.
    pub reason: String,
}

impl TransportError {
    /// Creates a new transport error.
    #[must_use]
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}
