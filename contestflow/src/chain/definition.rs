//! Stage definitions and their input/output shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::StageType;

/// One stage of a template chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition<T> {
    /// Stage identity. Never stable across template versions.
    pub id: Uuid,
    /// The template owning this stage.
    pub owner_template_id: Uuid,
    /// Stage type, unique within the chain.
    pub stage_type: T,
    /// 1-based position in the chain.
    pub order: u32,
    /// Executor used when an instance does not override it.
    pub default_executor_name: String,
}

impl<T: StageType> StageDefinition<T> {
    /// Returns the input spec this definition was built from.
    #[must_use]
    pub fn spec(&self) -> StageSpec<T> {
        StageSpec {
            stage_type: self.stage_type,
            order: self.order,
            executor_name: self.default_executor_name.clone(),
        }
    }
}

/// Input for building a chain: one stage without identity or links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec<T> {
    /// Stage type.
    pub stage_type: T,
    /// Requested 1-based position.
    pub order: u32,
    /// Default executor name.
    #[serde(default)]
    pub executor_name: String,
}

impl<T> StageSpec<T> {
    /// Creates a new stage spec.
    #[must_use]
    pub fn new(stage_type: T, order: u32, executor_name: impl Into<String>) -> Self {
        Self {
            stage_type,
            order,
            executor_name: executor_name.into(),
        }
    }
}

/// Flattened stage with explicit links, as persisted and exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord<T> {
    /// Stage identity.
    pub id: Uuid,
    /// Stage type.
    pub stage_type: T,
    /// 1-based position.
    pub order: u32,
    /// The stage at `order - 1`, if any.
    pub previous_stage_id: Option<Uuid>,
    /// The stage at `order + 1`, if any.
    pub next_stage_id: Option<Uuid>,
    /// Default executor name.
    pub default_executor_name: String,
}
