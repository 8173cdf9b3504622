//! Chain construction and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::{StageDefinition, StageRecord, StageSpec};
use crate::core::StageType;
use crate::errors::ChainValidationError;
use crate::utils::generate_uuid;

/// An ordered, validated sequence of stages owned by one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChain<T> {
    owner_template_id: Uuid,
    stages: Vec<StageDefinition<T>>,
}

/// Builds a chain from an unordered list of stage specs.
///
/// Checks, in order: non-empty input, unique orders, unique stage types and
/// orders forming exactly `1..=N`. Every stage receives a fresh identity.
///
/// # Examples
///
/// ```
/// use contestflow::chain::{build_chain, StageSpec};
/// use contestflow::core::ContestStageType;
/// use uuid::Uuid;
///
/// let chain = build_chain(
///     Uuid::new_v4(),
///     &[
///         StageSpec::new(ContestStageType::Expertise, 2, "experts"),
///         StageSpec::new(ContestStageType::Validation, 1, "validator"),
///     ],
/// )
/// .unwrap();
///
/// let first = chain.first().unwrap();
/// assert_eq!(first.stage_type, ContestStageType::Validation);
/// assert_eq!(chain.next_stage_id(first.id), Some(chain.stages()[1].id));
/// ```
pub fn build_chain<T: StageType>(
    owner_template_id: Uuid,
    specs: &[StageSpec<T>],
) -> Result<StageChain<T>, ChainValidationError> {
    StageChain::build_with_ids(
        owner_template_id,
        specs.iter().map(|spec| (generate_uuid(), spec.clone())).collect(),
    )
}

fn validate_specs<'a, T: StageType>(
    specs: impl Iterator<Item = &'a StageSpec<T>> + Clone,
) -> Result<(), ChainValidationError> {
    if specs.clone().next().is_none() {
        return Err(ChainValidationError::Empty);
    }

    let mut seen_orders = HashSet::new();
    for spec in specs.clone() {
        if !seen_orders.insert(spec.order) {
            return Err(ChainValidationError::DuplicateOrder { order: spec.order });
        }
    }

    let mut seen_types = HashSet::new();
    for spec in specs.clone() {
        if !seen_types.insert(spec.stage_type) {
            return Err(ChainValidationError::DuplicateStageType {
                stage_type: spec.stage_type.to_string(),
            });
        }
    }

    let mut orders: Vec<u32> = specs.map(|spec| spec.order).collect();
    orders.sort_unstable();
    let contiguous = orders
        .iter()
        .enumerate()
        .all(|(idx, order)| usize::try_from(*order).map_or(false, |o| o == idx + 1));
    if !contiguous {
        return Err(ChainValidationError::NonContiguousOrder { orders });
    }

    Ok(())
}

impl<T: StageType> StageChain<T> {
    /// Builds a chain using caller-supplied stage identities.
    ///
    /// Runs the same validation as [`build_chain`].
    pub fn build_with_ids(
        owner_template_id: Uuid,
        stages: Vec<(Uuid, StageSpec<T>)>,
    ) -> Result<Self, ChainValidationError> {
        validate_specs(stages.iter().map(|(_, spec)| spec))?;

        let mut stages: Vec<StageDefinition<T>> = stages
            .into_iter()
            .map(|(id, spec)| StageDefinition {
                id,
                owner_template_id,
                stage_type: spec.stage_type,
                order: spec.order,
                default_executor_name: spec.executor_name,
            })
            .collect();
        stages.sort_by_key(|stage| stage.order);

        Ok(Self {
            owner_template_id,
            stages,
        })
    }

    /// Re-runs validation on this chain's own contents.
    ///
    /// Also checks that the arena is sorted by order and owned by a single template,
    /// which matters for chains that arrived through deserialization.
    pub fn revalidate(&self) -> Result<(), ChainValidationError> {
        validate_specs(self.stages.iter().map(StageDefinition::spec).collect::<Vec<_>>().iter())?;
        let sorted = self
            .stages
            .windows(2)
            .all(|pair| pair[0].order < pair[1].order);
        let owned = self
            .stages
            .iter()
            .all(|stage| stage.owner_template_id == self.owner_template_id);
        if sorted && owned {
            Ok(())
        } else {
            Err(ChainValidationError::NonContiguousOrder {
                orders: self.stages.iter().map(|stage| stage.order).collect(),
            })
        }
    }

    /// Copies this chain under a new owner, giving every stage a fresh identity.
    #[must_use]
    pub fn with_fresh_identities(&self, owner_template_id: Uuid) -> Self {
        Self {
            owner_template_id,
            stages: self
                .stages
                .iter()
                .map(|stage| StageDefinition {
                    id: generate_uuid(),
                    owner_template_id,
                    ..stage.clone()
                })
                .collect(),
        }
    }

    /// Returns the owning template id.
    #[must_use]
    pub fn owner_template_id(&self) -> Uuid {
        self.owner_template_id
    }

    /// Returns the stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition<T>] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built chain; provided for API completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage at `order = 1`.
    #[must_use]
    pub fn first(&self) -> Option<&StageDefinition<T>> {
        self.stages.first()
    }

    /// Looks up a stage by identity.
    #[must_use]
    pub fn get(&self, stage_id: Uuid) -> Option<&StageDefinition<T>> {
        self.stages.iter().find(|stage| stage.id == stage_id)
    }

    /// Returns true if the stage belongs to this chain.
    #[must_use]
    pub fn contains(&self, stage_id: Uuid) -> bool {
        self.position(stage_id).is_some()
    }

    /// Looks up a stage by type.
    #[must_use]
    pub fn by_type(&self, stage_type: T) -> Option<&StageDefinition<T>> {
        self.stages.iter().find(|stage| stage.stage_type == stage_type)
    }

    /// Returns the stage after `stage_id`, or `None` at the end of the chain
    /// or when the stage is unknown.
    #[must_use]
    pub fn next_of(&self, stage_id: Uuid) -> Option<&StageDefinition<T>> {
        self.position(stage_id)
            .and_then(|idx| self.stages.get(idx + 1))
    }

    /// Returns the stage before `stage_id`.
    #[must_use]
    pub fn previous_of(&self, stage_id: Uuid) -> Option<&StageDefinition<T>> {
        self.position(stage_id)
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| self.stages.get(idx))
    }

    /// Derived `nextStageId` of a stage.
    #[must_use]
    pub fn next_stage_id(&self, stage_id: Uuid) -> Option<Uuid> {
        self.next_of(stage_id).map(|stage| stage.id)
    }

    /// Derived `previousStageId` of a stage.
    #[must_use]
    pub fn previous_stage_id(&self, stage_id: Uuid) -> Option<Uuid> {
        self.previous_of(stage_id).map(|stage| stage.id)
    }

    /// Returns the stage types in chain order.
    #[must_use]
    pub fn stage_types(&self) -> Vec<T> {
        self.stages.iter().map(|stage| stage.stage_type).collect()
    }

    /// Returns the specs this chain can be rebuilt from.
    #[must_use]
    pub fn specs(&self) -> Vec<StageSpec<T>> {
        self.stages.iter().map(StageDefinition::spec).collect()
    }

    /// Returns the flattened records with explicit previous/next links.
    #[must_use]
    pub fn records(&self) -> Vec<StageRecord<T>> {
        self.stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| StageRecord {
                id: stage.id,
                stage_type: stage.stage_type,
                order: stage.order,
                previous_stage_id: idx
                    .checked_sub(1)
                    .and_then(|prev| self.stages.get(prev))
                    .map(|s| s.id),
                next_stage_id: self.stages.get(idx + 1).map(|s| s.id),
                default_executor_name: stage.default_executor_name.clone(),
            })
            .collect()
    }

    fn position(&self, stage_id: Uuid) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id == stage_id)
    }
}
