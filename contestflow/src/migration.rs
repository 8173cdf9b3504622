//! Template version migration for running contests.
//!
//! Stage identities are never stable across template versions, so every
//! reference is re-resolved through its stage type: old stage id, to old
//! stage type, to the stage of that type in the target chain.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{EntityKind, InvalidTransitionError, Result};
use crate::storage::Tables;
use crate::templates::TemplateKey;
use crate::utils::Timestamp;

/// What a migration changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// The migrated contest.
    pub contest_instance_id: Uuid,
    /// Version before the migration.
    pub from_version: u32,
    /// Version after the migration.
    pub to_version: u32,
    /// Whether the current stage pointer was moved to the target chain.
    pub current_stage_remapped: bool,
    /// Configurations now pointing at the target chain.
    pub remapped_configurations: usize,
    /// Of those, configurations whose executor followed the new stage default.
    pub redefaulted_configurations: usize,
    /// Configurations whose stage type is absent from the target chain; left untouched.
    pub orphaned_configurations: Vec<Uuid>,
}

impl MigrationReport {
    /// Returns true if the contest already was on the target version.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }
}

/// Moves a non-terminal contest instance to another published version of its template.
///
/// Explicit executor overrides are preserved; configurations still bound to
/// the old stage's default executor pick up the new stage's default. When the
/// current stage's type is missing from the target chain the pointer is left
/// unchanged.
pub fn migrate_contest(
    tables: &mut Tables,
    contest_instance_id: Uuid,
    target_version: u32,
    now: Timestamp,
) -> Result<MigrationReport> {
    let contest = tables.contest_instance(contest_instance_id)?.clone();
    let mut report = MigrationReport {
        contest_instance_id,
        from_version: contest.template_version,
        to_version: target_version,
        current_stage_remapped: false,
        remapped_configurations: 0,
        redefaulted_configurations: 0,
        orphaned_configurations: Vec::new(),
    };
    if report.is_noop() {
        return Ok(report);
    }
    contest.active_stage()?;

    let source = tables.contest_template(contest.template_key())?.clone();
    let target = tables
        .contest_template(TemplateKey::new(contest.template_id, target_version))?
        .clone();
    if !target.is_published {
        return Err(InvalidTransitionError::new(
            EntityKind::ContestTemplate,
            target.id,
            format!("version {target_version} is not published"),
        )
        .into());
    }

    for config in tables.configurations_of_mut(contest_instance_id) {
        let Some(old_stage) = source.stages.get(config.stage_definition_id) else {
            if !target.stages.contains(config.stage_definition_id) {
                report.orphaned_configurations.push(config.id);
            }
            continue;
        };
        let Some(new_stage) = target.stages.by_type(old_stage.stage_type) else {
            warn!(
                %contest_instance_id,
                configuration_id = %config.id,
                stage_type = %old_stage.stage_type,
                "Stage type missing from target version; configuration left orphaned"
            );
            report.orphaned_configurations.push(config.id);
            continue;
        };

        config.stage_definition_id = new_stage.id;
        if config.executor_name == old_stage.default_executor_name {
            config.executor_name = new_stage.default_executor_name.clone();
            report.redefaulted_configurations += 1;
        }
        report.remapped_configurations += 1;
    }

    let contest = tables.contest_instance_mut(contest_instance_id)?;
    if let Some(current) = contest.current_stage_id {
        let mapped = source
            .stages
            .get(current)
            .and_then(|old| target.stages.by_type(old.stage_type));
        match mapped {
            Some(stage) => {
                contest.current_stage_id = Some(stage.id);
                report.current_stage_remapped = true;
            }
            None => warn!(
                %contest_instance_id,
                stage_id = %current,
                "Current stage type missing from target version; pointer left unchanged"
            ),
        }
    }
    contest.template_version = target_version;
    contest.updated_at = now;

    info!(
        %contest_instance_id,
        from_version = report.from_version,
        to_version = report.to_version,
        remapped = report.remapped_configurations,
        orphaned = report.orphaned_configurations.len(),
        "Contest migrated"
    );
    Ok(report)
}

/// Returns the non-terminal contests bound to `template_id` at a version other than `target_version`.
#[must_use]
pub fn contests_to_migrate(tables: &Tables, template_id: Uuid, target_version: u32) -> Vec<Uuid> {
    let mut ids: Vec<_> = tables
        .contest_instances()
        .filter(|c| c.template_id == template_id && c.template_version != target_version)
        .filter(|c| !c.is_terminal())
        .map(|c| (c.created_at, c.id))
        .collect();
    ids.sort();
    ids.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{build_chain, StageSpec};
    use crate::core::ContestStageType;
    use crate::instances::{ContestInstance, StageConfiguration};
    use crate::templates::ContestTemplate;
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    fn template(id: Uuid, version: u32, stages: &[(ContestStageType, &str)]) -> ContestTemplate {
        let specs: Vec<_> = stages
            .iter()
            .enumerate()
            .map(|(i, (t, exec))| StageSpec::new(*t, u32::try_from(i + 1).unwrap(), *exec))
            .collect();
        ContestTemplate {
            id,
            procedure_template_id: Uuid::nil(),
            name: "Main".to_string(),
            version,
            is_published: true,
            status_model: vec!["Open".into(), "Completed".into()],
            stages: build_chain(id, &specs).unwrap(),
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    struct Setup {
        tables: Tables,
        contest_id: Uuid,
        v1: ContestTemplate,
        v2: ContestTemplate,
        overridden: Uuid,
        defaulted: Uuid,
        dropped: Uuid,
    }

    fn setup() -> Setup {
        let id = Uuid::new_v4();
        let v1 = template(
            id,
            1,
            &[
                (ContestStageType::Validation, "validator-v1"),
                (ContestStageType::Expertise, "experts-v1"),
                (ContestStageType::FundAllocation, "funds-v1"),
            ],
        );
        let v2 = template(
            id,
            2,
            &[
                (ContestStageType::ApplicationSubmission, "intake-v2"),
                (ContestStageType::Expertise, "experts-v2"),
                (ContestStageType::Validation, "validator-v2"),
            ],
        );

        let mut tables = Tables::new();
        tables.put_contest_template(v1.clone());
        tables.put_contest_template(v2.clone());

        let contest_id = Uuid::new_v4();
        let expertise_v1 = v1.stages.by_type(ContestStageType::Expertise).unwrap().id;
        tables.put_contest_instance(ContestInstance {
            id: contest_id,
            procedure_instance_id: Uuid::new_v4(),
            template_id: id,
            template_version: 1,
            current_stage_id: Some(expertise_v1),
            status: "Open".to_string(),
            interruption_reason: None,
            created_at: now_utc(),
            updated_at: now_utc(),
        });

        let mut config = |stage_type, executor: &str| {
            let config = StageConfiguration {
                id: Uuid::new_v4(),
                contest_instance_id: contest_id,
                stage_definition_id: v1.stages.by_type(stage_type).unwrap().id,
                start_date: None,
                end_date: None,
                executor_name: executor.to_string(),
            };
            let config_id = config.id;
            tables.put_stage_configuration(config);
            config_id
        };
        let overridden = config(ContestStageType::Validation, "custom-validator");
        let defaulted = config(ContestStageType::Expertise, "experts-v1");
        let dropped = config(ContestStageType::FundAllocation, "funds-v1");

        Setup { tables, contest_id, v1, v2, overridden, defaulted, dropped }
    }

    fn configuration(tables: &Tables, contest_id: Uuid, id: Uuid) -> StageConfiguration {
        tables
            .configurations_of(contest_id)
            .find(|c| c.id == id)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_migration_remaps_by_stage_type() {
        let Setup { mut tables, contest_id, v1, v2, overridden, defaulted, dropped } = setup();

        let report = migrate_contest(&mut tables, contest_id, 2, now_utc()).unwrap();

        let contest = tables.contest_instance(contest_id).unwrap();
        assert_eq!(contest.template_version, 2);
        assert_eq!(
            contest.current_stage_id,
            Some(v2.stages.by_type(ContestStageType::Expertise).unwrap().id)
        );

        let kept = configuration(&tables, contest_id, overridden);
        assert_eq!(kept.executor_name, "custom-validator");
        assert_eq!(
            kept.stage_definition_id,
            v2.stages.by_type(ContestStageType::Validation).unwrap().id
        );

        let followed = configuration(&tables, contest_id, defaulted);
        assert_eq!(followed.executor_name, "experts-v2");

        let orphan = configuration(&tables, contest_id, dropped);
        assert_eq!(
            orphan.stage_definition_id,
            v1.stages.by_type(ContestStageType::FundAllocation).unwrap().id
        );

        assert_eq!(report.remapped_configurations, 2);
        assert_eq!(report.redefaulted_configurations, 1);
        assert_eq!(report.orphaned_configurations, vec![dropped]);
        assert!(report.current_stage_remapped);
    }

    #[test]
    fn test_missing_current_type_leaves_pointer() {
        let Setup { mut tables, contest_id, v1, .. } = setup();
        let funds = v1.stages.by_type(ContestStageType::FundAllocation).unwrap().id;
        tables.contest_instance_mut(contest_id).unwrap().current_stage_id = Some(funds);

        let report = migrate_contest(&mut tables, contest_id, 2, now_utc()).unwrap();
        assert!(!report.current_stage_remapped);
        assert_eq!(
            tables.contest_instance(contest_id).unwrap().current_stage_id,
            Some(funds)
        );
    }

    #[test]
    fn test_same_version_is_noop_and_unknown_version_fails() {
        let Setup { mut tables, contest_id, .. } = setup();
        assert!(migrate_contest(&mut tables, contest_id, 1, now_utc()).unwrap().is_noop());
        assert!(migrate_contest(&mut tables, contest_id, 7, now_utc()).is_err());
        assert_eq!(tables.contest_instance(contest_id).unwrap().template_version, 1);
    }

    #[test]
    fn test_contests_to_migrate_skips_terminal_and_current() {
        let Setup { mut tables, contest_id, v1, .. } = setup();
        assert_eq!(contests_to_migrate(&tables, v1.id, 2), vec![contest_id]);
        assert!(contests_to_migrate(&tables, v1.id, 1).is_empty());

        let contest = tables.contest_instance_mut(contest_id).unwrap();
        contest.current_stage_id = None;
        contest.status = "Completed".to_string();
        assert!(contests_to_migrate(&tables, v1.id, 2).is_empty());
    }
}
