//! Re-identification of an exported tree.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

use super::document::{snapshot_error, ProcedureTemplateSnapshot};
use crate::chain::{StageChain, StageRecord, StageSpec};
use crate::core::StageType;
use crate::errors::Result;
use crate::templates::{ContestTemplate, ProcedureTemplate};
use crate::utils::{import_date_stamp, IdRemapper, Timestamp};

#[allow(clippy::expect_used)]
static IMPORT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\(Imported \d{4}-\d{2}-\d{2}\)\s*$").expect("import suffix pattern is valid")
});

/// Appends ` (Imported YYYY-MM-DD)`, replacing any earlier import suffix.
#[must_use]
pub fn imported_name(name: &str, now: Timestamp) -> String {
    let base = IMPORT_SUFFIX.replace(name, "");
    format!("{} (Imported {})", base.trim_end(), import_date_stamp(now))
}

/// Rebuilds a chain from exported records.
///
/// Identities go through `remap`; the chain is rebuilt from orders with the
/// regular chain validation, then every exported link is checked against the
/// link derived from order.
pub(crate) fn rebuild_chain<T: StageType>(
    owner_template_id: Uuid,
    records: &[StageRecord<T>],
    remap: impl Fn(Uuid) -> Option<Uuid>,
) -> Result<StageChain<T>> {
    let resolve = |id: Uuid| {
        remap(id).ok_or_else(|| snapshot_error(format!("stage {id} has no assigned identity")))
    };

    let stages = records
        .iter()
        .map(|record| {
            Ok((
                resolve(record.id)?,
                StageSpec::new(record.stage_type, record.order, record.default_executor_name.clone()),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    let chain = StageChain::build_with_ids(owner_template_id, stages)?;

    for record in records {
        let id = resolve(record.id)?;
        let previous = record.previous_stage_id.map(&resolve).transpose()?;
        let next = record.next_stage_id.map(&resolve).transpose()?;
        if chain.previous_stage_id(id) != previous || chain.next_stage_id(id) != next {
            return Err(snapshot_error(format!(
                "stage {} ({}) has links that disagree with its order",
                record.id, record.stage_type
            )));
        }
    }
    Ok(chain)
}

/// The result of cloning an exported tree.
#[derive(Debug, Clone)]
pub struct ClonedTree {
    /// New procedure template, unpublished, version 1.
    pub procedure_template: ProcedureTemplate,
    /// New contest templates, unpublished, version 1.
    pub contest_templates: Vec<ContestTemplate>,
    /// Source to new identity table.
    pub identities: IdRemapper,
}

/// Deep-copies an exported tree under fresh identities.
///
/// The identity table is filled for every template and stage before any
/// chain is relinked.
pub fn clone_tree(source: &ProcedureTemplateSnapshot, now: Timestamp) -> Result<ClonedTree> {
    let mut ids = IdRemapper::new();
    ids.assign(source.id);
    for stage in &source.stages {
        ids.assign(stage.id);
    }
    for contest in &source.contest_templates {
        ids.assign(contest.id);
        for stage in &contest.stages {
            ids.assign(stage.id);
        }
    }

    let lookup = |id: Uuid| ids.get(id);
    let procedure_id = ids.get(source.id).ok_or_else(|| snapshot_error("procedure id unassigned"))?;
    let procedure_template = ProcedureTemplate {
        id: procedure_id,
        name: imported_name(&source.name, now),
        version: 1,
        is_published: false,
        stages: rebuild_chain(procedure_id, &source.stages, lookup)?,
        created_at: now,
        updated_at: now,
    };

    let contest_templates = source
        .contest_templates
        .iter()
        .map(|contest| {
            let id = ids
                .get(contest.id)
                .ok_or_else(|| snapshot_error("contest template id unassigned"))?;
            Ok(ContestTemplate {
                id,
                procedure_template_id: procedure_id,
                name: contest.name.clone(),
                version: 1,
                is_published: false,
                status_model: contest.status_model.clone(),
                stages: rebuild_chain(id, &contest.stages, lookup)?,
                created_at: now,
                updated_at: now,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ClonedTree {
        procedure_template,
        contest_templates,
        identities: ids,
    })
}
