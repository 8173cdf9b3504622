//! Template operations running inside a transaction.

use tracing::info;
use uuid::Uuid;

use super::{ContestTemplate, ContestTemplateDraft, ProcedureTemplate, ProcedureTemplateDraft, TemplateKey};
use crate::chain::build_chain;
use crate::core::{ProcedureStageType, StageType};
use crate::errors::{EntityKind, InvalidTransitionError, Result, ValidationError};
use crate::events::{Outbox, TemplateVersionPublished};
use crate::storage::Tables;
use crate::utils::{generate_uuid, Timestamp};

pub(crate) fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(trimmed.to_string())
}

pub(crate) fn require_contests_stage(template: &ProcedureTemplate) -> Result<()> {
    if template.contests_stage_id().is_none() {
        return Err(ValidationError::MissingStageType {
            stage_type: ProcedureStageType::Contests.name().to_string(),
        }
        .into());
    }
    Ok(())
}

fn frozen(entity: EntityKind, id: Uuid, reason: &str) -> InvalidTransitionError {
    InvalidTransitionError::new(entity, id, reason)
}

fn ensure_editable_procedure(tables: &Tables, template: &ProcedureTemplate) -> Result<()> {
    if template.is_published {
        return Err(frozen(EntityKind::ProcedureTemplate, template.id, "template is published").into());
    }
    if tables.procedure_template_in_use(template.id) {
        return Err(frozen(EntityKind::ProcedureTemplate, template.id, "template has instances").into());
    }
    Ok(())
}

fn ensure_editable_contest(tables: &Tables, template: &ContestTemplate) -> Result<()> {
    if template.is_published {
        return Err(frozen(EntityKind::ContestTemplate, template.id, "template is published").into());
    }
    if tables.contest_template_in_use(template.key()) {
        return Err(frozen(EntityKind::ContestTemplate, template.id, "template has instances").into());
    }
    Ok(())
}

/// Creates an unpublished procedure template.
pub(crate) fn create_procedure_template(
    tables: &mut Tables,
    draft: ProcedureTemplateDraft,
    now: Timestamp,
) -> Result<ProcedureTemplate> {
    let name = validate_name(&draft.name)?;
    let version = match draft.version {
        Some(0) => return Err(ValidationError::InvalidVersion { version: 0 }.into()),
        Some(version) => version,
        None => {
            tables
                .procedure_templates()
                .filter(|t| t.name == name)
                .map(|t| t.version)
                .max()
                .unwrap_or(0)
                + 1
        }
    };

    let id = generate_uuid();
    let template = ProcedureTemplate {
        id,
        name,
        version,
        is_published: false,
        stages: build_chain(id, &draft.stages)?,
        created_at: now,
        updated_at: now,
    };
    require_contests_stage(&template)?;

    tables.put_procedure_template(template.clone());
    info!(template_id = %template.id, name = %template.name, version, "Created procedure template");
    Ok(template)
}

/// Replaces the name and whole chain of an unpublished procedure template.
pub(crate) fn update_procedure_template(
    tables: &mut Tables,
    id: Uuid,
    draft: ProcedureTemplateDraft,
    now: Timestamp,
) -> Result<ProcedureTemplate> {
    let current = tables.procedure_template(id)?.clone();
    ensure_editable_procedure(tables, &current)?;

    let mut updated = ProcedureTemplate {
        name: validate_name(&draft.name)?,
        stages: build_chain(id, &draft.stages)?,
        updated_at: now,
        ..current
    };
    if let Some(version) = draft.version {
        if version == 0 {
            return Err(ValidationError::InvalidVersion { version }.into());
        }
        updated.version = version;
    }
    require_contests_stage(&updated)?;

    tables.put_procedure_template(updated.clone());
    Ok(updated)
}

/// Publishes a procedure template, unpublishing every other template of the same name.
pub(crate) fn publish_procedure_template(
    tables: &mut Tables,
    id: Uuid,
    now: Timestamp,
) -> Result<ProcedureTemplate> {
    let template = tables.procedure_template(id)?.clone();
    if template.is_published {
        return Err(frozen(EntityKind::ProcedureTemplate, id, "template is already published").into());
    }
    template.stages.revalidate()?;
    require_contests_stage(&template)?;

    for other in tables.procedure_templates_mut() {
        if other.id != id && other.is_published && other.name == template.name {
            info!(template_id = %other.id, version = other.version, "Unpublishing superseded procedure template");
            other.is_published = false;
            other.updated_at = now;
        }
    }

    let published = tables.procedure_template_mut(id)?;
    published.is_published = true;
    published.updated_at = now;
    Ok(published.clone())
}

/// Deletes an unpublished, uninstantiated procedure template and its contest templates.
pub(crate) fn delete_procedure_template(tables: &mut Tables, id: Uuid) -> Result<()> {
    let template = tables.procedure_template(id)?.clone();
    if template.is_published {
        return Err(frozen(EntityKind::ProcedureTemplate, id, "cannot delete a published template").into());
    }
    if tables.procedure_template_in_use(id) {
        return Err(frozen(EntityKind::ProcedureTemplate, id, "cannot delete a template with instances").into());
    }

    let nested: Vec<ContestTemplate> = tables
        .contest_templates()
        .filter(|t| t.procedure_template_id == id)
        .cloned()
        .collect();
    for contest in &nested {
        if contest.is_published || tables.contest_template_in_use(contest.key()) {
            return Err(frozen(
                EntityKind::ProcedureTemplate,
                id,
                "a nested contest template is published or has instances",
            )
            .into());
        }
    }

    for contest in nested {
        tables.remove_contest_template(contest.key());
    }
    tables.remove_procedure_template(id);
    info!(template_id = %id, "Deleted procedure template");
    Ok(())
}

/// Creates version 1 of a contest template under a procedure template.
pub(crate) fn create_contest_template(
    tables: &mut Tables,
    procedure_template_id: Uuid,
    draft: ContestTemplateDraft,
    now: Timestamp,
) -> Result<ContestTemplate> {
    tables.procedure_template(procedure_template_id)?;
    let name = validate_name(&draft.name)?;

    let id = generate_uuid();
    let template = ContestTemplate {
        id,
        procedure_template_id,
        name,
        version: 1,
        is_published: false,
        status_model: draft.status_model,
        stages: build_chain(id, &draft.stages)?,
        created_at: now,
        updated_at: now,
    };

    tables.put_contest_template(template.clone());
    info!(template_id = %id, %procedure_template_id, "Created contest template");
    Ok(template)
}

/// Replaces name, status model and chain of an unpublished contest template version.
pub(crate) fn update_contest_template(
    tables: &mut Tables,
    key: TemplateKey,
    draft: ContestTemplateDraft,
    now: Timestamp,
) -> Result<ContestTemplate> {
    let current = tables.contest_template(key)?.clone();
    ensure_editable_contest(tables, &current)?;

    let updated = ContestTemplate {
        name: validate_name(&draft.name)?,
        status_model: draft.status_model,
        stages: build_chain(key.id, &draft.stages)?,
        updated_at: now,
        ..current
    };

    tables.put_contest_template(updated.clone());
    Ok(updated)
}

/// Copies the latest version of a contest template into an unpublished `version + 1`.
///
/// Stages receive fresh identities; only their types carry over.
pub(crate) fn create_contest_template_version(
    tables: &mut Tables,
    id: Uuid,
    now: Timestamp,
) -> Result<ContestTemplate> {
    let latest = tables.latest_contest_template(id)?.clone();
    let next = ContestTemplate {
        version: latest.version + 1,
        is_published: false,
        stages: latest.stages.with_fresh_identities(id),
        created_at: now,
        updated_at: now,
        ..latest
    };

    tables.put_contest_template(next.clone());
    info!(template_id = %id, version = next.version, "Created contest template version");
    Ok(next)
}

/// Publishes a contest template version.
///
/// Every other published version of the same template, and every published
/// template with the same name under the same procedure template, is
/// unpublished in the same transaction.
pub(crate) fn publish_contest_template(
    tables: &mut Tables,
    outbox: &mut Outbox,
    key: TemplateKey,
    now: Timestamp,
) -> Result<ContestTemplate> {
    let template = tables.contest_template(key)?.clone();
    if template.is_published {
        return Err(frozen(EntityKind::ContestTemplate, key.id, "template is already published").into());
    }
    template.stages.revalidate()?;
    if template.status_model.is_empty() {
        return Err(ValidationError::EmptyStatusModel.into());
    }

    for other in tables.contest_templates_mut() {
        let same_family = other.id == template.id
            || (other.procedure_template_id == template.procedure_template_id
                && other.name == template.name);
        if other.key() != key && other.is_published && same_family {
            info!(template = %other.key(), "Unpublishing superseded contest template");
            other.is_published = false;
            other.updated_at = now;
        }
    }

    let published = tables.contest_template_mut(key)?;
    published.is_published = true;
    published.updated_at = now;
    let published = published.clone();

    outbox.push(TemplateVersionPublished {
        template_id: published.id,
        procedure_template_id: published.procedure_template_id,
        name: published.name.clone(),
        version: published.version,
        stage_types: published
            .stages
            .stage_types()
            .iter()
            .map(|t| t.name().to_string())
            .collect(),
    });
    Ok(published)
}

/// Deletes an unpublished, uninstantiated contest template version.
pub(crate) fn delete_contest_template(tables: &mut Tables, key: TemplateKey) -> Result<()> {
    let template = tables.contest_template(key)?;
    if template.is_published {
        return Err(frozen(EntityKind::ContestTemplate, key.id, "cannot delete a published template").into());
    }
    if tables.contest_template_in_use(key) {
        return Err(frozen(EntityKind::ContestTemplate, key.id, "cannot delete a template with instances").into());
    }
    tables.remove_contest_template(key);
    Ok(())
}
