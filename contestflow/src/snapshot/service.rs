//! Export and import through the store.

use std::path::Path;
use tracing::info;
use uuid::Uuid;

use super::{clone_tree, ClonedTree, ProcedureTemplateSnapshot, SnapshotDocument};
use crate::engine::Engine;
use crate::errors::{ContestflowError, Result};
use crate::utils::now_utc;

/// Serializes template trees to documents and re-imports them as new templates.
#[derive(Debug, Clone)]
pub struct SnapshotService {
    engine: Engine,
}

impl SnapshotService {
    /// Creates a new snapshot service.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Exports a procedure template with the latest version of each of its
    /// contest templates.
    pub async fn export(&self, procedure_template_id: Uuid) -> Result<SnapshotDocument> {
        let tree = self
            .engine
            .read(move |tables| {
                let procedure = tables.procedure_template(procedure_template_id)?;
                Ok(ProcedureTemplateSnapshot::capture(
                    procedure,
                    tables.contest_templates(),
                ))
            })
            .await?;
        let document = SnapshotDocument::new(tree, now_utc())?;
        info!(
            template_id = %procedure_template_id,
            contest_templates = document.procedure_template.contest_templates.len(),
            checksum = %document.checksum,
            "Exported procedure template"
        );
        Ok(document)
    }

    /// Validates a document and stores an unpublished copy under fresh identities.
    pub async fn import(&self, document: &SnapshotDocument) -> Result<ClonedTree> {
        document.validate()?;
        let cloned = clone_tree(&document.procedure_template, now_utc())?;

        let stored = cloned.clone();
        self.engine
            .transact(move |tables, _| {
                tables.put_procedure_template(stored.procedure_template);
                for contest in stored.contest_templates {
                    tables.put_contest_template(contest);
                }
                Ok(())
            })
            .await?;

        info!(
            source_id = %document.procedure_template.id,
            template_id = %cloned.procedure_template.id,
            name = %cloned.procedure_template.name,
            "Imported procedure template"
        );
        Ok(cloned)
    }

    /// Parses, validates and imports a JSON document.
    pub async fn import_json(&self, json: &str) -> Result<ClonedTree> {
        self.import(&SnapshotDocument::from_json_str(json)?).await
    }

    /// Exports to `dir`, returning the written path.
    pub async fn export_to_dir(&self, procedure_template_id: Uuid, dir: &Path) -> Result<std::path::PathBuf> {
        let document = self.export(procedure_template_id).await?;
        let path = dir.join(document.suggested_file_name());
        tokio::fs::write(&path, document.to_json_pretty()?)
            .await
            .map_err(|e| ContestflowError::storage(format!("failed to write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Reads and imports a document file.
    pub async fn import_file(&self, path: &Path) -> Result<ClonedTree> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ContestflowError::storage(format!("failed to read {}: {e}", path.display())))?;
        self.import_json(&json).await
    }
}
