//! Self-describing export document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::clone::rebuild_chain;
use crate::chain::StageRecord;
use crate::core::{ContestStageType, ProcedureStageType};
use crate::errors::{Result, ValidationError};
use crate::templates::{ContestTemplate, ProcedureTemplate};
use crate::utils::{import_date_stamp, Timestamp};

/// The only export format version this crate reads and writes.
pub const EXPORT_VERSION: &str = "1.0";

/// A procedure template with its contest templates, ready for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    /// Format version, always [`EXPORT_VERSION`] when written.
    pub export_version: String,
    /// When the document was produced.
    pub exported_at: Timestamp,
    /// SHA-256 (hex) of the canonical JSON of `procedure_template`.
    pub checksum: String,
    /// The exported tree.
    pub procedure_template: ProcedureTemplateSnapshot,
}

/// Exported procedure template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureTemplateSnapshot {
    /// Source template id.
    pub id: Uuid,
    /// Template name.
    pub name: String,
    /// Source version.
    pub version: u32,
    /// Source publication flag.
    pub is_published: bool,
    /// Stages with explicit links.
    pub stages: Vec<StageRecord<ProcedureStageType>>,
    /// Nested contest templates.
    #[serde(default)]
    pub contest_templates: Vec<ContestTemplateSnapshot>,
}

/// Exported contest template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestTemplateSnapshot {
    /// Source template id.
    pub id: Uuid,
    /// Template name.
    pub name: String,
    /// Source version.
    pub version: u32,
    /// Source publication flag.
    pub is_published: bool,
    /// Status labels.
    #[serde(default)]
    pub status_model: Vec<String>,
    /// Stages with explicit links.
    pub stages: Vec<StageRecord<ContestStageType>>,
}

impl ContestTemplateSnapshot {
    fn capture(template: &ContestTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            version: template.version,
            is_published: template.is_published,
            status_model: template.status_model.clone(),
            stages: template.stages.records(),
        }
    }
}

impl ProcedureTemplateSnapshot {
    /// Captures a procedure template and its contest templates.
    ///
    /// Only the latest version of each contest template is exported.
    #[must_use]
    pub fn capture<'a>(
        template: &ProcedureTemplate,
        contest_templates: impl IntoIterator<Item = &'a ContestTemplate>,
    ) -> Self {
        let mut latest: BTreeMap<Uuid, &ContestTemplate> = BTreeMap::new();
        for contest in contest_templates
            .into_iter()
            .filter(|c| c.procedure_template_id == template.id)
        {
            let newer = latest
                .get(&contest.id)
                .map_or(true, |current| contest.version > current.version);
            if newer {
                latest.insert(contest.id, contest);
            }
        }
        let mut contests: Vec<ContestTemplateSnapshot> = latest
            .into_values()
            .map(ContestTemplateSnapshot::capture)
            .collect();
        contests.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Self {
            id: template.id,
            name: template.name.clone(),
            version: template.version,
            is_published: template.is_published,
            stages: template.stages.records(),
            contest_templates: contests,
        }
    }

    /// SHA-256 (hex) of this tree's canonical JSON.
    pub fn checksum(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    fn validate_structure(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut unique = |id: Uuid| -> Result<()> {
            if seen.insert(id) {
                Ok(())
            } else {
                Err(snapshot_error(format!("identity {id} appears more than once")))
            }
        };

        unique(self.id)?;
        for stage in &self.stages {
            unique(stage.id)?;
        }
        for contest in &self.contest_templates {
            unique(contest.id)?;
            for stage in &contest.stages {
                unique(stage.id)?;
            }
        }

        let chain = rebuild_chain(self.id, &self.stages, Some)?;
        if chain.by_type(ProcedureStageType::Contests).is_none() {
            return Err(ValidationError::MissingStageType {
                stage_type: ProcedureStageType::Contests.to_string(),
            }
            .into());
        }
        for contest in &self.contest_templates {
            rebuild_chain(contest.id, &contest.stages, Some)?;
        }
        Ok(())
    }
}

impl SnapshotDocument {
    /// Wraps a captured tree, stamping the export time and checksum.
    pub fn new(procedure_template: ProcedureTemplateSnapshot, exported_at: Timestamp) -> Result<Self> {
        Ok(Self {
            export_version: EXPORT_VERSION.to_string(),
            exported_at,
            checksum: procedure_template.checksum()?,
            procedure_template,
        })
    }

    /// Parses a document without validating it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the document as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the format version, the checksum, identity uniqueness and that
    /// every stage link agrees with the order-derived chain.
    pub fn validate(&self) -> Result<()> {
        if self.export_version != EXPORT_VERSION {
            return Err(snapshot_error(format!(
                "unsupported export version '{}'",
                self.export_version
            )));
        }
        let actual = self.procedure_template.checksum()?;
        if !actual.eq_ignore_ascii_case(&self.checksum) {
            return Err(snapshot_error(format!(
                "checksum mismatch: document says {}, content hashes to {actual}",
                self.checksum
            )));
        }
        self.procedure_template.validate_structure()
    }

    /// File name for this document: `<name>_v<version>_<date>.json`.
    #[must_use]
    pub fn suggested_file_name(&self) -> String {
        format!(
            "{}_v{}_{}.json",
            self.procedure_template.name.replace(' ', "_"),
            self.procedure_template.version,
            import_date_stamp(self.exported_at)
        )
    }
}

pub(crate) fn snapshot_error(message: impl Into<String>) -> crate::errors::ContestflowError {
    ValidationError::Snapshot(message.into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContestflowError;
    use crate::testing::fixtures;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn document() -> SnapshotDocument {
        let (procedure, contests) = fixtures::template_tree().unwrap();
        let tree = ProcedureTemplateSnapshot::capture(&procedure, &contests);
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
        SnapshotDocument::new(tree, at).unwrap()
    }

    fn snapshot_message(err: ContestflowError) -> String {
        match err {
            ContestflowError::Validation(ValidationError::Snapshot(message)) => message,
            other => panic!("expected snapshot error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_document_round_trips_through_json() {
        let doc = document();
        doc.validate().unwrap();

        let json = doc.to_json_pretty().unwrap();
        assert!(json.contains("\"exportVersion\": \"1.0\""));
        assert!(json.contains("\"contestTemplates\""));
        assert!(json.contains("\"previousStageId\""));

        let parsed = SnapshotDocument::from_json_str(&json).unwrap();
        assert_eq!(parsed, doc);
        parsed.validate().unwrap();
    }

    #[test]
    fn test_capture_keeps_latest_contest_version_only() {
        let (procedure, mut contests) = fixtures::template_tree().unwrap();
        let mut newer = contests[0].clone();
        newer.version = 2;
        newer.name = "Newer".to_string();
        contests.push(newer);

        let tree = ProcedureTemplateSnapshot::capture(&procedure, &contests);
        assert_eq!(tree.contest_templates.len(), 1);
        assert_eq!(tree.contest_templates[0].version, 2);
    }

    #[test]
    fn test_unknown_export_version_is_rejected() {
        let mut doc = document();
        doc.export_version = "2.0".to_string();
        assert!(snapshot_message(doc.validate().unwrap_err()).contains("export version"));
    }

    #[test]
    fn test_tampering_breaks_checksum() {
        let mut doc = document();
        doc.procedure_template.name.push_str(" edited");
        assert!(snapshot_message(doc.validate().unwrap_err()).contains("checksum"));
    }

    #[test]
    fn test_links_must_match_order() {
        let mut doc = document();
        let stages = &mut doc.procedure_template.stages;
        stages[0].next_stage_id = None;
        doc.checksum = doc.procedure_template.checksum().unwrap();

        assert!(snapshot_message(doc.validate().unwrap_err()).contains("link"));
    }

    #[test]
    fn test_duplicate_identities_are_rejected() {
        let mut doc = document();
        let stage_id = doc.procedure_template.stages[0].id;
        doc.procedure_template.contest_templates[0].id = stage_id;
        doc.checksum = doc.procedure_template.checksum().unwrap();

        assert!(snapshot_message(doc.validate().unwrap_err()).contains("more than once"));
    }

    #[test]
    fn test_broken_chain_fails_chain_validation() {
        let mut doc = document();
        doc.procedure_template.stages[1].order = 7;
        doc.checksum = doc.procedure_template.checksum().unwrap();

        let err = doc.validate().unwrap_err();
        assert!(matches!(err, ContestflowError::Validation(ValidationError::Chain(_))));
    }

    #[test]
    fn test_suggested_file_name() {
        let doc = document();
        assert_eq!(doc.suggested_file_name(), "Grant_Programme_v1_2024-03-05.json");
    }
}
