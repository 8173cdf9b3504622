//! Command line companion for snapshot files and configuration.
//!
//! ```text
//! contestflow validate <snapshot.json>
//! contestflow import <snapshot.json>
//! contestflow config [config.json]
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use contestflow::config::OrchestratorConfig;
use contestflow::observability::init_tracing;
use contestflow::runtime::Contestflow;
use contestflow::snapshot::SnapshotDocument;

const USAGE: &str = "usage: contestflow <validate|import> <snapshot.json> | contestflow config [config.json]";

enum Command {
    Validate(PathBuf),
    Import(PathBuf),
    Config(Option<PathBuf>),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let command = args.next().context(USAGE)?;
    let path = args.next().map(PathBuf::from);
    match (command.as_str(), path) {
        ("validate", Some(path)) => Ok(Command::Validate(path)),
        ("import", Some(path)) => Ok(Command::Import(path)),
        ("config", path) => Ok(Command::Config(path)),
        _ => bail!(USAGE),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };
    Ok(config.apply_env()?)
}

fn read_document(path: &PathBuf) -> Result<SnapshotDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    SnapshotDocument::from_json_str(&raw)
        .with_context(|| format!("{} is not a snapshot document", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let command = parse_args(std::env::args().skip(1))?;
    let config_path = match &command {
        Command::Config(path) => path.clone(),
        Command::Validate(_) | Command::Import(_) => None,
    };
    let config = load_config(config_path.as_ref())?;
    init_tracing(&config.logging)?;

    match command {
        Command::Validate(path) => {
            let document = read_document(&path)?;
            document.validate()?;
            let tree = &document.procedure_template;
            println!(
                "{}: valid ({} v{}, {} stages, {} contest templates)",
                path.display(),
                tree.name,
                tree.version,
                tree.stages.len(),
                tree.contest_templates.len()
            );
        }
        Command::Import(path) => {
            let document = read_document(&path)?;
            let flow = Contestflow::builder().with_config(config).build();
            let cloned = flow.snapshots().import(&document).await?;
            let summary = serde_json::json!({
                "procedureTemplateId": cloned.procedure_template.id,
                "name": cloned.procedure_template.name,
                "contestTemplateIds": cloned
                    .contest_templates
                    .iter()
                    .map(|c| c.id)
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Config(_) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
