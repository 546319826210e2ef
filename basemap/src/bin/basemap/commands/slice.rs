use anyhow::Result;
use basemap::{Analysis, DocumentSlices};
use clap::Args;
use std::path::PathBuf;

use super::load_analysis;
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Document Fragments",
    commands: &[
        "basemap slice export.base --table Orders          # Field table section of one table",
        "basemap slice export.base --workflow 73000000001  # One workflow of the automation map",
    ],
}];

#[derive(Args)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["table", "workflow"])))]
pub struct SliceArgs {
    /// Snapshot container file
    pub file: PathBuf,

    /// Table id or name
    #[arg(long)]
    pub table: Option<String>,

    /// Workflow id or title
    #[arg(long)]
    pub workflow: Option<String>,
}

enum Target<'a> {
    Table(&'a str),
    Workflow(&'a str),
}

/// Look a fragment up by identifier, falling back to its display name.
fn find_slice<'a>(analysis: &'a Analysis, target: &Target<'_>) -> Option<&'a str> {
    let DocumentSlices { tables, workflows } = &analysis.documents.slices;
    let registry = &analysis.snapshot.registry;
    match target {
        Target::Table(key) => tables.get(*key).or_else(|| {
            tables
                .iter()
                .find(|(id, _)| registry.table_name(id) == Some(*key))
                .map(|(_, text)| text)
        }),
        Target::Workflow(key) => workflows.get(*key).or_else(|| {
            analysis
                .snapshot
                .workflows()
                .iter()
                .find(|wf| wf.display_title(registry) == *key)
                .and_then(|wf| workflows.get(&wf.id))
        }),
    }
    .map(String::as_str)
}

pub fn handle_slice(args: SliceArgs, output: &OutputManager) -> Result<()> {
    let analysis = load_analysis(&args.file, output)?;

    let target = match (&args.table, &args.workflow) {
        (Some(table), _) => Target::Table(table),
        (None, Some(workflow)) => Target::Workflow(workflow),
        (None, None) => anyhow::bail!("either --table or --workflow is required"),
    };

    match find_slice(&analysis, &target) {
        Some(text) => {
            output.document(text);
            Ok(())
        }
        None => {
            let (kind, key) = match target {
                Target::Table(key) => ("table", key),
                Target::Workflow(key) => ("workflow", key),
            };
            output.error(&format!("No {kind} matches '{key}'"));
            anyhow::bail!("{kind} not found")
        }
    }
}
