use anyhow::{Context, Result};
use basemap::{DiffOutcome, FileStore, SnapshotStore, compare, project_id_from_url};
use clap::Args;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;

use super::diff::show_changes;
use super::doc::{rendered_documents, write_all};
use super::run_analysis;
use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::OutputManager;
use crate::utils::{format_datetime, read_payload, write_document};

pub const CHANGES_FILE: &str = "changes.md";

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Sync A Project",
    commands: &[
        "basemap sync export.base --url https://host/base/AbC123   # Derive the project id from a URL",
        "basemap sync export.base --project AbC123                 # Name the project directly",
    ],
}];

#[derive(Args)]
pub struct SyncArgs {
    /// Snapshot container file
    pub file: PathBuf,

    /// Project identifier
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    pub project: Option<String>,

    /// Vendor URL containing `/base/<project>`
    #[arg(long)]
    pub url: Option<String>,

    /// Output directory (defaults to the configured one)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct SyncSummary<'a> {
    project: &'a str,
    version: u32,
    baseline: bool,
    outcome: Option<&'a DiffOutcome>,
    documents: Vec<String>,
}

fn baseline_report(project: &str) -> String {
    format!(
        "# Change report\n\n> First sync of project {project}. This version is the baseline for later comparisons.\n"
    )
}

pub fn handle_sync(args: SyncArgs, output: &OutputManager) -> Result<()> {
    let project = match (&args.project, &args.url) {
        (Some(project), _) => project.clone(),
        (None, Some(url)) => project_id_from_url(url)
            .with_context(|| format!("No /base/<project> segment in {url}"))?,
        (None, None) => anyhow::bail!("either --project or --url is required"),
    };

    let ctx = ProjectContext::find()?;
    if !ctx.is_initialized() {
        output.warning("No .basemap/config.toml found; using default settings");
    }
    let store = FileStore::new(ctx.store_dir()?, ctx.keep_versions());
    let out_dir = match args.out_dir {
        Some(dir) => dir,
        None => ctx.output_dir()?,
    };

    let payload = read_payload(&args.file)?;
    let analysis = run_analysis(&args.file, &payload, output)?;

    let previous = store
        .latest(&project)
        .with_context(|| format!("Failed to read stored versions of {project}"))?;
    let outcome = previous.as_ref().map(|prev| {
        output.verbose(&format!(
            "comparing against version {} from {}",
            prev.version,
            format_datetime(prev.created_at)
        ));
        compare(&prev.payload, &payload)
    });
    let changes = match &outcome {
        Some(outcome) => outcome.render(),
        None => baseline_report(&project),
    };

    if !output.is_json() {
        output.heading(&format!("Sync {project}"));
    }
    write_all(&out_dir, &analysis, output)?;
    let changes_path = write_document(&out_dir, CHANGES_FILE, &changes)?;
    output.file_written(&changes_path);

    let mut documents: IndexMap<String, String> = rendered_documents(&analysis)
        .into_iter()
        .map(|(name, text)| (name.to_string(), text))
        .collect();
    documents.insert(CHANGES_FILE.to_string(), changes);

    let stored = store
        .save(&project, &payload, documents)
        .with_context(|| format!("Failed to store {project}"))?;

    if output.is_json() {
        let summary = SyncSummary {
            project: &project,
            version: stored.version,
            baseline: outcome.is_none(),
            outcome: outcome.as_ref(),
            documents: stored.documents.keys().cloned().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match &outcome {
        Some(outcome) => {
            output.heading("Changes");
            show_changes(outcome, output);
        }
        None => output.info("First sync: stored as the baseline"),
    }
    output.success(&format!(
        "Stored {project} version {} in {}",
        stored.version,
        store.root().display()
    ));
    Ok(())
}
