use anyhow::Result;
use basemap::{Analysis, DocumentKind};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};

use super::load_analysis;
use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::OutputManager;
use crate::utils::write_document;

pub const COMPLETENESS_FILE: &str = "completeness.md";

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Write Documents",
        commands: &[
            "basemap doc export.base                   # Write all documents to the configured output dir",
            "basemap doc export.base --out-dir notes   # Write them somewhere else",
        ],
    },
    ExampleGroup {
        title: "Single Document",
        commands: &["basemap doc export.base --only relationships   # Print one document to stdout"],
    },
];

/// Documents selectable with `--only`
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
pub enum DocumentChoice {
    FieldTable,
    Relationships,
    AutomationMap,
    Completeness,
}

#[derive(Args)]
pub struct DocArgs {
    /// Snapshot container file
    pub file: PathBuf,

    /// Output directory (defaults to the configured one)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print a single document to stdout instead of writing files
    #[arg(long, value_enum)]
    pub only: Option<DocumentChoice>,
}

/// Every rendered document with its file name, completeness report last.
pub fn rendered_documents(analysis: &Analysis) -> Vec<(&'static str, String)> {
    let mut docs: Vec<(&'static str, String)> = analysis
        .documents
        .iter()
        .map(|(kind, text)| (kind.file_name(), text.to_string()))
        .collect();
    docs.push((COMPLETENESS_FILE, analysis.report.render()));
    docs
}

pub fn write_all(dir: &Path, analysis: &Analysis, output: &OutputManager) -> Result<()> {
    for (name, text) in rendered_documents(analysis) {
        let path = write_document(dir, name, &text)?;
        output.file_written(&path);
    }
    Ok(())
}

pub fn handle_doc(args: DocArgs, output: &OutputManager) -> Result<()> {
    let analysis = load_analysis(&args.file, output)?;

    if let Some(choice) = args.only {
        let text = match choice {
            DocumentChoice::FieldTable => analysis.documents.get(DocumentKind::FieldTable).to_string(),
            DocumentChoice::Relationships => {
                analysis.documents.get(DocumentKind::Relationships).to_string()
            }
            DocumentChoice::AutomationMap => {
                analysis.documents.get(DocumentKind::AutomationMap).to_string()
            }
            DocumentChoice::Completeness => analysis.report.render(),
        };
        output.document(&text);
        return Ok(());
    }

    let dir = match args.out_dir {
        Some(dir) => dir,
        None => ProjectContext::find()?.output_dir()?,
    };

    output.heading("Documents");
    write_all(&dir, &analysis, output)?;

    let problems = analysis.report.problem_count();
    if problems == 0 {
        output.success("Documents are complete");
    } else {
        output.warning(&format!(
            "{problems} completeness issue(s); see {COMPLETENESS_FILE}"
        ));
    }
    Ok(())
}
