use anyhow::Result;
use basemap::{ChangeType, DiffOutcome, compare};
use clap::Args;
use comfy_table::{Cell, Table};
use std::path::PathBuf;

use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, header_cells, themed_table};
use crate::utils::{read_payload, write_document};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Compare Snapshots",
    commands: &[
        "basemap diff old.base new.base                  # Summarise structural changes",
        "basemap diff old.base new.base --out changes.md # Also write the change report",
    ],
}];

#[derive(Args)]
pub struct DiffArgs {
    /// Previous snapshot container
    pub old: PathBuf,

    /// Current snapshot container
    pub new: PathBuf,

    /// Write the markdown change report to this file
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl TableDisplay for DiffOutcome {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options);
        table.set_header(header_cells(options, vec!["Change", "Entity", "Summary"]));
        match self.changes() {
            Some([]) => {
                table.add_row(vec![Cell::new("No changes detected")]);
            }
            Some(changes) => {
                for change in changes {
                    table.add_row(vec![
                        Cell::new(change.change_type()),
                        Cell::new(change.entity()),
                        Cell::new(change.summary()),
                    ]);
                }
            }
            None => {
                table.add_row(vec![Cell::new(self.render().trim_start_matches("# Change report").trim())]);
            }
        }
        table
    }

    fn to_compact(&self) -> String {
        match self.changes() {
            Some(changes) => {
                let count = |ty: ChangeType| changes.iter().filter(|c| c.change_type() == ty).count();
                format!(
                    "added={} removed={} modified={}",
                    count(ChangeType::Added),
                    count(ChangeType::Removed),
                    count(ChangeType::Modified)
                )
            }
            None => "unreadable".to_string(),
        }
    }
}

/// Print each change as a coloured summary line.
pub fn show_changes(outcome: &DiffOutcome, output: &OutputManager) {
    match outcome {
        DiffOutcome::Compared { changes, notes } => {
            if changes.is_empty() {
                output.info("No changes detected");
            }
            for change in changes {
                output.change(change.change_type(), &change.summary());
            }
            for note in notes {
                output.warning(note);
            }
        }
        _ => output.warning(outcome.render().trim_start_matches("# Change report").trim()),
    }
}

pub fn handle_diff(args: DiffArgs, output: &OutputManager) -> Result<()> {
    output.progress("Comparing snapshots");
    let old = read_payload(&args.old)?;
    let new = read_payload(&args.new)?;
    let outcome = compare(&old, &new);
    output.clear_line();

    if let Some(path) = &args.out {
        let dir = path.parent().map(PathBuf::from).unwrap_or_default();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("changes.md");
        let written = write_document(&dir, name, &outcome.render())?;
        output.file_written(&written);
    }

    if !output.is_json() {
        output.heading("Changes");
    }
    output.display(&outcome)?;
    if let DiffOutcome::Compared { notes, .. } = &outcome {
        for note in notes {
            output.warning(note);
        }
    }

    if outcome.changes().is_none() {
        anyhow::bail!("snapshots could not be compared");
    }
    Ok(())
}
