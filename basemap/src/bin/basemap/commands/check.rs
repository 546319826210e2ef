use anyhow::Result;
use basemap::{CompletenessReport, Severity};
use clap::Args;
use comfy_table::{Cell, Table};
use std::path::PathBuf;

use super::load_analysis;
use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, header_cells, severity_cell, themed_table};
use crate::utils::truncate;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Completeness Audit",
    commands: &[
        "basemap check export.base                 # List unresolved identifiers and unknown keys",
        "basemap check export.base --strict        # Exit non-zero when anything is found",
        "basemap --output json check export.base   # Machine-readable report",
    ],
}];

#[derive(Args)]
pub struct CheckArgs {
    /// Snapshot container file
    pub file: PathBuf,

    /// Fail when the report lists any problem
    #[arg(long)]
    pub strict: bool,
}

impl TableDisplay for CompletenessReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options);
        table.set_header(header_cells(
            options,
            vec!["Severity", "Document", "Line", "Location", "Text", "Diagnosis"],
        ));

        for key in &self.unknown_keys {
            table.add_row(vec![
                severity_cell(options, Severity::Medium),
                Cell::new("payload"),
                Cell::new(""),
                Cell::new(key.scope.to_string()),
                Cell::new(&key.key),
                Cell::new(format!("Unrecognised key ({} occurrence(s))", key.occurrences)),
            ]);
        }

        for finding in &self.findings {
            let location = match (&finding.section, &finding.row) {
                (Some(section), Some(row)) => format!("{section} / {row}"),
                (Some(section), None) => section.clone(),
                (None, Some(row)) => row.clone(),
                (None, None) => String::new(),
            };
            table.add_row(vec![
                severity_cell(options, finding.severity),
                Cell::new(finding.document.file_name()),
                Cell::new(finding.line),
                Cell::new(truncate(&location, 40)),
                Cell::new(truncate(&finding.text, 48)),
                Cell::new(&finding.reason),
            ]);
        }

        if self.is_complete() {
            table.add_row(vec![Cell::new("No problems found")]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "workflows={} coverage={:.1}% high={} medium={} low={} unknown_keys={}",
            self.workflows,
            self.coverage(),
            self.count(Severity::High),
            self.count(Severity::Medium),
            self.count(Severity::Low),
            self.unknown_keys.len()
        )
    }
}

pub fn handle_check(args: CheckArgs, output: &OutputManager) -> Result<()> {
    let analysis = load_analysis(&args.file, output)?;
    let report = &analysis.report;

    if !output.is_json() {
        output.heading("Completeness");
        output.key_value("Workflows parsed", &report.workflows.to_string());
        output.key_value("Step key coverage", &format!("{:.1}%", report.coverage()));
        for step_type in &report.unknown_step_types {
            output.bullet(&format!("Unrecognised step type: {step_type}"));
        }
    }
    output.display(report)?;

    if report.is_complete() {
        output.success("Documents are complete");
    } else {
        output.warning(&format!("{} problem(s) found", report.problem_count()));
        if args.strict {
            anyhow::bail!("completeness check failed");
        }
    }
    Ok(())
}
