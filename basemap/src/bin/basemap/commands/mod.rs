pub mod check;
pub mod diff;
pub mod doc;
pub mod init;
pub mod slice;
pub mod sync;

use anyhow::{Context, Result};
use basemap::{Analysis, RawPayload, analyze};
use std::path::Path;

use crate::output::OutputManager;
use crate::utils::read_payload;

/// Read a container file and run the whole pipeline on it.
pub fn load_analysis(path: &Path, output: &OutputManager) -> Result<Analysis> {
    let payload = read_payload(path)?;
    run_analysis(path, &payload, output)
}

/// Run the pipeline on a payload already read from `path`.
pub fn run_analysis(path: &Path, payload: &RawPayload, output: &OutputManager) -> Result<Analysis> {
    output.progress(&format!("Decoding {}", path.display()));
    let analysis = analyze(payload).with_context(|| format!("Failed to decode {}", path.display()));
    output.clear_line();
    let analysis = analysis?;

    output.verbose(&format!(
        "{} tables, {} fields, {} workflows",
        analysis.snapshot.tables.len(),
        analysis.snapshot.field_count(),
        analysis.snapshot.workflows().len()
    ));
    Ok(analysis)
}
