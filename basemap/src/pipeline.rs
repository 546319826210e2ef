//! The end-to-end pass: payload in, documents and audit out.

use crate::checker::{self, CompletenessReport};
use crate::decoder::RawPayload;
use crate::document::DocumentSet;
use crate::errors::DecodeResult;
use crate::model::Snapshot;

/// Everything derived from one payload.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub snapshot: Snapshot,
    pub documents: DocumentSet,
    pub report: CompletenessReport,
}

impl Analysis {
    /// Run the pipeline on an already-decoded snapshot.
    pub fn of(snapshot: Snapshot) -> Self {
        let documents = DocumentSet::render(&snapshot);
        let report = checker::check(&snapshot, &documents);
        Self {
            snapshot,
            documents,
            report,
        }
    }
}

/// Decode a payload and render every artifact.
pub fn analyze(payload: &RawPayload) -> DecodeResult<Analysis> {
    let snapshot = Snapshot::decode(payload)?;
    log::debug!(
        "analyzing snapshot: {} tables, {} fields, {} workflows",
        snapshot.tables.len(),
        snapshot.field_count(),
        snapshot.workflows().len()
    );
    Ok(Analysis::of(snapshot))
}
