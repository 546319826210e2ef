//! basemap core library.
//!
//! Decodes exported snapshots of a hosted tabular database, renders them into
//! human-readable documentation, audits that documentation for unresolved
//! identifiers, and computes semantic diffs between two snapshots.
//!
//! ```no_run
//! use basemap::{RawPayload, analyze};
//!
//! # fn run(text: &str) -> Result<(), basemap::DecodeError> {
//! let payload = RawPayload::from_json(text)?;
//! let analysis = analyze(&payload)?;
//! println!("{}", analysis.documents.field_table);
//! # Ok(())
//! # }
//! ```

pub mod checker;
pub mod decoder;
pub mod diff;
pub mod document;
pub mod errors;
pub mod fields;
pub mod formula;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod relations;
pub mod store;
pub mod workflow;

pub use checker::{CompletenessReport, Finding, Severity, check};
pub use decoder::{Blob, RawPayload};
pub use diff::{ChangeRecord, ChangeType, DiffOutcome, compare, diff};
pub use document::{DocumentKind, DocumentSet, DocumentSlices};
pub use errors::*;
pub use model::{AutomationState, Field, FieldType, Snapshot, Table};
pub use pipeline::{Analysis, analyze};
pub use registry::NameRegistry;
pub use relations::{RelationKind, Relationship};
pub use store::{FileStore, SnapshotStore, StoredVersion, project_id_from_url};
pub use workflow::{Step, StepKind, Workflow};
