//! Semantic differences between two snapshots.
//!
//! Entities are matched by identifier. Survivors are compared on their
//! rendered descriptions, so a change that does not alter what a reader sees
//! is not a change.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::decoder::RawPayload;
use crate::document::escape_cell;
use crate::fields;
use crate::formula::quote;
use crate::model::{AutomationState, Field, Snapshot, Table};
use crate::registry::NameRegistry;
use crate::workflow::{RenderedStep, Workflow, render_workflow};

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Added => write!(f, "+"),
            ChangeType::Removed => write!(f, "-"),
            ChangeType::Modified => write!(f, "~"),
        }
    }
}

/// A table as named in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub id: String,
    pub name: String,
}

impl TableRef {
    fn new(table: &Table, registry: &NameRegistry) -> Self {
        Self {
            id: table.id.clone(),
            name: registry.table_label(&table.id),
        }
    }
}

/// Everything a reader sees of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub id: String,
    pub name: String,
    pub type_label: String,
    pub config: String,
    pub description: String,
}

impl FieldView {
    fn new(field: &Field, table_id: &str, registry: &NameRegistry) -> Self {
        let described = fields::describe(field, table_id, registry);
        Self {
            id: field.id.clone(),
            name: field.label(),
            type_label: described.type_label,
            config: described.config,
            description: described.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowRef {
    pub id: String,
    pub title: String,
}

impl WorkflowRef {
    fn new(workflow: &Workflow, registry: &NameRegistry) -> Self {
        Self {
            id: workflow.id.clone(),
            title: workflow.display_title(registry),
        }
    }
}

/// A rendered step, split into its title and its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub id: String,
    pub ordinal: usize,
    pub title: String,
    pub body: Vec<String>,
}

impl StepView {
    fn new(step: &RenderedStep) -> Self {
        Self {
            id: step_key(step),
            ordinal: step.ordinal,
            title: step.title.clone(),
            body: step.body.clone(),
        }
    }
}

fn step_key(step: &RenderedStep) -> String {
    step.id.clone().unwrap_or_else(|| format!("#{}", step.ordinal))
}

/// One semantic change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeRecord {
    TableAdded { table: TableRef },
    TableDeleted { table: TableRef },
    FieldAdded { table: TableRef, field: FieldView },
    FieldDeleted { table: TableRef, field: FieldView },
    FieldModified { table: TableRef, old: FieldView, new: FieldView },
    WorkflowAdded { workflow: WorkflowRef },
    WorkflowDeleted { workflow: WorkflowRef },
    StepAdded { workflow: WorkflowRef, step: StepView },
    StepDeleted { workflow: WorkflowRef, step: StepView },
    StepModified { workflow: WorkflowRef, old: StepView, new: StepView },
}

impl ChangeRecord {
    pub fn change_type(&self) -> ChangeType {
        match self {
            ChangeRecord::TableAdded { .. }
            | ChangeRecord::FieldAdded { .. }
            | ChangeRecord::WorkflowAdded { .. }
            | ChangeRecord::StepAdded { .. } => ChangeType::Added,
            ChangeRecord::TableDeleted { .. }
            | ChangeRecord::FieldDeleted { .. }
            | ChangeRecord::WorkflowDeleted { .. }
            | ChangeRecord::StepDeleted { .. } => ChangeType::Removed,
            ChangeRecord::FieldModified { .. } | ChangeRecord::StepModified { .. } => ChangeType::Modified,
        }
    }

    /// The kind of entity that changed.
    pub fn entity(&self) -> &'static str {
        match self {
            ChangeRecord::TableAdded { .. } | ChangeRecord::TableDeleted { .. } => "table",
            ChangeRecord::FieldAdded { .. }
            | ChangeRecord::FieldDeleted { .. }
            | ChangeRecord::FieldModified { .. } => "field",
            ChangeRecord::WorkflowAdded { .. } | ChangeRecord::WorkflowDeleted { .. } => "workflow",
            ChangeRecord::StepAdded { .. }
            | ChangeRecord::StepDeleted { .. }
            | ChangeRecord::StepModified { .. } => "step",
        }
    }

    /// One-line description, used by the CLI summary.
    pub fn summary(&self) -> String {
        let ty = self.change_type();
        match self {
            ChangeRecord::TableAdded { table } | ChangeRecord::TableDeleted { table } => {
                format!("{ty} table {}", quote(&table.name))
            }
            ChangeRecord::FieldAdded { table, field } | ChangeRecord::FieldDeleted { table, field } => {
                format!("{ty} field {}.{}", quote(&table.name), quote(&field.name))
            }
            ChangeRecord::FieldModified { table, new, .. } => {
                format!("{ty} field {}.{}", quote(&table.name), quote(&new.name))
            }
            ChangeRecord::WorkflowAdded { workflow } | ChangeRecord::WorkflowDeleted { workflow } => {
                format!("{ty} workflow {}", quote(&workflow.title))
            }
            ChangeRecord::StepAdded { workflow, step } | ChangeRecord::StepDeleted { workflow, step } => {
                format!("{ty} step {} of {}", step.ordinal, quote(&workflow.title))
            }
            ChangeRecord::StepModified { workflow, new, .. } => {
                format!("{ty} step {} of {}", new.ordinal, quote(&workflow.title))
            }
        }
    }
}

/// Compare two snapshots.
///
/// Added and surviving entities are named with the new snapshot's registry;
/// deleted entities with the old one. Workflows are left out when either
/// side's automation data failed to decode.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<ChangeRecord> {
    let mut changes = diff_tables(old, new);
    if automation_failure(old, new).is_none() {
        changes.extend(diff_workflows(old.workflows(), new.workflows(), &old.registry, &new.registry));
    }
    changes
}

/// Note explaining why workflows cannot be compared, if they cannot.
fn automation_failure(old: &Snapshot, new: &Snapshot) -> Option<String> {
    match (&old.automation, &new.automation) {
        (AutomationState::Failed(err), _) => Some(format!(
            "Workflow data of the previous snapshot could not be decoded ({err}); workflows were not compared."
        )),
        (_, AutomationState::Failed(err)) => Some(format!(
            "Workflow data of the current snapshot could not be decoded ({err}); workflows were not compared."
        )),
        _ => None,
    }
}

fn diff_tables(old: &Snapshot, new: &Snapshot) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    // Find removed tables
    for (id, table) in &old.tables {
        if !new.tables.contains_key(id) {
            changes.push(ChangeRecord::TableDeleted {
                table: TableRef::new(table, &old.registry),
            });
        }
    }

    // Find added tables
    for (id, table) in &new.tables {
        if !old.tables.contains_key(id) {
            changes.push(ChangeRecord::TableAdded {
                table: TableRef::new(table, &new.registry),
            });
        }
    }

    // Recurse into tables present on both sides
    for (id, new_table) in &new.tables {
        if let Some(old_table) = old.tables.get(id) {
            changes.extend(diff_fields(old_table, new_table, &old.registry, &new.registry));
        }
    }
    changes
}

fn diff_fields(
    old: &Table,
    new: &Table,
    old_registry: &NameRegistry,
    new_registry: &NameRegistry,
) -> Vec<ChangeRecord> {
    let table = TableRef::new(new, new_registry);
    let mut changes = Vec::new();

    for (id, field) in &old.fields {
        if !new.fields.contains_key(id) {
            changes.push(ChangeRecord::FieldDeleted {
                table: table.clone(),
                field: FieldView::new(field, &old.id, old_registry),
            });
        }
    }

    for (id, new_field) in &new.fields {
        let new_view = FieldView::new(new_field, &new.id, new_registry);
        match old.fields.get(id) {
            None => changes.push(ChangeRecord::FieldAdded {
                table: table.clone(),
                field: new_view,
            }),
            Some(old_field) => {
                let old_view = FieldView::new(old_field, &old.id, new_registry);
                if old_view != new_view {
                    changes.push(ChangeRecord::FieldModified {
                        table: table.clone(),
                        old: old_view,
                        new: new_view,
                    });
                }
            }
        }
    }
    changes
}

fn diff_workflows(
    old: &[Workflow],
    new: &[Workflow],
    old_registry: &NameRegistry,
    new_registry: &NameRegistry,
) -> Vec<ChangeRecord> {
    let old_map: IndexMap<&str, &Workflow> = old.iter().map(|w| (w.id.as_str(), w)).collect();
    let new_map: IndexMap<&str, &Workflow> = new.iter().map(|w| (w.id.as_str(), w)).collect();
    let mut changes = Vec::new();

    for (id, workflow) in &old_map {
        if !new_map.contains_key(id) {
            changes.push(ChangeRecord::WorkflowDeleted {
                workflow: WorkflowRef::new(workflow, old_registry),
            });
        }
    }

    for (id, workflow) in &new_map {
        if !old_map.contains_key(id) {
            changes.push(ChangeRecord::WorkflowAdded {
                workflow: WorkflowRef::new(workflow, new_registry),
            });
        }
    }

    for (id, new_wf) in &new_map {
        if let Some(old_wf) = old_map.get(id) {
            changes.extend(diff_steps(old_wf, new_wf, old_registry, new_registry));
        }
    }
    changes
}

fn diff_steps(
    old: &Workflow,
    new: &Workflow,
    old_registry: &NameRegistry,
    new_registry: &NameRegistry,
) -> Vec<ChangeRecord> {
    let workflow = WorkflowRef::new(new, new_registry);
    let old_deleted_view = render_workflow(old, old_registry);
    let old_view = render_workflow(old, new_registry);
    let new_view = render_workflow(new, new_registry);

    let old_steps: IndexMap<String, &RenderedStep> =
        old_view.steps.iter().map(|s| (step_key(s), s)).collect();
    let new_steps: IndexMap<String, &RenderedStep> =
        new_view.steps.iter().map(|s| (step_key(s), s)).collect();
    let mut changes = Vec::new();

    for step in &old_deleted_view.steps {
        if !new_steps.contains_key(&step_key(step)) {
            changes.push(ChangeRecord::StepDeleted {
                workflow: workflow.clone(),
                step: StepView::new(step),
            });
        }
    }

    for (key, new_step) in &new_steps {
        match old_steps.get(key) {
            None => changes.push(ChangeRecord::StepAdded {
                workflow: workflow.clone(),
                step: StepView::new(new_step),
            }),
            Some(old_step) => {
                if old_step.title != new_step.title || old_step.body != new_step.body {
                    changes.push(ChangeRecord::StepModified {
                        workflow: workflow.clone(),
                        old: StepView::new(old_step),
                        new: StepView::new(new_step),
                    });
                }
            }
        }
    }
    changes
}

/// Result of comparing two raw payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiffOutcome {
    /// Both sides decoded. `notes` explain anything left out of the comparison.
    Compared {
        changes: Vec<ChangeRecord>,
        notes: Vec<String>,
    },
    OldUnreadable { error: String },
    NewUnreadable { error: String },
    BothUnreadable { old_error: String, new_error: String },
}

impl DiffOutcome {
    pub fn changes(&self) -> Option<&[ChangeRecord]> {
        match self {
            DiffOutcome::Compared { changes, .. } => Some(changes),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            DiffOutcome::Compared { changes, notes } => render_change_report(changes, notes),
            DiffOutcome::OldUnreadable { error } => unreadable_report(&format!(
                "The previous snapshot could not be decoded ({error}) while the current one decodes. \
                 The stored copy is probably damaged or from an older export format; store a fresh \
                 baseline before comparing again."
            )),
            DiffOutcome::NewUnreadable { error } => unreadable_report(&format!(
                "The current snapshot could not be decoded ({error}) while the previous one decodes. \
                 The new capture is probably incomplete; capture it again."
            )),
            DiffOutcome::BothUnreadable { old_error, new_error } => unreadable_report(&format!(
                "Neither snapshot could be decoded (previous: {old_error}; current: {new_error})."
            )),
        }
    }
}

fn unreadable_report(message: &str) -> String {
    format!("# Change report\n\n> {message}\n")
}

/// Decode both payloads independently and compare them.
pub fn compare(old: &RawPayload, new: &RawPayload) -> DiffOutcome {
    let (old, new) = match (Snapshot::decode(old), Snapshot::decode(new)) {
        (Ok(old), Ok(new)) => (old, new),
        (Err(err), Ok(_)) => return DiffOutcome::OldUnreadable { error: err.to_string() },
        (Ok(_), Err(err)) => return DiffOutcome::NewUnreadable { error: err.to_string() },
        (Err(old_err), Err(new_err)) => {
            return DiffOutcome::BothUnreadable {
                old_error: old_err.to_string(),
                new_error: new_err.to_string(),
            };
        }
    };

    let notes: Vec<String> = automation_failure(&old, &new).into_iter().collect();
    let changes = diff(&old, &new);

    log::debug!("compared snapshots: {} changes", changes.len());
    DiffOutcome::Compared { changes, notes }
}

fn field_row(marker: &str, field: &FieldView) -> String {
    format!(
        "| {marker} | **{}** | {} | {} | {} | `{}` |",
        escape_cell(&field.name),
        escape_cell(&field.type_label),
        escape_cell(&field.description),
        escape_cell(&field.config),
        field.id
    )
}

fn quoted_body(lines: &mut Vec<String>, body: &[String]) {
    if body.is_empty() {
        lines.push("    > (empty)".to_string());
    }
    for line in body {
        lines.push(format!("    > {}", line.trim()));
    }
}

/// Render a change list as a markdown report.
pub fn render_change_report(changes: &[ChangeRecord], notes: &[String]) -> String {
    let mut lines = vec!["# Change report".to_string(), String::new()];
    for note in notes {
        lines.push(format!("> Note: {note}"));
        lines.push(String::new());
    }
    if changes.is_empty() {
        lines.push("> No changes detected".to_string());
        lines.push(String::new());
        return lines.join("\n");
    }
    lines.push(format!("> {} changes detected", changes.len()));

    let tables: Vec<&ChangeRecord> = changes
        .iter()
        .filter(|c| matches!(c, ChangeRecord::TableAdded { .. } | ChangeRecord::TableDeleted { .. }))
        .collect();
    let mut field_groups: IndexMap<&str, Vec<&ChangeRecord>> = IndexMap::new();
    let workflows: Vec<&ChangeRecord> = changes
        .iter()
        .filter(|c| matches!(c, ChangeRecord::WorkflowAdded { .. } | ChangeRecord::WorkflowDeleted { .. }))
        .collect();
    let mut step_groups: IndexMap<&str, Vec<&ChangeRecord>> = IndexMap::new();

    for change in changes {
        match change {
            ChangeRecord::FieldAdded { table, .. }
            | ChangeRecord::FieldDeleted { table, .. }
            | ChangeRecord::FieldModified { table, .. } => {
                field_groups.entry(table.name.as_str()).or_default().push(change)
            }
            ChangeRecord::StepAdded { workflow, .. }
            | ChangeRecord::StepDeleted { workflow, .. }
            | ChangeRecord::StepModified { workflow, .. } => {
                step_groups.entry(workflow.title.as_str()).or_default().push(change)
            }
            _ => {}
        }
    }

    if !tables.is_empty() || !field_groups.is_empty() {
        lines.push(String::new());
        lines.push("## Field table changes".to_string());
        if !tables.is_empty() {
            lines.push(String::new());
        }
        for change in &tables {
            match change {
                ChangeRecord::TableAdded { table } => {
                    lines.push(format!("- + **Table added**: {} (`{}`)", table.name, table.id))
                }
                ChangeRecord::TableDeleted { table } => {
                    lines.push(format!("- - **Table deleted**: {} (`{}`)", table.name, table.id))
                }
                _ => {}
            }
        }
        for (table, group) in &field_groups {
            lines.push(String::new());
            lines.push(format!("### {}", quote(table)));
            lines.push(String::new());
            lines.push("| Change | Field | Type | Description | Configuration | Field ID |".to_string());
            lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
            for change in group {
                match change {
                    ChangeRecord::FieldAdded { field, .. } => lines.push(field_row("+ added", field)),
                    ChangeRecord::FieldDeleted { field, .. } => lines.push(field_row("- deleted", field)),
                    ChangeRecord::FieldModified { old, new, .. } => {
                        lines.push(field_row("~ before", old));
                        lines.push(field_row("~ after", new));
                    }
                    _ => {}
                }
            }
        }
    }

    if !workflows.is_empty() || !step_groups.is_empty() {
        lines.push(String::new());
        lines.push("## Automation changes".to_string());
        if !workflows.is_empty() {
            lines.push(String::new());
        }
        for change in &workflows {
            match change {
                ChangeRecord::WorkflowAdded { workflow } => lines.push(format!(
                    "- + **Workflow added**: {} (`{}`)",
                    workflow.title, workflow.id
                )),
                ChangeRecord::WorkflowDeleted { workflow } => lines.push(format!(
                    "- - **Workflow deleted**: {} (`{}`)",
                    workflow.title, workflow.id
                )),
                _ => {}
            }
        }
        for (workflow, group) in &step_groups {
            lines.push(String::new());
            lines.push(format!("### Workflow {}", quote(workflow)));
            lines.push(String::new());
            for change in group {
                match change {
                    ChangeRecord::StepAdded { step, .. } => lines.push(format!(
                        "- + **Step added**: Step {}: {} (`{}`)",
                        step.ordinal, step.title, step.id
                    )),
                    ChangeRecord::StepDeleted { step, .. } => lines.push(format!(
                        "- - **Step deleted**: Step {}: {} (`{}`)",
                        step.ordinal, step.title, step.id
                    )),
                    ChangeRecord::StepModified { old, new, .. } => {
                        lines.push(format!(
                            "- ~ **Step modified**: Step {}: {} (`{}`)",
                            new.ordinal, new.title, new.id
                        ));
                        if old.title != new.title {
                            lines.push(format!("  - **Title**: \"{}\" -> \"{}\"", old.title, new.title));
                        }
                        if old.body != new.body {
                            lines.push("  - **Configuration**:".to_string());
                            lines.push("    > Before:".to_string());
                            quoted_body(&mut lines, &old.body);
                            lines.push("    >".to_string());
                            lines.push("    > After:".to_string());
                            quoted_body(&mut lines, &new.body);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn snapshot(fields: Value, steps: Value) -> Snapshot {
        let tree = json!([{
            "schema": {
                "tableMap": {"tblX": {"name": "Orders"}},
                "data": {"tables": [{"meta": {"id": "tblX"}, "fieldMap": fields}]}
            }
        }]);
        let automation = json!([{
            "id": "7300000000000000001",
            "status": 1,
            "WorkflowExtra": {"Draft": {"title": "Flow", "steps": steps}}
        }]);
        Snapshot::from_trees(&tree, Some(Ok(automation))).unwrap()
    }

    fn steps() -> Value {
        json!([
            {"id": "s1", "type": "AddRecordTrigger", "data": {"tableId": "tblX"}},
            {"id": "s2", "type": "IfElseBranch", "stepTitle": "Check", "data": {"meetConditionStepId": "s1"}}
        ])
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let a = snapshot(json!({"fldY": {"name": "Amount", "type": 2}}), steps());
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_field_rename_and_retype_is_one_modification() {
        let a = snapshot(json!({"fldY": {"name": "Amount", "type": 2}}), steps());
        let b = snapshot(
            json!({"fldY": {"name": "Total", "type": 20, "property": {"formula": "$table[tblX].$field[fldY] * 2"}}}),
            steps(),
        );
        let changes = diff(&a, &b);
        assert_eq!(changes.len(), 1);
        let ChangeRecord::FieldModified { table, old, new } = &changes[0] else {
            panic!("expected a field modification, got {changes:?}");
        };
        assert_eq!(table.name, "Orders");
        assert_eq!((old.name.as_str(), old.type_label.as_str()), ("Amount", "Number"));
        assert_eq!((new.name.as_str(), new.type_label.as_str()), ("Total", "Formula"));
        assert_eq!(new.config, "`「Orders」.「Total」 * 2`");
    }

    #[test]
    fn test_step_title_and_body_changes() {
        let a = snapshot(json!({}), steps());
        let b = snapshot(
            json!({}),
            json!([
                {"id": "s1", "type": "AddRecordTrigger", "data": {"tableId": "tblX"}},
                {"id": "s2", "type": "IfElseBranch", "stepTitle": "Check again", "data": {"meetConditionStepId": "s3"}},
                {"id": "s3", "type": "DeleteRecordAction", "data": {}}
            ]),
        );
        let changes = diff(&a, &b);
        assert_eq!(changes.len(), 2);
        let ChangeRecord::StepModified { old, new, .. } = &changes[0] else {
            panic!("expected a step modification, got {changes:?}");
        };
        assert_eq!(old.title, "Check");
        assert_eq!(new.title, "Check again");
        assert!(new.body.contains(&"  - If met: jump to step 3".to_string()));
        assert!(matches!(changes[1], ChangeRecord::StepAdded { .. }));

        let report = render_change_report(&changes, &[]);
        assert!(report.contains("  - **Title**: \"Check\" -> \"Check again\""));
        assert!(report.contains("    > - If met: jump to step 1"));
        assert!(report.contains("- + **Step added**: Step 3: Delete records (`s3`)"));
    }

    #[test]
    fn test_table_deletion_uses_old_names() {
        let a = snapshot(json!({}), json!([]));
        let empty = Snapshot::from_trees(&json!([]), Some(Ok(json!([])))).unwrap();
        let changes = diff(&a, &empty);
        assert_eq!(
            changes,
            vec![
                ChangeRecord::TableDeleted {
                    table: TableRef {
                        id: "tblX".into(),
                        name: "Orders".into()
                    }
                },
                ChangeRecord::WorkflowDeleted {
                    workflow: WorkflowRef {
                        id: "7300000000000000001".into(),
                        title: "Flow".into()
                    }
                },
            ]
        );
        assert_eq!(changes[0].summary(), "- table 「Orders」");
        let back = diff(&empty, &a);
        assert!(matches!(back[0], ChangeRecord::TableAdded { .. }));
    }

    #[test]
    fn test_empty_change_list_renders_no_changes() {
        assert!(render_change_report(&[], &[]).contains("No changes detected"));
    }
}
