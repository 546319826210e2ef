//! Assembly of the three documentation artifacts.
//!
//! Each document renders on its own from a [`Snapshot`]; none of them embeds
//! a timestamp, so the same snapshot always renders the same text.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::fields;
use crate::model::{AutomationState, Snapshot, Table};
use crate::relations::{self, Relationship};
use crate::registry::NameRegistry;
use crate::workflow::{RenderedWorkflow, render_workflow};

/// The documents produced for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    FieldTable,
    Relationships,
    AutomationMap,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::FieldTable,
        DocumentKind::Relationships,
        DocumentKind::AutomationMap,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            DocumentKind::FieldTable => "field-table.md",
            DocumentKind::Relationships => "relationships.md",
            DocumentKind::AutomationMap => "automation-map.md",
        }
    }

    pub fn render(self, snapshot: &Snapshot) -> String {
        match self {
            DocumentKind::FieldTable => render_field_table(snapshot),
            DocumentKind::Relationships => render_relationships(snapshot),
            DocumentKind::AutomationMap => render_automation_map(snapshot),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::FieldTable => "field table",
            DocumentKind::Relationships => "relationships",
            DocumentKind::AutomationMap => "automation map",
        };
        f.write_str(name)
    }
}

/// Per-table and per-workflow fragments, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSlices {
    pub tables: IndexMap<String, String>,
    pub workflows: IndexMap<String, String>,
}

/// All rendered documents of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSet {
    pub field_table: String,
    pub relationships: String,
    pub automation_map: String,
    pub slices: DocumentSlices,
}

impl DocumentSet {
    pub fn render(snapshot: &Snapshot) -> Self {
        Self {
            field_table: render_field_table(snapshot),
            relationships: render_relationships(snapshot),
            automation_map: render_automation_map(snapshot),
            slices: render_slices(snapshot),
        }
    }

    pub fn get(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::FieldTable => &self.field_table,
            DocumentKind::Relationships => &self.relationships,
            DocumentKind::AutomationMap => &self.automation_map,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocumentKind, &str)> {
        DocumentKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

/// Make text safe for a markdown table cell.
pub fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>")
}

fn row(cells: &[&str]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// `## name` section of the field table for one table.
pub fn table_section(table: &Table, registry: &NameRegistry) -> String {
    let mut sorted: Vec<_> = table.fields.values().collect();
    sorted.sort_by(|a, b| a.label().cmp(&b.label()).then_with(|| a.id.cmp(&b.id)));

    let mut lines = vec![
        format!("## {}", registry.table_label(&table.id)),
        format!("- Table ID: `{}`", table.id),
        format!("- Fields: {}", sorted.len()),
        String::new(),
        row(&["Field", "Type", "AI", "Description", "Configuration", "Field ID"]),
        row(&["---", "---", "---", "---", "---", "---"]),
    ];

    for field in sorted {
        let described = fields::describe(field, &table.id, registry);
        let id = format!("`{}`", field.id);
        lines.push(row(&[
            &escape_cell(&field.label()),
            &described.type_label,
            if described.is_ai { "Yes" } else { "" },
            &escape_cell(&described.description),
            &escape_cell(&described.config),
            &id,
        ]));
    }
    lines.join("\n")
}

pub fn render_field_table(snapshot: &Snapshot) -> String {
    let mut doc = vec![
        "# Field table".to_string(),
        String::new(),
        format!(
            "> Tables: {}, fields: {}",
            snapshot.tables.len(),
            snapshot.field_count()
        ),
    ];
    for table in snapshot.sorted_tables() {
        doc.push(String::new());
        doc.push(table_section(table, &snapshot.registry));
    }
    doc.push(String::new());
    doc.join("\n")
}

fn relationship_row(rel: &Relationship) -> String {
    let mut logic = rel.logic();
    if let Some(formula) = &rel.formula {
        logic.push_str(&format!("<br>Formula: `{formula}`"));
    }
    row(&[
        &escape_cell(&rel.field_name),
        &rel.kind.to_string(),
        &escape_cell(&rel.target_tables.join(", ")),
        &escape_cell(&logic),
    ])
}

pub fn render_relationships(snapshot: &Snapshot) -> String {
    let extracted = relations::extract(snapshot);
    let total: usize = extracted.iter().map(|(_, rels)| rels.len()).sum();

    let mut doc = vec![
        "# Relationships".to_string(),
        String::new(),
        format!(
            "> Tables with relationships: {}, relationships: {total}",
            extracted.len()
        ),
    ];
    for (table, rels) in &extracted {
        doc.push(String::new());
        doc.push(format!("## {}", snapshot.registry.table_label(&table.id)));
        doc.push(String::new());
        doc.push(row(&["Field", "Kind", "Target table", "Logic"]));
        doc.push(row(&["---", "---", "---", "---"]));
        doc.extend(rels.iter().map(relationship_row));
    }
    doc.push(String::new());
    doc.join("\n")
}

/// Rendered visible workflows and the number hidden from the sidebar.
fn visible_workflows(snapshot: &Snapshot) -> (Vec<RenderedWorkflow>, usize) {
    let all = snapshot.workflows();
    let visible: Vec<RenderedWorkflow> = all
        .iter()
        .filter(|wf| wf.is_visible(&snapshot.registry))
        .map(|wf| render_workflow(wf, &snapshot.registry))
        .collect();
    let hidden = all.len() - visible.len();
    (visible, hidden)
}

pub fn render_automation_map(snapshot: &Snapshot) -> String {
    let mut doc = vec!["# Automation map".to_string(), String::new()];

    match &snapshot.automation {
        AutomationState::Absent => {
            doc.push("> This snapshot carries no automation data.".to_string());
            doc.push(String::new());
            return doc.join("\n");
        }
        AutomationState::Failed(err) => {
            doc.push(format!("> Automation data could not be decoded: {err}"));
            doc.push(String::new());
            return doc.join("\n");
        }
        AutomationState::Decoded(_) => {}
    }

    let (visible, hidden) = visible_workflows(snapshot);
    let (enabled, disabled): (Vec<_>, Vec<_>) = visible.iter().partition(|wf| wf.enabled);

    doc.push(format!("> Workflows: {}", visible.len()));
    doc.push(String::new());
    doc.push(format!("- Enabled: {}", enabled.len()));
    doc.push(format!("- Disabled: {}", disabled.len()));
    if hidden > 0 {
        doc.push(format!("- Removed from the sidebar: {hidden} (not shown)"));
    }

    for (heading, group) in [("Enabled", enabled), ("Disabled", disabled)] {
        if group.is_empty() {
            continue;
        }
        doc.push(String::new());
        doc.push(format!("### {heading}"));
        for wf in group {
            doc.push(String::new());
            doc.push(wf.to_markdown());
            doc.push(String::new());
            doc.push("---".to_string());
        }
    }
    doc.push(String::new());
    doc.join("\n")
}

pub fn render_slices(snapshot: &Snapshot) -> DocumentSlices {
    let tables = snapshot
        .sorted_tables()
        .into_iter()
        .map(|table| (table.id.clone(), table_section(table, &snapshot.registry)))
        .collect();
    let workflows = visible_workflows(snapshot)
        .0
        .into_iter()
        .map(|wf| (wf.id.clone(), wf.to_markdown()))
        .collect();
    DocumentSlices { tables, workflows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn snapshot(automation: Option<Value>) -> Snapshot {
        let tree = json!([{
            "schema": {
                "tableMap": {"tblOrders01": {"name": "Orders"}, "tblItems001": {"name": "Items"}},
                "base": {"blockInfos": {"b1": {"blockToken": "7300000000000000001", "name": "Mark paid"}}},
                "data": {"tables": [
                    {"meta": {"id": "tblOrders01"}, "fieldMap": {
                        "fldTotal01": {"name": "Total", "type": 20, "property": {"formula": "$table[tblItems001].$field[fldPrice01].SUM()"}},
                        "fldNote001": {"name": "Note | memo", "type": 1, "description": {"text": "free\ntext"}}
                    }},
                    {"meta": {"id": "tblItems001"}, "fieldMap": {
                        "fldPrice01": {"name": "Price", "type": 2}
                    }}
                ]}
            }
        }]);
        Snapshot::from_trees(&tree, automation.map(Ok)).unwrap()
    }

    fn workflows() -> Value {
        json!([
            {"id": "7300000000000000001", "status": 1, "WorkflowExtra": {"Draft": "{\"steps\": []}"}},
            {"id": "7300000000000000002", "status": 0, "WorkflowExtra": {"Draft": "{\"title\": \"Old\", \"steps\": []}"}},
            {"id": "7300000000000000003", "status": 1, "WorkflowExtra": {"Draft": "{\"steps\": []}"}}
        ])
    }

    #[test]
    fn test_field_table_layout() {
        let doc = render_field_table(&snapshot(None));
        assert!(doc.starts_with("# Field table\n\n> Tables: 2, fields: 3\n"));
        // Items sorts before Orders.
        let items = doc.find("## Items").unwrap();
        let orders = doc.find("## Orders").unwrap();
        assert!(items < orders);
        assert!(doc.contains("| Note \\| memo | Text |  | free<br>text | - | `fldNote001` |"));
        assert!(doc.contains("| Total | Formula |  |  | `「Items」.「Price」.SUM()` | `fldTotal01` |"));
    }

    #[test]
    fn test_relationships_skip_tables_without_any() {
        let doc = render_relationships(&snapshot(None));
        assert!(doc.contains("> Tables with relationships: 1, relationships: 1"));
        assert!(doc.contains("## Orders"));
        assert!(!doc.contains("## Items"));
    }

    #[test]
    fn test_automation_map_hides_unlisted_workflows() {
        let doc = render_automation_map(&snapshot(Some(workflows())));
        assert!(doc.contains("> Workflows: 2"));
        assert!(doc.contains("- Enabled: 1"));
        assert!(doc.contains("- Disabled: 1"));
        assert!(doc.contains("- Removed from the sidebar: 1 (not shown)"));
        assert!(doc.contains("## Mark paid"));
        assert!(doc.contains("## Old"));
        assert!(!doc.contains("7300000000000000003"));
    }

    #[test]
    fn test_automation_map_without_automation() {
        let doc = render_automation_map(&snapshot(None));
        assert!(doc.contains("no automation data"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = DocumentSet::render(&snapshot(Some(workflows())));
        let b = DocumentSet::render(&snapshot(Some(workflows())));
        assert_eq!(a, b);
        assert_eq!(a.slices.tables.len(), 2);
        assert_eq!(a.slices.workflows.len(), 2);
        assert!(a.slices.tables["tblOrders01"].starts_with("## Orders"));
    }
}
