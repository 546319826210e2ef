//! Cross-table relationship extraction.

use serde::Serialize;

use crate::formula::{self, quote};
use crate::model::{FieldType, Snapshot, Table, id_string};
use crate::registry::NameRegistry;

/// How a field reaches another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    FormulaReference,
    Lookup,
    Link { two_way: bool },
    OptionSync,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationKind::FormulaReference => write!(f, "Formula reference"),
            RelationKind::Lookup => write!(f, "Lookup"),
            RelationKind::Link { two_way: true } => write!(f, "Two-way link"),
            RelationKind::Link { two_way: false } => write!(f, "One-way link"),
            RelationKind::OptionSync => write!(f, "Option sync"),
        }
    }
}

/// One field that references another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub table_id: String,
    pub field_id: String,
    pub field_name: String,
    pub kind: RelationKind,
    /// Target table names (a formula may reference several).
    pub target_tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    /// Rendered `.FILTER(...)` conditions, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Translated formula text, if the relation is formula-driven.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl Relationship {
    /// Sentence describing the relation, as shown in the relationship document.
    pub fn logic(&self) -> String {
        let tables = self
            .target_tables
            .iter()
            .map(|t| quote(t))
            .collect::<Vec<_>>()
            .join(", ");
        let field = self.target_field.as_deref().map(quote).unwrap_or_default();

        let mut text = match self.kind {
            RelationKind::FormulaReference => "Computes from data in other tables".to_string(),
            RelationKind::Lookup => format!("Reads {field} from {tables}"),
            RelationKind::Link { .. } => format!("Links records with {tables}"),
            RelationKind::OptionSync => format!("Options synced live from {tables} field {field}"),
        };
        if let Some(filter) = &self.filter {
            text.push_str("<br>Filter: ");
            text.push_str(filter);
        }
        text
    }
}

/// Relationships of one table, in field order.
pub fn table_relationships(table: &Table, registry: &NameRegistry) -> Vec<Relationship> {
    let mut relationships = Vec::new();

    for field in table.fields.values() {
        let base = |kind: RelationKind, target_tables: Vec<String>| Relationship {
            table_id: table.id.clone(),
            field_id: field.id.clone(),
            field_name: field.label(),
            kind,
            target_tables,
            target_field: None,
            filter: None,
            formula: None,
        };

        match field.field_type {
            FieldType::Formula => {
                let source = field.prop_str("/formula").unwrap_or_default();
                let refs = formula::cross_table_refs(source, &table.id);
                if refs.is_empty() {
                    continue;
                }
                let targets = refs.iter().map(|id| registry.table_label(id)).collect();
                let mut rel = base(RelationKind::FormulaReference, targets);
                rel.filter = non_empty(formula::render_filter(source, &table.id, registry));
                rel.formula = Some(formula::translate(source, &table.id, registry));
                relationships.push(rel);
            }
            FieldType::Lookup => {
                let Some(target) = field.prop("/filterInfo/targetTable").and_then(id_string) else {
                    continue;
                };
                let target_field = field.prop("/targetField").and_then(id_string).unwrap_or_default();
                let mut rel = base(RelationKind::Lookup, vec![registry.table_label(&target)]);
                rel.target_field = Some(registry.field_label(&target, &target_field));
                if let Some(source) = field.prop_str("/formula") {
                    rel.filter = non_empty(formula::render_filter(source, &table.id, registry));
                    rel.formula = Some(formula::translate(source, &table.id, registry));
                }
                relationships.push(rel);
            }
            FieldType::SingleLink | FieldType::TwoWayLink => {
                let Some(target) = field.prop("/tableId").and_then(id_string) else {
                    continue;
                };
                let kind = RelationKind::Link {
                    two_way: field.field_type == FieldType::TwoWayLink,
                };
                relationships.push(base(kind, vec![registry.table_label(&target)]));
            }
            FieldType::SingleSelect | FieldType::MultiSelect => {
                let Some(target) = field.prop("/optionsRule/targetTable").and_then(id_string) else {
                    continue;
                };
                let target_field = field
                    .prop("/optionsRule/targetField")
                    .and_then(id_string)
                    .unwrap_or_default();
                let mut rel = base(RelationKind::OptionSync, vec![registry.table_label(&target)]);
                rel.target_field = Some(registry.field_label(&target, &target_field));
                relationships.push(rel);
            }
            _ => {}
        }
    }

    relationships
}

/// Relationships of every table that has any, tables in display order.
pub fn extract(snapshot: &Snapshot) -> Vec<(&Table, Vec<Relationship>)> {
    snapshot
        .sorted_tables()
        .into_iter()
        .filter_map(|table| {
            let rels = table_relationships(table, &snapshot.registry);
            (!rels.is_empty()).then_some((table, rels))
        })
        .collect()
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
