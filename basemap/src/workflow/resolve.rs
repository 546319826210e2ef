use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::TableMapping;
use crate::registry::{NameRegistry, placeholder};

static COMPOUND_FIELD_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(tbl[^_]+)_(fld.+)").expect("compound field ref pattern"));

/// Resolves workflow-local table and field references.
///
/// Workflow drafts refer to tables and fields through their own `TableMap`
/// (`ref_tbl...` keys, `ref_ref_tbl..._fld...` compound refs); those are
/// consulted before the snapshot registry.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    pub registry: &'a NameRegistry,
    tables: &'a IndexMap<String, TableMapping>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a NameRegistry, tables: &'a IndexMap<String, TableMapping>) -> Self {
        Self { registry, tables }
    }

    /// Table name for a workflow-local or real table id.
    pub fn table(&self, reference: &str) -> String {
        let reference = reference.trim_matches('"');
        if reference.is_empty() {
            return placeholder::missing("table");
        }
        if let Some(mapping) = self.tables.get(reference) {
            let real = mapping.table_id.trim_matches('"');
            if !real.is_empty() {
                return self.registry.table_label(real);
            }
        }
        self.registry.table_label(reference)
    }

    /// Field name for a workflow-local, compound, or real field id.
    pub fn field(&self, reference: &str) -> String {
        let reference = reference.trim_matches('"');
        if reference.is_empty() {
            return placeholder::missing("field");
        }
        let mut unresolved = reference;

        if reference.starts_with("ref_ref_tbl") || reference.starts_with("ref_tbl") {
            if let Some(caps) = COMPOUND_FIELD_REF.captures(reference)
                && let (Some(table), Some(field)) = (caps.get(1), caps.get(2))
            {
                let (table, field) = (table.as_str(), field.as_str());
                unresolved = field;

                let mapped = self
                    .tables
                    .get(&format!("ref_{table}"))
                    .map(|m| m.table_id.trim_matches('"'))
                    .and_then(|real| self.registry.field_name(real, field));
                if let Some(name) = mapped
                    .or_else(|| self.registry.field_name(table, field))
                    .or_else(|| self.registry.field_anywhere(field))
                {
                    return name.to_string();
                }
            }
        }

        for mapping in self.tables.values() {
            if let Some(real) = mapping.fields.get(reference) {
                if let Some(name) = self.registry.field_name(mapping.table_id.trim_matches('"'), real) {
                    return name.to_string();
                }
                unresolved = real;
            }
        }

        if let Some(name) = self.registry.field_anywhere(reference) {
            return name.to_string();
        }
        placeholder::deleted_field(unresolved)
    }

    /// Display form of a literal that may be an option id.
    pub fn option(&self, value: &str) -> String {
        self.registry.option_label(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (NameRegistry, IndexMap<String, TableMapping>) {
        let mut registry = NameRegistry::default();
        registry.record_table("tblOrders", "Orders");
        registry.record_field("tblOrders", "fldAmount", "Amount");
        registry.record_field("tblItems", "fldQty", "Quantity");

        let mut tables = IndexMap::new();
        tables.insert(
            "ref_tblLocal".to_string(),
            TableMapping {
                table_id: "tblOrders".into(),
                fields: [("ref_fldLocal".to_string(), "fldAmount".to_string())].into_iter().collect(),
            },
        );
        tables.insert(
            "ref_tblStale".to_string(),
            TableMapping {
                table_id: "tblDropped".into(),
                fields: IndexMap::new(),
            },
        );
        (registry, tables)
    }

    #[test]
    fn test_table_through_workflow_map() {
        let (registry, tables) = fixture();
        let resolver = Resolver::new(&registry, &tables);
        assert_eq!(resolver.table("ref_tblLocal"), "Orders");
        assert_eq!(resolver.table("\"tblOrders\""), "Orders");
        assert_eq!(resolver.table("ref_tblStale"), "[deleted table:tblDropped]");
        assert_eq!(resolver.table("tblNowhere"), "[deleted table:tblNowhere]");
        assert_eq!(resolver.table(""), "[unknown table:(none)]");
    }

    #[test]
    fn test_compound_field_refs() {
        let (registry, tables) = fixture();
        let resolver = Resolver::new(&registry, &tables);
        assert_eq!(resolver.field("ref_ref_tblLocal_fldAmount"), "Amount");
        assert_eq!(resolver.field("ref_tblItems_fldQty"), "Quantity");
        assert_eq!(resolver.field("ref_tblItems_fldGone"), "[deleted field:fldGone]");
    }

    #[test]
    fn test_local_and_plain_field_refs() {
        let (registry, tables) = fixture();
        let resolver = Resolver::new(&registry, &tables);
        assert_eq!(resolver.field("ref_fldLocal"), "Amount");
        assert_eq!(resolver.field("fldQty"), "Quantity");
        assert_eq!(resolver.field("fldMissing"), "[deleted field:fldMissing]");
    }
}
