//! Decoded snapshot types: tables, typed fields, and the automation state.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::decoder::RawPayload;
use crate::errors::{DecodeError, DecodeResult};
use crate::registry::{NameRegistry, placeholder};
use crate::workflow::{self, Workflow};

/// Field type, decoded from the vendor's integer type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    SingleSelect,
    MultiSelect,
    Date,
    Checkbox,
    Person,
    Phone,
    Url,
    Attachment,
    SingleLink,
    Lookup,
    Formula,
    TwoWayLink,
    Location,
    Group,
    CreatedTime,
    ModifiedTime,
    CreatedBy,
    ModifiedBy,
    AutoNumber,
    Button,
    Unknown(i64),
}

impl FieldType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => FieldType::Text,
            2 => FieldType::Number,
            3 => FieldType::SingleSelect,
            4 => FieldType::MultiSelect,
            5 => FieldType::Date,
            7 => FieldType::Checkbox,
            11 => FieldType::Person,
            13 => FieldType::Phone,
            15 => FieldType::Url,
            17 => FieldType::Attachment,
            18 => FieldType::SingleLink,
            19 => FieldType::Lookup,
            20 => FieldType::Formula,
            21 => FieldType::TwoWayLink,
            22 => FieldType::Location,
            23 => FieldType::Group,
            1001 => FieldType::CreatedTime,
            1002 => FieldType::ModifiedTime,
            1003 => FieldType::CreatedBy,
            1004 => FieldType::ModifiedBy,
            1005 => FieldType::AutoNumber,
            3001 => FieldType::Button,
            other => FieldType::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            FieldType::Text => 1,
            FieldType::Number => 2,
            FieldType::SingleSelect => 3,
            FieldType::MultiSelect => 4,
            FieldType::Date => 5,
            FieldType::Checkbox => 7,
            FieldType::Person => 11,
            FieldType::Phone => 13,
            FieldType::Url => 15,
            FieldType::Attachment => 17,
            FieldType::SingleLink => 18,
            FieldType::Lookup => 19,
            FieldType::Formula => 20,
            FieldType::TwoWayLink => 21,
            FieldType::Location => 22,
            FieldType::Group => 23,
            FieldType::CreatedTime => 1001,
            FieldType::ModifiedTime => 1002,
            FieldType::CreatedBy => 1003,
            FieldType::ModifiedBy => 1004,
            FieldType::AutoNumber => 1005,
            FieldType::Button => 3001,
            FieldType::Unknown(code) => code,
        }
    }

    /// Human label used in every rendered document.
    pub fn label(self) -> String {
        let label = match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::SingleSelect => "Single select",
            FieldType::MultiSelect => "Multi select",
            FieldType::Date => "Date",
            FieldType::Checkbox => "Checkbox",
            FieldType::Person => "Person",
            FieldType::Phone => "Phone",
            FieldType::Url => "Link (URL)",
            FieldType::Attachment => "Attachment",
            FieldType::SingleLink => "One-way link",
            FieldType::Lookup => "Lookup",
            FieldType::Formula => "Formula",
            FieldType::TwoWayLink => "Two-way link",
            FieldType::Location => "Location",
            FieldType::Group => "Group",
            FieldType::CreatedTime => "Created time",
            FieldType::ModifiedTime => "Modified time",
            FieldType::CreatedBy => "Created by",
            FieldType::ModifiedBy => "Modified by",
            FieldType::AutoNumber => "Auto number",
            FieldType::Button => "Button",
            FieldType::Unknown(code) => return format!("Unknown type ({code})"),
        };
        label.to_string()
    }

    pub fn is_select(self) -> bool {
        matches!(self, FieldType::SingleSelect | FieldType::MultiSelect)
    }

    pub fn is_link(self) -> bool {
        matches!(self, FieldType::SingleLink | FieldType::TwoWayLink)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// A single field of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub id: String,

    /// Display name; `None` when the snapshot carries no name.
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Type-specific configuration (`property` in the snapshot).
    pub property: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Explicit AI prompt block (`ext.ai`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<Value>,

    /// Extension data (`exInfo`), which carries the other AI indicators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ex_info: Option<Value>,
}

impl Field {
    fn from_value(id: &str, def: &Value) -> Self {
        let code = def.get("type").and_then(Value::as_i64).unwrap_or(0);
        let field_type = FieldType::from_code(code);
        if let FieldType::Unknown(code) = field_type {
            log::warn!("field {id} has unknown type code {code}");
        }

        Self {
            id: id.to_string(),
            name: non_empty_str(def.get("name")),
            field_type,
            property: def.get("property").cloned().unwrap_or(Value::Null),
            description: non_empty_str(def.pointer("/description/text")),
            ai: def.pointer("/ext/ai").filter(|v| !v.is_null()).cloned(),
            ex_info: def.get("exInfo").filter(|v| !v.is_null()).cloned(),
        }
    }

    /// Display name, or a placeholder for an unnamed field.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| placeholder::unnamed_field(&self.id))
    }

    /// Configuration value at a JSON pointer below `property`.
    pub fn prop(&self, pointer: &str) -> Option<&Value> {
        self.property.pointer(pointer).filter(|v| !v.is_null())
    }

    pub fn prop_str(&self, pointer: &str) -> Option<&str> {
        self.prop(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// A table and its fields, in snapshot order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub id: String,
    pub name: Option<String>,
    pub fields: IndexMap<String, Field>,
}

impl Table {
    fn from_value(value: &Value) -> Option<Self> {
        let id = value.pointer("/meta/id").and_then(id_string)?;
        let mut fields = IndexMap::new();
        if let Some(map) = value.get("fieldMap").and_then(Value::as_object) {
            for (field_id, def) in map {
                fields.insert(field_id.clone(), Field::from_value(field_id, def));
            }
        }
        Some(Self {
            name: non_empty_str(value.pointer("/meta/name")),
            id,
            fields,
        })
    }
}

/// Outcome of decoding the optional workflow blob.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AutomationState {
    /// The payload carried no workflow blob.
    #[default]
    Absent,
    Decoded(Vec<Workflow>),
    /// The blob was present but could not be decoded.
    Failed(String),
}

impl AutomationState {
    pub fn workflows(&self) -> &[Workflow] {
        match self {
            AutomationState::Decoded(workflows) => workflows,
            _ => &[],
        }
    }
}

/// One fully decoded schema capture.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tables: IndexMap<String, Table>,
    pub automation: AutomationState,
    pub registry: NameRegistry,
}

impl Snapshot {
    /// Decode both blobs of a payload.
    ///
    /// Only a snapshot-blob failure is an error; a broken workflow blob is
    /// kept as [`AutomationState::Failed`] so the schema still renders.
    pub fn decode(payload: &RawPayload) -> DecodeResult<Self> {
        let tree = payload.decode_snapshot()?;
        let automation = match payload.decode_automation() {
            Ok(Some(tree)) => Some(Ok(tree)),
            Ok(None) => None,
            Err(err) => {
                log::warn!("automation blob could not be decoded: {err}");
                Some(Err(err.to_string()))
            }
        };
        Self::from_trees(&tree, automation)
    }

    /// Build a snapshot from already-decoded trees.
    pub fn from_trees(
        snapshot: &Value,
        automation: Option<Result<Value, String>>,
    ) -> DecodeResult<Self> {
        let fragments: Vec<&Value> = match snapshot {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![snapshot],
            other => {
                return Err(DecodeError::shape(format!(
                    "snapshot must be an array of fragments, got {}",
                    json_kind(other)
                )));
            }
        };

        let mut registry = NameRegistry::default();
        let mut tables: IndexMap<String, Table> = IndexMap::new();

        for fragment in fragments {
            let Some(schema) = fragment.get("schema") else {
                continue;
            };

            if let Some(map) = schema.get("tableMap").and_then(Value::as_object) {
                for (table_id, info) in map {
                    if let Some(name) = info.get("name").and_then(Value::as_str) {
                        registry.record_table(table_id, name);
                    }
                }
            }

            if let Some(blocks) = schema.pointer("/base/blockInfos").and_then(Value::as_object) {
                for info in blocks.values() {
                    if let (Some(token), Some(name)) = (
                        info.get("blockToken").and_then(id_string),
                        info.get("name").and_then(Value::as_str),
                    ) {
                        registry.record_block(&token, name);
                    }
                }
            }

            let data = schema.get("data");
            let listed = data
                .and_then(|d| d.get("tables"))
                .and_then(Value::as_array)
                .into_iter()
                .flatten();
            let single = data.and_then(|d| d.get("table")).filter(|t| t.is_object());

            for raw in listed.chain(single) {
                let Some(table) = Table::from_value(raw) else {
                    continue;
                };
                registry.record_table_id(&table.id);
                if let Some(name) = &table.name {
                    registry.record_table(&table.id, name);
                }
                for field in table.fields.values() {
                    if let Some(name) = &field.name {
                        registry.record_field(&table.id, &field.id, name);
                    }
                    if field.field_type.is_select() {
                        record_options(&mut registry, field);
                    }
                }
                tables.entry(table.id.clone()).or_insert(table);
            }
        }

        let automation = match automation {
            None => AutomationState::Absent,
            Some(Err(message)) => AutomationState::Failed(message),
            Some(Ok(tree)) => match workflow::parse_workflows(&tree) {
                Ok(workflows) => AutomationState::Decoded(workflows),
                Err(err) => {
                    log::warn!("automation tree has an unexpected shape: {err}");
                    AutomationState::Failed(err.to_string())
                }
            },
        };

        log::debug!(
            "decoded snapshot: {} tables, {} workflows",
            tables.len(),
            automation.workflows().len()
        );

        Ok(Self {
            tables,
            automation,
            registry,
        })
    }

    /// Decode a payload container directly from its JSON text.
    pub fn from_container(text: &str) -> DecodeResult<Self> {
        Self::decode(&RawPayload::from_json(text)?)
    }

    pub fn workflows(&self) -> &[Workflow] {
        self.automation.workflows()
    }

    /// Tables ordered by display name, then id.
    pub fn sorted_tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by(|a, b| {
            let name_a = self.registry.table_label(&a.id);
            let name_b = self.registry.table_label(&b.id);
            name_a.cmp(&name_b).then_with(|| a.id.cmp(&b.id))
        });
        tables
    }

    pub fn field_count(&self) -> usize {
        self.tables.values().map(|t| t.fields.len()).sum()
    }
}

fn record_options(registry: &mut NameRegistry, field: &Field) {
    let Some(options) = field.prop("/options").and_then(Value::as_array) else {
        return;
    };
    for option in options {
        if let (Some(id), Some(name)) = (
            option.get("id").and_then(id_string),
            option.get("name").and_then(Value::as_str),
        ) {
            registry.record_option(&id, name);
        }
    }
}

/// Identifier from a JSON value: strings (surrounding quotes stripped) or integers.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim_matches('"');
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment() -> Value {
        json!([{
            "schema": {
                "tableMap": {"tblOrders01": {"name": "Orders"}},
                "base": {"blockInfos": {"blk1": {"blockToken": "7300000000000000001", "name": "Notify sales"}}},
                "data": {
                    "tables": [{
                        "meta": {"id": "tblOrders01", "name": "tblOrders01"},
                        "fieldMap": {
                            "fldAmount01": {"name": "Amount", "type": 2, "property": {"formatter": "0.00"}},
                            "fldStatus01": {"name": "Status", "type": 3, "property": {"options": [
                                {"id": "optPaid0001", "name": "Paid"}
                            ]}}
                        }
                    }],
                    "table": {"meta": {"id": "tblCustomers"}, "fieldMap": {}}
                }
            }
        }])
    }

    #[test]
    fn test_field_type_codes() {
        assert_eq!(FieldType::from_code(20), FieldType::Formula);
        assert_eq!(FieldType::from_code(3001).code(), 3001);
        assert_eq!(FieldType::from_code(99).label(), "Unknown type (99)");
        assert_eq!(FieldType::Number.to_string(), "Number");
    }

    #[test]
    fn test_from_trees_collects_tables_and_names() {
        let snapshot = Snapshot::from_trees(&fragment(), None).unwrap();
        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(snapshot.registry.table_name("tblOrders01"), Some("Orders"));
        assert_eq!(snapshot.registry.table_name("tblCustomers"), None);
        assert_eq!(
            snapshot.registry.field_name("tblOrders01", "fldAmount01"),
            Some("Amount")
        );
        assert_eq!(snapshot.registry.option_name("optPaid0001"), Some("Paid"));
        assert_eq!(
            snapshot.registry.block_name("7300000000000000001"),
            Some("Notify sales")
        );
        assert_eq!(snapshot.automation, AutomationState::Absent);
    }

    #[test]
    fn test_scalar_snapshot_is_a_shape_error() {
        let err = Snapshot::from_trees(&json!(42), None).unwrap_err();
        assert!(matches!(err, DecodeError::Shape { .. }));
    }

    #[test]
    fn test_failed_automation_is_kept_soft() {
        let snapshot = Snapshot::from_trees(&fragment(), Some(Err("bad gzip".into()))).unwrap();
        assert_eq!(snapshot.automation, AutomationState::Failed("bad gzip".into()));
        assert!(snapshot.workflows().is_empty());
    }

    #[test]
    fn test_id_string_accepts_numbers_and_quoted_strings() {
        assert_eq!(id_string(&json!(12)), Some("12".into()));
        assert_eq!(id_string(&json!("\"tblA\"")), Some("tblA".into()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!(null)), None);
    }
}
