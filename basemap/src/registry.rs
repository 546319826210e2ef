//! Name lookups built once per snapshot and passed by reference everywhere.
//!
//! A [`NameRegistry`] is owned by its [`Snapshot`](crate::model::Snapshot);
//! there is no process-wide registry, so two snapshots can be resolved side
//! by side (which the diff engine relies on).

use indexmap::IndexMap;
use indexmap::map::Entry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Reserved renderings for identifiers that could not be resolved.
///
/// Every placeholder embeds the raw identifier in `[<kind> <entity>:<id>]`
/// form, which is what the completeness checker scans for.
pub mod placeholder {
    /// Ordinal shown for a step reference that does not resolve.
    pub const UNKNOWN_STEP: &str = "?";

    pub fn deleted_table(id: &str) -> String {
        format!("[deleted table:{id}]")
    }

    pub fn deleted_field(id: &str) -> String {
        format!("[deleted field:{id}]")
    }

    pub fn unnamed_table(id: &str) -> String {
        format!("[unnamed table:{id}]")
    }

    pub fn unnamed_field(id: &str) -> String {
        format!("[unnamed field:{id}]")
    }

    pub fn unknown_option(id: &str) -> String {
        format!("[unknown option:{id}]")
    }

    pub fn unknown_operator(code: &str) -> String {
        format!("[unknown operator:{code}]")
    }

    /// A reference slot that carries no identifier at all.
    pub fn missing(entity: &str) -> String {
        format!("[unknown {entity}:(none)]")
    }
}

static OPTION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^opt[A-Za-z0-9]{6,}$").expect("option id pattern"));

static TABLE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tbl[A-Za-z0-9]{6,}$").expect("table id pattern"));
static FIELD_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^fld[A-Za-z0-9]{6,}$").expect("field id pattern"));

/// Whether a literal looks like an option identifier.
pub fn is_option_id(value: &str) -> bool {
    OPTION_ID.is_match(value)
}

pub fn is_table_id(value: &str) -> bool {
    TABLE_ID.is_match(value)
}

pub fn is_field_id(value: &str) -> bool {
    FIELD_ID.is_match(value)
}

/// Table, field, option and sidebar-block names for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NameRegistry {
    tables: IndexMap<String, String>,
    /// table id -> field id -> field name
    fields: IndexMap<String, IndexMap<String, String>>,
    /// field id -> first name recorded for it, in snapshot order
    field_index: IndexMap<String, String>,
    options: IndexMap<String, String>,
    blocks: IndexMap<String, String>,
}

impl NameRegistry {
    /// Record a table name.
    ///
    /// The first usable name wins, except that a name equal to the id counts
    /// as unresolved and is replaced by any later real name.
    pub fn record_table(&mut self, id: &str, name: &str) {
        let name = name.trim();
        if id.is_empty() || name.is_empty() {
            return;
        }
        match self.tables.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(name.to_string());
            }
            Entry::Occupied(mut slot) => {
                if slot.get() == id && name != id {
                    slot.insert(name.to_string());
                }
            }
        }
    }

    /// Note that a table exists even if it carries no name.
    pub fn record_table_id(&mut self, id: &str) {
        self.fields.entry(id.to_string()).or_default();
    }

    pub fn record_field(&mut self, table_id: &str, field_id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.fields
            .entry(table_id.to_string())
            .or_default()
            .entry(field_id.to_string())
            .or_insert_with(|| name.to_string());
        self.field_index
            .entry(field_id.to_string())
            .or_insert_with(|| name.to_string());
    }

    pub fn record_option(&mut self, id: &str, name: &str) {
        if !name.is_empty() {
            self.options.entry(id.to_string()).or_insert_with(|| name.to_string());
        }
    }

    pub fn record_block(&mut self, token: &str, name: &str) {
        if !name.is_empty() {
            self.blocks.entry(token.to_string()).or_insert_with(|| name.to_string());
        }
    }

    /// Resolved table name; `None` when unknown or only known by its id.
    pub fn table_name(&self, id: &str) -> Option<&str> {
        self.tables
            .get(id)
            .map(String::as_str)
            .filter(|name| *name != id)
    }

    pub fn has_table(&self, id: &str) -> bool {
        self.tables.contains_key(id) || self.fields.contains_key(id)
    }

    /// Display name for a table: its name, or a placeholder.
    pub fn table_label(&self, id: &str) -> String {
        match self.table_name(id) {
            Some(name) => name.to_string(),
            None if id.is_empty() => placeholder::missing("table"),
            None if self.has_table(id) => placeholder::unnamed_table(id),
            None => placeholder::deleted_table(id),
        }
    }

    /// Exact lookup of a field within one table.
    pub fn field_name(&self, table_id: &str, field_id: &str) -> Option<&str> {
        self.fields
            .get(table_id)
            .and_then(|fields| fields.get(field_id))
            .map(String::as_str)
    }

    /// Global lookup by field id alone, first match in snapshot order.
    pub fn field_anywhere(&self, field_id: &str) -> Option<&str> {
        self.field_index.get(field_id).map(String::as_str)
    }

    /// Field lookup with the fallback chain: the active scope, then the
    /// owning table, then any table.
    pub fn resolve_field(&self, scope: &str, owner: &str, field_id: &str) -> Option<&str> {
        self.field_name(scope, field_id)
            .or_else(|| self.field_name(owner, field_id))
            .or_else(|| self.field_anywhere(field_id))
    }

    /// Display name for a field of a table: its name, or a placeholder.
    pub fn field_label(&self, table_id: &str, field_id: &str) -> String {
        if field_id.is_empty() {
            return placeholder::missing("field");
        }
        self.resolve_field(table_id, table_id, field_id)
            .map(str::to_string)
            .unwrap_or_else(|| placeholder::deleted_field(field_id))
    }

    pub fn option_name(&self, id: &str) -> Option<&str> {
        self.options.get(id).map(String::as_str)
    }

    /// Render a literal that may be an option id.
    ///
    /// Known options render by name, option-shaped ids that do not resolve
    /// render a placeholder, and anything else is returned as is.
    pub fn option_label(&self, value: &str) -> String {
        match self.option_name(value) {
            Some(name) => name.to_string(),
            None if is_option_id(value) => placeholder::unknown_option(value),
            None => value.to_string(),
        }
    }

    /// Sidebar name of a workflow, keyed by workflow id.
    pub fn block_name(&self, token: &str) -> Option<&str> {
        self.blocks.get(token).map(String::as_str)
    }

    /// Whether an identifier of any kind exists in the source snapshot.
    pub fn contains_id(&self, id: &str) -> bool {
        self.has_table(id) || self.field_index.contains_key(id) || self.options.contains_key(id)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len().max(self.fields.len())
    }

    pub fn field_count(&self) -> usize {
        self.fields.values().map(IndexMap::len).sum()
    }
}
