//! Formula translation: opaque `$table[..]` / `$field[..]` references to names.
//!
//! The formula is split into a token stream first and reassembled afterwards,
//! so no replacement can shift the offsets of another. A field token resolves
//! against the nearest table token to its left, falling back to the owning
//! table and then to a search across all tables.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::registry::{NameRegistry, placeholder};

const TABLE_OPEN: &str = "$table[";
const FIELD_OPENS: [&str; 2] = ["$field[", "$column["];
const NAMESPACE: &str = "bitable::";

/// Piece of a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Table(&'a str),
    Field(&'a str),
}

/// Split a formula into literal text and reference tokens.
///
/// A `bitable::` namespace immediately before a reference is dropped; the
/// same text anywhere else stays literal. An unterminated reference is text.
pub fn tokenize(formula: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = formula[cursor..].find('$') {
        let at = cursor + offset;
        let rest = &formula[at..];

        let opened = if rest.starts_with(TABLE_OPEN) {
            Some((TABLE_OPEN.len(), true))
        } else {
            FIELD_OPENS
                .iter()
                .find(|open| rest.starts_with(*open))
                .map(|open| (open.len(), false))
        };
        let Some((open_len, is_table)) = opened else {
            cursor = at + 1;
            continue;
        };

        let id_start = at + open_len;
        let Some(close) = formula[id_start..].find(']') else {
            break;
        };
        let id_end = id_start + close;

        let token_start = if at >= text_start + NAMESPACE.len() && formula[..at].ends_with(NAMESPACE) {
            at - NAMESPACE.len()
        } else {
            at
        };
        if token_start > text_start {
            tokens.push(Token::Text(&formula[text_start..token_start]));
        }

        let id = &formula[id_start..id_end];
        tokens.push(if is_table { Token::Table(id) } else { Token::Field(id) });

        text_start = id_end + 1;
        cursor = text_start;
    }

    if text_start < formula.len() {
        tokens.push(Token::Text(&formula[text_start..]));
    }
    tokens
}

/// Wrap a resolved name the way every document quotes names.
pub fn quote(name: &str) -> String {
    format!("「{name}」")
}

/// Rewrite every reference in `formula` to a quoted name.
///
/// Every `bitable::` namespace is dropped; other text without references
/// comes back unchanged.
pub fn translate(formula: &str, owner: &str, registry: &NameRegistry) -> String {
    let mut scope = owner;
    let mut out = String::with_capacity(formula.len() + 16);

    for token in tokenize(formula) {
        match token {
            Token::Text(text) => out.push_str(&text.replace(NAMESPACE, "")),
            Token::Table(id) => {
                scope = id;
                out.push_str(&quote(&registry.table_label(id)));
            }
            Token::Field(id) => {
                let name = registry
                    .resolve_field(scope, owner, id)
                    .map(str::to_string)
                    .unwrap_or_else(|| placeholder::deleted_field(id));
                out.push_str(&quote(&name));
            }
        }
    }
    out
}

/// Distinct tables referenced by a formula, other than its owner, in order.
pub fn cross_table_refs<'a>(formula: &'a str, owner: &str) -> Vec<&'a str> {
    let mut refs: Vec<&str> = Vec::new();
    for token in tokenize(formula) {
        if let Token::Table(id) = token
            && id != owner
            && !refs.contains(&id)
        {
            refs.push(id);
        }
    }
    refs
}

const FILTER_OPEN: &str = ".FILTER(";

static CURRENT_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*CurrentValue\.\$(?:column|field)\[([^\]]*)\]\s*(!=|=)\s*(.+?)\s*$")
        .expect("condition pattern")
});

/// Byte offset of the `)` closing the group opened just before `from`.
///
/// Parentheses inside string literals do not count.
fn closing_paren(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (offset, c) in text[from..].char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                if depth == 0 {
                    return Some(from + offset);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Split a filter body on `&&` outside nested groups and strings.
fn top_level_clauses(body: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => depth = depth.saturating_sub(1),
            b'&' if !in_string && depth == 0 && bytes.get(i + 1) == Some(&b'&') => {
                clauses.push(&body[start..i]);
                start = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    clauses.push(&body[start..]);
    clauses
}

/// `(start of ".FILTER(", body)` for every filter with a closing paren.
fn filter_bodies(formula: &str) -> Vec<(usize, &str)> {
    let mut bodies = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = formula[cursor..].find(FILTER_OPEN) {
        let at = cursor + offset;
        let body_start = at + FILTER_OPEN.len();
        let Some(close) = closing_paren(formula, body_start) else {
            break;
        };
        bodies.push((at, &formula[body_start..close]));
        cursor = close + 1;
    }
    bodies
}

/// One `CurrentValue.<field> = <expr>` clause of a `.FILTER(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCondition {
    pub field: String,
    pub negated: bool,
    pub value: String,
}

impl std::fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = if self.negated { "≠" } else { "=" };
        write!(f, "{}{op} {}", quote(&self.field), self.value)
    }
}

/// Equality and inequality clauses inside every `.FILTER(...)` of a formula.
///
/// The left-hand field belongs to the table filtered, which is the nearest
/// table reference before the `.FILTER`.
pub fn filter_conditions(formula: &str, owner: &str, registry: &NameRegistry) -> Vec<FilterCondition> {
    let mut conditions = Vec::new();

    for (start, body) in filter_bodies(formula) {
        let scope = tokenize(&formula[..start])
            .into_iter()
            .rev()
            .find_map(|token| match token {
                Token::Table(id) => Some(id),
                _ => None,
            })
            .unwrap_or(owner);

        for clause in top_level_clauses(body)
            .into_iter()
            .filter_map(|text| CURRENT_VALUE.captures(text))
        {
            let field_id = &clause[1];
            let field = registry
                .resolve_field(scope, owner, field_id)
                .map(str::to_string)
                .unwrap_or_else(|| placeholder::deleted_field(field_id));
            conditions.push(FilterCondition {
                field,
                negated: &clause[2] == "!=",
                value: translate(&clause[3], owner, registry),
            });
        }
    }
    conditions
}

/// Filter clauses joined for display; empty when the formula has none.
pub fn render_filter(formula: &str, owner: &str, registry: &NameRegistry) -> String {
    filter_conditions(formula, owner, registry)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NameRegistry {
        let mut reg = NameRegistry::default();
        reg.record_table("tblOrders", "Orders");
        reg.record_table("tblItems", "Items");
        reg.record_field("tblOrders", "fldAmount", "Amount");
        reg.record_field("tblOrders", "fldId", "Order no");
        reg.record_field("tblItems", "fldPrice", "Price");
        reg.record_field("tblItems", "fldOrder", "Order ref");
        reg.record_field("tblItems", "fldAmount", "Line amount");
        reg
    }

    #[test]
    fn test_plain_formula_is_unchanged() {
        let reg = registry();
        for formula in ["", "1 + 2", "IF(x > 3, \"a$b\", foo)", "$table without bracket"] {
            assert_eq!(translate(formula, "tblOrders", &reg), formula);
        }
    }

    #[test]
    fn test_namespace_is_dropped_everywhere() {
        let reg = registry();
        assert_eq!(
            translate("bitable::TODAY() - bitable::$field[fldAmount]", "tblOrders", &reg),
            "TODAY() - 「Amount」"
        );
        assert_eq!(tokenize("bitable::foo"), vec![Token::Text("bitable::foo")]);
    }

    #[test]
    fn test_field_resolves_in_owner_table() {
        let reg = registry();
        assert_eq!(
            translate("$field[fldAmount] * 2", "tblOrders", &reg),
            "「Amount」 * 2"
        );
    }

    #[test]
    fn test_nearest_table_scopes_following_fields() {
        let reg = registry();
        let formula = "bitable::$table[tblItems].$field[fldAmount].SUM() + $column[fldAmount]";
        assert_eq!(
            translate(formula, "tblOrders", &reg),
            "「Items」.「Line amount」.SUM() + 「Line amount」"
        );
    }

    #[test]
    fn test_global_fallback_and_placeholder() {
        let reg = registry();
        assert_eq!(translate("$field[fldPrice]", "tblOrders", &reg), "「Price」");
        assert_eq!(
            translate("$field[fldGone] + $table[tblGone]", "tblOrders", &reg),
            "「[deleted field:fldGone]」 + 「[deleted table:tblGone]」"
        );
    }

    #[test]
    fn test_cross_table_refs_are_distinct_and_exclude_owner() {
        let formula = "$table[tblItems].x + $table[tblOrders].y + bitable::$table[tblItems].z";
        assert_eq!(cross_table_refs(formula, "tblOrders"), vec!["tblItems"]);
        assert!(cross_table_refs("1+1", "tblOrders").is_empty());
    }

    #[test]
    fn test_filter_conditions() {
        let reg = registry();
        let formula = "bitable::$table[tblItems].FILTER(CurrentValue.$column[fldOrder] = $field[fldId] && CurrentValue.$column[fldPrice] != 0).$column[fldPrice]";
        let conditions = filter_conditions(formula, "tblOrders", &reg);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].to_string(), "「Order ref」= 「Order no」");
        assert_eq!(conditions[1].to_string(), "「Price」≠ 0");
        assert_eq!(
            render_filter(formula, "tblOrders", &reg),
            "「Order ref」= 「Order no」 AND 「Price」≠ 0"
        );
    }

    #[test]
    fn test_filter_with_nested_calls_keeps_every_condition() {
        let reg = registry();
        let formula = "$table[tblItems].FILTER(CurrentValue.$column[fldPrice] = TODAY() && CurrentValue.$column[fldPrice] = $field[fldAmount]).$column[fldPrice]";
        assert_eq!(
            render_filter(formula, "tblOrders", &reg),
            "「Price」= TODAY() AND 「Price」= 「Amount」"
        );

        let formula = "$table[tblItems].FILTER(CurrentValue.$column[fldOrder] = IF(\"a)\" = \"b\", 1, MAX(2, 3)))";
        let conditions = filter_conditions(formula, "tblOrders", &reg);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].value, "IF(\"a)\" = \"b\", 1, MAX(2, 3))");
    }

    #[test]
    fn test_tokenize_keeps_unterminated_reference_as_text() {
        assert_eq!(tokenize("a $field[fld"), vec![Token::Text("a $field[fld")]);
    }
}
