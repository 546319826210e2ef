//! Rendering of step values, references and condition trees.

use serde_json::Value;

use super::Resolver;
use crate::fields::scalar_text;
use crate::formula::quote;
use crate::model::id_string;
use crate::registry::{is_field_id, is_table_id, placeholder};

/// Readable form of a condition operator code; `None` when unknown.
pub fn operator_label(code: &str) -> Option<&'static str> {
    let label = match code {
        "is" => "is",
        "is_not" | "isNot" => "is not",
        "contains" => "contains",
        "does_not_contain" | "doesNotContain" => "does not contain",
        "is_empty" | "isEmpty" => "is empty",
        "is_not_empty" | "isNotEmpty" => "is not empty",
        "greater_than" | "isGreater" => "is greater than",
        "less_than" | "isLess" => "is less than",
        "greater_than_or_equal" | "isGreaterEqual" => "is at least",
        "less_than_or_equal" | "isLessEqual" => "is at most",
        "is_before" | "isBefore" => "is before",
        "is_after" | "isAfter" => "is after",
        "is_on_or_before" | "isOnOrBefore" => "is on or before",
        "is_on_or_after" | "isOnOrAfter" => "is on or after",
        "isAnyOf" => "is any of",
        "isNoneOf" => "is none of",
        _ => return None,
    };
    Some(label)
}

pub(crate) fn operator(code: &str) -> String {
    match operator_label(code) {
        Some(label) => label.to_string(),
        None if code.is_empty() => placeholder::unknown_operator("(none)"),
        None => placeholder::unknown_operator(code),
    }
}

/// Operators that take no right-hand value.
pub(crate) fn is_unary(code: &str) -> bool {
    matches!(code, "is_empty" | "isEmpty" | "is_not_empty" | "isNotEmpty")
}

fn connector(conjunction: Option<&str>) -> &'static str {
    match conjunction {
        Some(c) if c.eq_ignore_ascii_case("or") => " OR ",
        _ => " AND ",
    }
}

/// Step ordinal carried by a reference value, or `?`.
fn step_number(value: &Value) -> String {
    value
        .get("stepNum")
        .map(scalar_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| placeholder::UNKNOWN_STEP.to_string())
}

fn attribute_label(attribute: &str) -> &str {
    match attribute {
        "recordNum" => "record count",
        "recordId" => "record ID",
        "record" => "record",
        "value" => "value",
        other => other,
    }
}

/// Field a reference points at, from `fields[0].fieldId` or its `path`.
fn referenced_field(value: &Value, resolver: &Resolver<'_>) -> Option<String> {
    if let Some(id) = value.pointer("/fields/0/fieldId").and_then(id_string) {
        return Some(format!("'s {}", quote(&resolver.field(&id))));
    }
    for segment in value.get("path").and_then(Value::as_array).into_iter().flatten() {
        match segment.get("type").and_then(Value::as_str) {
            Some("Field") => {
                if let Some(id) = segment.get("value").and_then(id_string) {
                    return Some(format!("'s {}", quote(&resolver.field(&id))));
                }
            }
            Some("RecordAttr") => {
                let attr = segment.get("value").map(scalar_text).unwrap_or_default();
                return Some(format!(" {}", attribute_label(&attr)));
            }
            _ => {}
        }
    }
    None
}

/// Render a `{"type": "ref", ...}` value.
fn format_ref(value: &Value, resolver: &Resolver<'_>) -> String {
    let tag = value.get("tagType").and_then(Value::as_str).unwrap_or("unknown");
    let step = step_number(value);

    match tag {
        "formula" => {
            let title = value.get("title").and_then(Value::as_str).unwrap_or("untitled");
            format!("[formula: {title}]")
        }
        "system" => {
            let kind = value.get("systemType").map(scalar_text).unwrap_or_default();
            let label = match kind.as_str() {
                "viewUrl" => "view link",
                "recordUrl" => "record link",
                other => other,
            };
            format!("[system variable: {label}]")
        }
        "RecordAttribute" => {
            let attr = value.get("attribute").map(scalar_text).unwrap_or_default();
            format!("[step {step} {}]", attribute_label(&attr))
        }
        "loop" => match referenced_field(value, resolver) {
            Some(field) => format!("[step {step} loop item{field}]"),
            None => format!("[step {step} loop item]"),
        },
        other => match referenced_field(value, resolver) {
            Some(field) => format!("[step {step}{field}]"),
            None => match other {
                "step" => format!("[step {step} result]"),
                "trigger" => format!("[step {step} trigger record]"),
                tag => format!("[step {step} {tag}]"),
            },
        },
    }
}

fn is_ref(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("ref")
}

/// Quoted name for a literal shaped like a field or table id.
fn id_literal(text: &str, resolver: &Resolver<'_>) -> Option<String> {
    if is_field_id(text) {
        Some(quote(&resolver.field(text)))
    } else if is_table_id(text) {
        Some(quote(&resolver.table(text)))
    } else {
        None
    }
}

/// Copy of `value` with every id-shaped string replaced by its name.
pub(crate) fn resolve_ids(value: &Value, resolver: &Resolver<'_>) -> Value {
    match value {
        Value::String(s) => Value::String(id_literal(s, resolver).unwrap_or_else(|| s.clone())),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_ids(v, resolver)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_ids(v, resolver)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// General value rendering used for assignments and condition values.
pub(crate) fn format_value(value: &Value, resolver: &Resolver<'_>, depth: usize) -> String {
    match value {
        Value::Null => "[empty]".to_string(),
        Value::String(s) if s.is_empty() => "[empty value]".to_string(),
        Value::String(s) => id_literal(s, resolver).unwrap_or_else(|| resolver.option(s)),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) if items.is_empty() => "[empty list]".to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| format_value(item, resolver, depth + 1))
                .collect();
            if parts.iter().all(|p| !p.contains('\n') && p.chars().count() < 50) {
                parts.join(", ")
            } else {
                let indent = "  ".repeat(depth);
                parts.iter().map(|p| format!("\n{indent}- {p}")).collect()
            }
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(_) if is_ref(value) => format_ref(value, resolver),
        Value::Object(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}: {}", format_value(v, resolver, depth + 1)))
                .collect();
            format!("{{ {} }}", items.join(", "))
        }
    }
}

/// Left-hand side of an if/else comparison, or a referenced value.
pub(crate) fn format_value_ref(value: &Value, resolver: &Resolver<'_>) -> String {
    match value {
        Value::String(s) => id_literal(s, resolver).unwrap_or_else(|| s.clone()),
        Value::Null => "[empty]".to_string(),
        _ if is_ref(value) && value.get("tagType").and_then(Value::as_str) == Some("RecordAttribute") => {
            let step = step_number(value);
            let attr = value.get("attribute").map(scalar_text).unwrap_or_default();
            let step_type = value.get("stepType").and_then(Value::as_str).unwrap_or_default();
            let kind = match step_type {
                "FindRecordAction" => "Find records",
                "AddRecordAction" => "Add record",
                other => other,
            };
            format!("[step {step} ({kind}) {}]", attribute_label(&attr))
        }
        _ if is_ref(value) && value.get("tagType").and_then(Value::as_str) == Some("step") => {
            let step = step_number(value);
            match value.pointer("/fields/0/fieldId").and_then(id_string) {
                Some(id) => format!("[step {step}'s {}]", quote(&resolver.field(&id))),
                None => format!("[step {step} result]"),
            }
        }
        _ => match value.pointer("/fields/0/fieldId").and_then(id_string) {
            Some(id) => quote(&resolver.field(&id)),
            None => format_value(value, resolver, 0),
        },
    }
}

/// Right-hand side of an if/else comparison.
fn format_right_value(value: &Value, resolver: &Resolver<'_>) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(_) if is_ref(item) => format_value_ref(item, resolver),
                Value::Object(_) => item
                    .get("text")
                    .or_else(|| item.get("value"))
                    .filter(|v| !v.is_null())
                    .map(|v| format_value(v, resolver, 0))
                    .unwrap_or_else(|| format_value(item, resolver, 0)),
                Value::String(s) => resolver.option(s),
                other => scalar_text(other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) if is_ref(value) => format_value_ref(value, resolver),
        Value::String(s) => resolver.option(s),
        other => format_value(other, resolver, 0),
    }
}

/// Trigger filter (`next[0].condition`): nested field conditions.
pub(crate) fn trigger_filter(condition: &Value, resolver: &Resolver<'_>) -> String {
    let Some(conditions) = condition.get("conditions").and_then(Value::as_array) else {
        return String::new();
    };
    let mut parts = Vec::new();
    for cond in conditions {
        if cond.get("conditions").is_some() {
            let nested = trigger_filter(cond, resolver);
            if !nested.is_empty() {
                parts.push(format!("({nested})"));
            }
            continue;
        }
        let field = resolver.field(&cond.get("fieldId").and_then(id_string).unwrap_or_default());
        let code = cond.get("operator").and_then(Value::as_str).unwrap_or_default();
        if is_unary(code) {
            parts.push(format!("{} {}", quote(&field), operator(code)));
            continue;
        }
        let value = match cond.get("value") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => resolver.option(s),
                    other => scalar_text(other),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Some(Value::Array(_)) | Some(Value::Null) | None => "[empty]".to_string(),
            Some(Value::String(s)) if s.is_empty() => "[empty]".to_string(),
            Some(Value::String(s)) => resolver.option(s),
            Some(other) => scalar_text(other),
        };
        parts.push(format!("{} {} \"{value}\"", quote(&field), operator(code)));
    }
    parts.join(connector(condition.get("conjunction").and_then(Value::as_str)))
}

/// Flat search/update condition list (`recordInfo.conditions`).
pub(crate) fn condition_list(
    conditions: &[Value],
    conjunction: Option<&str>,
    resolver: &Resolver<'_>,
) -> String {
    if conditions.is_empty() {
        return "no conditions".to_string();
    }
    conditions
        .iter()
        .map(|cond| {
            let field = resolver.field(&cond.get("fieldId").and_then(id_string).unwrap_or_default());
            let code = cond.get("operator").and_then(Value::as_str).unwrap_or_default();
            if is_unary(code) {
                return format!("{} {}", quote(&field), operator(code));
            }
            let value = cond
                .get("value")
                .filter(|v| !v.is_null())
                .or_else(|| cond.pointer("/matchValue/value"))
                .unwrap_or(&Value::Null);
            format!(
                "{} {} \"{}\"",
                quote(&field),
                operator(code),
                format_value(value, resolver, 0)
            )
        })
        .collect::<Vec<_>>()
        .join(connector(conjunction))
}

/// If/else condition tree with nested AND/OR groups.
pub(crate) fn branch_condition(condition: &Value, resolver: &Resolver<'_>) -> String {
    let conditions = condition
        .get("conditions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if conditions.is_empty() {
        return "no conditions".to_string();
    }

    let parts: Vec<String> = conditions
        .iter()
        .map(|cond| {
            if cond.get("conditions").is_some() {
                return format!("({})", branch_condition(cond, resolver));
            }
            let left = format_value_ref(cond.get("leftValue").unwrap_or(&Value::Null), resolver);
            let code = cond.get("operator").and_then(Value::as_str).unwrap_or_default();
            if is_unary(code) {
                return format!("{left} {}", operator(code));
            }
            let right = format_right_value(cond.get("rightValue").unwrap_or(&Value::Null), resolver);
            if right.starts_with('[') {
                format!("{left} {} {right}", operator(code))
            } else {
                format!("{left} {} \"{right}\"", operator(code))
            }
        })
        .collect();
    parts.join(connector(condition.get("conjunction").and_then(Value::as_str)))
}

/// `- 「field」 = value` lines for a list of assignments.
pub(crate) fn field_assignments(values: &[Value], resolver: &Resolver<'_>) -> Vec<String> {
    values
        .iter()
        .filter(|v| v.is_object())
        .map(|v| {
            let field = resolver.field(&v.get("fieldId").and_then(id_string).unwrap_or_default());
            let value = v.get("value").unwrap_or(&Value::Null);
            let rendered = match value {
                Value::Null => "[empty value]".to_string(),
                other => format_value(other, resolver, 1),
            };
            format!("- {} = {rendered}", quote(&field))
        })
        .collect()
}
