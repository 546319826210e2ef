//! Per-type field configuration rendering.

use serde::Serialize;
use serde_json::Value;

use crate::formula::{self, quote};
use crate::model::{Field, FieldType, id_string};
use crate::registry::{NameRegistry, placeholder};

/// Semantic description of one field, as shown in the field table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescription {
    pub type_label: String,
    /// Rendered configuration, with the AI summary folded in when present.
    pub config: String,
    pub is_ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    pub description: String,
}

/// Describe a field of `table_id` using the names in `registry`.
pub fn describe(field: &Field, table_id: &str, registry: &NameRegistry) -> FieldDescription {
    let ai = detect_ai(field, registry);
    let mut config = render_config(field, table_id, registry);

    if let Some(summary) = &ai.summary {
        config = format!("**AI config**: {summary}<br><br>{config}");
    }

    FieldDescription {
        type_label: field.field_type.label(),
        config,
        is_ai: ai.is_ai,
        ai_summary: ai.summary,
        description: field.description.clone().unwrap_or_default(),
    }
}

fn render_config(field: &Field, table_id: &str, registry: &NameRegistry) -> String {
    match field.field_type {
        FieldType::Formula => {
            let source = field.prop_str("/formula").unwrap_or_default();
            format!("`{}`", formula::translate(source, table_id, registry))
        }
        FieldType::SingleSelect | FieldType::MultiSelect => select_config(field, registry),
        FieldType::Lookup => lookup_config(field, table_id, registry),
        FieldType::SingleLink | FieldType::TwoWayLink => match field.prop("/tableId").and_then(id_string) {
            Some(target) => format!("Links to {}", quote(&registry.table_label(&target))),
            None => "-".to_string(),
        },
        FieldType::AutoNumber => auto_number_config(field),
        FieldType::Date => {
            let format = [field.prop_str("/dateFormat"), field.prop_str("/timeFormat")]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            let mut text = if format.is_empty() {
                "Date".to_string()
            } else {
                format!("Format: {format}")
            };
            if truthy(field.prop("/autoFill")) {
                text.push_str(" (auto-filled with creation time)");
            }
            text
        }
        FieldType::Number => match field.prop_str("/formatter") {
            Some(format) => format!("Format: {format}"),
            None => "Number".to_string(),
        },
        FieldType::Button => {
            let title = field.prop_str("/button/title").unwrap_or("untitled");
            format!("Button: [{title}]")
        }
        FieldType::Attachment => "Attachments allowed".to_string(),
        FieldType::Text
        | FieldType::Checkbox
        | FieldType::Person
        | FieldType::Phone
        | FieldType::Url
        | FieldType::Location
        | FieldType::Group
        | FieldType::CreatedTime
        | FieldType::ModifiedTime
        | FieldType::CreatedBy
        | FieldType::ModifiedBy
        | FieldType::Unknown(_) => raw_config(&field.property),
    }
}

fn select_config(field: &Field, registry: &NameRegistry) -> String {
    if let Some(target) = field.prop("/optionsRule/targetTable").and_then(id_string) {
        let target_field = field
            .prop("/optionsRule/targetField")
            .and_then(id_string)
            .unwrap_or_default();
        return format!(
            "Options synced from {} field {}",
            quote(&registry.table_label(&target)),
            quote(&registry.field_label(&target, &target_field))
        );
    }

    let names: Vec<&str> = field
        .prop("/options")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|option| option.get("name").and_then(Value::as_str))
        .collect();
    if names.is_empty() {
        "Options: (none)".to_string()
    } else {
        format!("Options: {}", names.join(", "))
    }
}

fn lookup_config(field: &Field, table_id: &str, registry: &NameRegistry) -> String {
    let Some(target) = field.prop("/filterInfo/targetTable").and_then(id_string) else {
        return "Lookup (no target table)".to_string();
    };
    let target_field = field.prop("/targetField").and_then(id_string).unwrap_or_default();

    let mut text = format!(
        "Lookup of {} from {}",
        quote(&registry.field_label(&target, &target_field)),
        quote(&registry.table_label(&target))
    );
    if let Some(source) = field.prop_str("/formula") {
        let filter = formula::render_filter(source, table_id, registry);
        if !filter.is_empty() {
            text.push_str("<br>Filter: ");
            text.push_str(&filter);
        }
    }
    text
}

fn auto_number_config(field: &Field) -> String {
    let rules: Vec<String> = field
        .prop("/ruleFieldOptions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|rule| {
            let value = rule.get("value").map(scalar_text).unwrap_or_default();
            match rule.get("type").and_then(Value::as_i64) {
                Some(1) => format!("{{created time:{value}}}"),
                Some(2) => format!("\"{value}\""),
                Some(3) => format!("{{counter:{value} digits}}"),
                _ => format!("{{unknown rule:{value}}}"),
            }
        })
        .collect();
    if rules.is_empty() {
        "Auto number".to_string()
    } else {
        format!("Rule: {}", rules.join(" + "))
    }
}

/// Generic fallback: the raw configuration as inline code, or `-`.
fn raw_config(property: &Value) -> String {
    match property {
        Value::Object(map) if !map.is_empty() => format!("`{property}`"),
        Value::Null | Value::Object(_) => "-".to_string(),
        other => format!("`{other}`"),
    }
}

#[derive(Debug, Default)]
struct AiDetection {
    is_ai: bool,
    summary: Option<String>,
}

/// Check the three independent AI indicators of a field.
fn detect_ai(field: &Field, registry: &NameRegistry) -> AiDetection {
    if let Some(ai) = &field.ai {
        let prompt: String = ai
            .get("prompt")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") => part.get("value").map(scalar_text).unwrap_or_default(),
                Some("variable") => {
                    let id = part.pointer("/value/value/id").and_then(id_string).unwrap_or_default();
                    format!("{{field:{}}}", field_anywhere_label(registry, &id))
                }
                _ => String::new(),
            })
            .collect();
        return AiDetection {
            is_ai: true,
            summary: Some(format!("Prompt: {}", one_line(&prompt))),
        };
    }

    let ex_info = field.ex_info.as_ref();
    let custom = ex_info.and_then(|info| info.get("customOpenTypeData")).filter(|v| v.is_object());
    let payment = truthy(ex_info.and_then(|info| info.pointer("/aiPaymentInfo/enableAIPayment")));

    let mut is_ai = payment;
    let mut kind = None;
    if let Some(custom) = custom {
        if custom.get("innerType").and_then(Value::as_str) == Some("ai_extract")
            || truthy(custom.pointer("/fieldConfigValue/aiPrompt"))
        {
            is_ai = true;
        }
        if custom.get("extensionType").and_then(Value::as_str) == Some("field_faas")
            && category_mentions_ai(custom.get("category"))
        {
            is_ai = true;
            kind = Some(
                custom
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("AI extension")
                    .to_string(),
            );
        }
    }

    if !is_ai {
        return AiDetection::default();
    }

    let form = custom.and_then(|c| c.pointer("/fieldConfigValue/formData"));
    let mut parts = Vec::new();
    if let Some(kind) = kind {
        parts.push(format!("Kind: {kind}"));
    }
    if let Some(form) = form {
        let source = form
            .pointer("/source/id")
            .or_else(|| form.pointer("/choiceColumn/id"))
            .and_then(id_string);
        if let Some(source) = source {
            parts.push(format!("Source field: {}", quote(&field_anywhere_label(registry, &source))));
        }
        let prompt = ["promptEdit", "content", "custom_rules"]
            .iter()
            .find_map(|key| form.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()));
        if let Some(prompt) = prompt {
            parts.push(format!("Prompt: {}", one_line(prompt)));
        }
    }

    AiDetection {
        is_ai: true,
        summary: Some(if parts.is_empty() {
            "AI field".to_string()
        } else {
            parts.join(" | ")
        }),
    }
}

fn category_mentions_ai(category: Option<&Value>) -> bool {
    match category {
        Some(Value::String(s)) => s.contains("Bitable_AI_Menu"),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| s.contains("Bitable_AI_Menu"))),
        _ => false,
    }
}

fn field_anywhere_label(registry: &NameRegistry, id: &str) -> String {
    registry
        .field_anywhere(id)
        .map(str::to_string)
        .unwrap_or_else(|| placeholder::deleted_field(id))
}

fn one_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Loose JSON truthiness: null, false, 0, "" and empty containers are false.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Text of a scalar JSON value; containers render as JSON.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
