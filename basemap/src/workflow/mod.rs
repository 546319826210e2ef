//! Automation workflows: decoding, reference resolution and rendering.
//!
//! A workflow is a trigger followed by steps that point at each other by id
//! (branch targets, loop bodies, `next` edges). Nothing here executes a
//! workflow; the graph is only described.

mod render;
mod resolve;
mod values;

pub use render::{RenderedStep, RenderedWorkflow, render_workflow};
pub use resolve::Resolver;
pub use values::operator_label;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::decoder;
use crate::errors::{DecodeError, DecodeResult};
use crate::model::{id_string, json_kind};
use crate::registry::NameRegistry;

/// Step type, decoded from the step's `type` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum StepKind {
    ChangeRecordTrigger,
    AddRecordTrigger,
    SetRecordTrigger,
    TimerTrigger,
    ButtonTrigger,
    FormSubmitTrigger,
    FindRecord,
    AddRecord,
    UpdateRecord,
    DeleteRecord,
    IfElseBranch,
    Loop,
    CustomAction,
    SendNotification,
    SendEmail,
    Other(String),
}

impl StepKind {
    pub fn parse(type_name: &str) -> Self {
        match type_name {
            "ChangeRecordTrigger" | "ChangeRecordNewSatisfyTrigger" => StepKind::ChangeRecordTrigger,
            "AddRecordTrigger" => StepKind::AddRecordTrigger,
            "SetRecordTrigger" => StepKind::SetRecordTrigger,
            "TimerTrigger" => StepKind::TimerTrigger,
            "ButtonTrigger" => StepKind::ButtonTrigger,
            "FormSubmitTrigger" => StepKind::FormSubmitTrigger,
            "FindRecordAction" | "FindRecord" => StepKind::FindRecord,
            "AddRecordAction" | "AddRecord" => StepKind::AddRecord,
            "SetRecordAction" | "UpdateRecordAction" | "UpdateRecord" => StepKind::UpdateRecord,
            "DeleteRecordAction" | "DeleteRecord" => StepKind::DeleteRecord,
            "IfElseBranch" => StepKind::IfElseBranch,
            "Loop" => StepKind::Loop,
            "CustomAction" => StepKind::CustomAction,
            "SendNotification" => StepKind::SendNotification,
            "SendEmail" => StepKind::SendEmail,
            other => StepKind::Other(other.to_string()),
        }
    }

    /// Default title for a step of this kind.
    pub fn label(&self) -> &str {
        match self {
            StepKind::ChangeRecordTrigger => "When a record is added or changed to match conditions",
            StepKind::AddRecordTrigger => "When a record is added",
            StepKind::SetRecordTrigger => "When a record is updated",
            StepKind::TimerTrigger => "On a schedule",
            StepKind::ButtonTrigger => "When a button is clicked",
            StepKind::FormSubmitTrigger => "When a form is submitted",
            StepKind::FindRecord => "Find records",
            StepKind::AddRecord => "Add record",
            StepKind::UpdateRecord => "Update records",
            StepKind::DeleteRecord => "Delete records",
            StepKind::IfElseBranch => "Condition (if/else)",
            StepKind::Loop => "Loop",
            StepKind::CustomAction => "Custom action",
            StepKind::SendNotification => "Send notification",
            StepKind::SendEmail => "Send email",
            StepKind::Other(name) => name,
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            StepKind::ChangeRecordTrigger
                | StepKind::AddRecordTrigger
                | StepKind::SetRecordTrigger
                | StepKind::TimerTrigger
                | StepKind::ButtonTrigger
                | StepKind::FormSubmitTrigger
        )
    }
}

/// A successor edge of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextEdge {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

/// One step of a workflow draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The raw `type` string, kept for reporting.
    pub type_name: String,
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub data: Value,
    pub next: Vec<NextEdge>,
}

impl Step {
    fn from_value(value: &Value) -> Self {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let next = value
            .get("next")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|edge| NextEdge {
                step_id: edge.get("stepId").and_then(id_string),
                condition: edge.get("condition").filter(|c| !c.is_null()).cloned(),
            })
            .collect();

        Self {
            id: value
                .get("id")
                .and_then(id_string)
                .or_else(|| value.get("stepId").and_then(id_string)),
            kind: StepKind::parse(&type_name),
            type_name,
            title: value
                .get("stepTitle")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            data: value.get("data").cloned().unwrap_or(Value::Null),
            next,
        }
    }

    /// Title shown for the step: explicit title, else the kind's label.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| self.kind.label())
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Workflow-local table reference (`TableMap` entry).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableMapping {
    pub table_id: String,
    /// workflow-local field ref -> real field id
    pub fields: IndexMap<String, String>,
}

/// One automation workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub id: String,
    /// Explicit title from the draft.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: i64,
    pub steps: Vec<Step>,
    pub tables: IndexMap<String, TableMapping>,
    /// Keys of the workflow record, for schema-drift auditing.
    pub record_keys: Vec<String>,
    /// Keys of the decoded draft, for schema-drift auditing.
    pub draft_keys: Vec<String>,
    /// Set when the draft could not be parsed; the workflow then has no steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_error: Option<String>,
}

impl Workflow {
    pub fn is_enabled(&self) -> bool {
        self.status == 1
    }

    /// A workflow is visible when the sidebar lists it or it has its own title.
    pub fn is_visible(&self, registry: &NameRegistry) -> bool {
        registry.block_name(&self.id).is_some() || self.title.is_some()
    }

    pub fn resolver<'a>(&'a self, registry: &'a NameRegistry) -> Resolver<'a> {
        Resolver::new(registry, &self.tables)
    }

    /// Title shown for the workflow.
    ///
    /// Draft title, then sidebar name, then a title synthesised from the
    /// trigger and its table, then "Untitled workflow".
    pub fn display_title(&self, registry: &NameRegistry) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(name) = registry.block_name(&self.id) {
            return name.to_string();
        }
        let Some(first) = self.steps.first() else {
            return "Untitled workflow".to_string();
        };

        let table = first
            .data
            .get("tableId")
            .or_else(|| first.data.get("watchedCustomTableId"))
            .and_then(id_string)
            .map(|id| crate::formula::quote(&self.resolver(registry).table(&id)))
            .unwrap_or_else(|| "(no table)".to_string());

        match first.kind {
            StepKind::ChangeRecordTrigger => format!("When {table} records change"),
            StepKind::AddRecordTrigger => format!("When a record is added to {table}"),
            StepKind::SetRecordTrigger => format!("When {table} records match conditions"),
            StepKind::TimerTrigger => format!("Scheduled (based on {table})"),
            StepKind::ButtonTrigger => format!("Button click ({table})"),
            _ => format!("{} ({table})", first.kind.label()),
        }
    }

    fn from_value(record: &Value) -> Option<Self> {
        let object = record.as_object()?;
        let id = object
            .get("id")
            .and_then(id_string)
            .unwrap_or_else(|| "(no id)".to_string());
        let status = object.get("status").and_then(Value::as_i64).unwrap_or(0);
        let extra = object.get("WorkflowExtra");

        let (draft, draft_error) = match extra.and_then(|e| e.get("Draft")) {
            None | Some(Value::Null) => (Value::Object(Default::default()), None),
            Some(Value::String(text)) => match decoder::parse_protected(text) {
                Ok(value) if value.is_object() => (value, None),
                Ok(other) => (
                    Value::Null,
                    Some(format!("draft is a JSON {}, not an object", json_kind(&other))),
                ),
                Err(err) => (Value::Null, Some(err.to_string())),
            },
            Some(value) if value.is_object() => (value.clone(), None),
            Some(other) => (Value::Null, Some(format!("draft is a JSON {}", json_kind(other)))),
        };
        if let Some(err) = &draft_error {
            log::warn!("workflow {id}: draft could not be parsed: {err}");
        }

        let steps = draft
            .get("steps")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|step| step.is_object())
            .map(Step::from_value)
            .collect();

        let mut tables = IndexMap::new();
        if let Some(map) = extra
            .and_then(|e| e.pointer("/Extra/TableMap"))
            .and_then(Value::as_object)
        {
            for (reference, info) in map {
                let fields = info
                    .get("FieldMap")
                    .and_then(Value::as_object)
                    .into_iter()
                    .flatten()
                    .filter_map(|(local, real)| id_string(real).map(|real| (local.clone(), real)))
                    .collect();
                tables.insert(
                    reference.clone(),
                    TableMapping {
                        table_id: info.get("TableID").and_then(id_string).unwrap_or_default(),
                        fields,
                    },
                );
            }
        }

        Some(Self {
            id,
            title: draft
                .get("title")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            status,
            steps,
            tables,
            record_keys: object.keys().cloned().collect(),
            draft_keys: draft
                .as_object()
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default(),
            draft_error,
        })
    }
}

/// Decode the automation tree (an array of workflow records).
pub fn parse_workflows(tree: &Value) -> DecodeResult<Vec<Workflow>> {
    let records = tree.as_array().ok_or_else(|| {
        DecodeError::shape(format!(
            "automation must be an array of workflows, got {}",
            json_kind(tree)
        ))
    })?;

    let mut workflows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match Workflow::from_value(record) {
            Some(workflow) => workflows.push(workflow),
            None => log::warn!("skipping workflow record {index}: not an object"),
        }
    }
    Ok(workflows)
}
