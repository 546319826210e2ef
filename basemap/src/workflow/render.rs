//! Per-step semantic rendering of a workflow.

use chrono::DateTime;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};

use super::values::{
    branch_condition, condition_list, field_assignments, format_value, resolve_ids, trigger_filter,
};
use super::{Resolver, Step, StepKind, Workflow};
use crate::fields::{scalar_text, truthy};
use crate::formula::quote;
use crate::model::id_string;
use crate::registry::{NameRegistry, placeholder};

/// One rendered step. `body` lines are already indented under the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ordinal: usize,
    pub title: String,
    pub body: Vec<String>,
}

impl RenderedStep {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("- **Step {}: {}**", self.ordinal, self.title)];
        if let Some(id) = &self.id {
            lines.push(format!("  - **Step ID**: `{id}`"));
        }
        lines.extend(self.body.iter().cloned());
        lines
    }

    /// Body text used for semantic comparison (title and id excluded).
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedWorkflow {
    pub id: String,
    pub title: String,
    pub enabled: bool,
    pub steps: Vec<RenderedStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RenderedWorkflow {
    pub fn status_label(&self) -> &'static str {
        if self.enabled { "Enabled" } else { "Disabled" }
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("## {}", self.title),
            format!("- **Workflow ID**: `{}`", self.id),
            format!("- **Status**: {}", self.status_label()),
        ];
        if let Some(note) = &self.note {
            lines.push(format!("- **Note**: {note}"));
        }
        if !self.steps.is_empty() {
            lines.push("- **Steps**:".to_string());
            for step in &self.steps {
                lines.extend(step.lines());
            }
        }
        lines.join("\n")
    }
}

/// Render a workflow with every reference resolved against `registry`.
pub fn render_workflow(workflow: &Workflow, registry: &NameRegistry) -> RenderedWorkflow {
    let resolver = workflow.resolver(registry);

    let mut ordinals: IndexMap<&str, usize> = IndexMap::new();
    for (index, step) in workflow.steps.iter().enumerate() {
        if let Some(id) = &step.id {
            ordinals.entry(id.as_str()).or_insert(index + 1);
        }
    }

    let steps = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let ctx = StepContext {
                resolver: &resolver,
                ordinals: &ordinals,
                next_step: workflow.steps.get(index + 1).and_then(|s| s.id.as_deref()),
            };
            RenderedStep {
                id: step.id.clone(),
                ordinal: index + 1,
                title: step.display_title().to_string(),
                body: ctx.body(step),
            }
        })
        .collect();

    RenderedWorkflow {
        id: workflow.id.clone(),
        title: workflow.display_title(registry),
        enabled: workflow.is_enabled(),
        steps,
        note: workflow
            .draft_error
            .as_ref()
            .map(|err| format!("draft could not be parsed ({err})")),
    }
}

struct StepContext<'a> {
    resolver: &'a Resolver<'a>,
    ordinals: &'a IndexMap<&'a str, usize>,
    next_step: Option<&'a str>,
}

impl StepContext<'_> {
    /// Ordinal of a referenced step, or `?` when the id is not in the list.
    fn ordinal(&self, step_id: &str) -> String {
        self.ordinals
            .get(step_id.trim_matches('"'))
            .map(usize::to_string)
            .unwrap_or_else(|| placeholder::UNKNOWN_STEP.to_string())
    }

    fn field(&self, value: Option<&Value>) -> String {
        quote(&self.resolver.field(&value.and_then(id_string).unwrap_or_default()))
    }

    fn body(&self, step: &Step) -> Vec<String> {
        let data = &step.data;
        let mut lines = Vec::new();

        if let Some(table) = data.get("tableId").and_then(id_string) {
            lines.push(format!("  - Table: {}", quote(&self.resolver.table(&table))));
        }

        match &step.kind {
            StepKind::ChangeRecordTrigger => self.change_trigger(data, &mut lines),
            StepKind::AddRecordTrigger => {
                if data.get("watchedFieldId").is_some_and(|v| !v.is_null()) {
                    lines.push(format!("  - Watched field: {}", self.field(data.get("watchedFieldId"))));
                }
            }
            _ => {}
        }

        if let Some(condition) = step.next.first().and_then(|edge| edge.condition.as_ref()) {
            let text = trigger_filter(condition, self.resolver);
            if !text.is_empty() {
                lines.push(format!("  - **Trigger filter**: {text}"));
            }
        }

        match &step.kind {
            StepKind::SetRecordTrigger => {
                let watched: Vec<String> = array(data, "fields")
                    .iter()
                    .map(|f| self.field(f.get("fieldId")))
                    .collect();
                if !watched.is_empty() {
                    lines.push(format!("  - Watched fields: {}", watched.join(", ")));
                }
            }
            StepKind::TimerTrigger => self.timer(data, &mut lines),
            StepKind::FindRecord => self.find_record(data, &mut lines),
            StepKind::ButtonTrigger => {
                let kind = data.get("buttonType").map(scalar_text).unwrap_or_default();
                let label = match kind.as_str() {
                    "buttonField" => "field button",
                    "recordMenu" => "record menu",
                    other => other,
                };
                lines.push(format!("  - Button type: {label}"));
            }
            StepKind::AddRecord => self.assignments(data, &mut lines),
            StepKind::UpdateRecord | StepKind::DeleteRecord => {
                self.target_records(data, &mut lines);
                self.assignments(data, &mut lines);
            }
            StepKind::Loop => self.loop_step(data, &mut lines),
            StepKind::IfElseBranch => self.branch(data, &mut lines),
            StepKind::CustomAction => self.custom_action(data, &mut lines),
            StepKind::SendNotification | StepKind::SendEmail => self.generic_settings(data, &mut lines),
            StepKind::Other(_) => {
                if truthy(Some(data)) {
                    let data = resolve_ids(data, self.resolver);
                    lines.push(format!("  - Raw configuration: `{data}`"));
                }
            }
            StepKind::ChangeRecordTrigger | StepKind::AddRecordTrigger | StepKind::FormSubmitTrigger => {}
        }

        for edge in &step.next {
            let Some(target) = &edge.step_id else { continue };
            if Some(target.as_str()) != self.next_step {
                lines.push(format!("  - Next: step {}", self.ordinal(target)));
            }
        }

        lines
    }

    fn change_trigger(&self, data: &Value, lines: &mut Vec<String>) {
        let fields = array(data, "fields");
        if !fields.is_empty() {
            let text = trigger_filter(&json!({ "conditions": fields }), self.resolver);
            lines.push(format!("  - Trigger conditions: {text}"));
        }

        let sources: Vec<String> = array(data, "triggerControlList")
            .iter()
            .map(|source| {
                let source = scalar_text(source);
                match source.as_str() {
                    "pasteUpdate" => "paste update".to_string(),
                    "automationBatchUpdate" => "automation batch update".to_string(),
                    "appendImport" => "append import".to_string(),
                    "openAPIBatchUpdate" => "API batch update".to_string(),
                    _ => source,
                }
            })
            .collect();
        if !sources.is_empty() {
            lines.push(format!("  - Trigger sources: {}", sources.join(", ")));
        }
    }

    fn timer(&self, data: &Value, lines: &mut Vec<String>) {
        if let Some(start) = data.get("startTime").filter(|v| !v.is_null()) {
            let millis = start
                .as_i64()
                .or_else(|| start.as_str().and_then(|s| s.parse::<i64>().ok()));
            let text = millis
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| scalar_text(start));
            lines.push(format!("  - Start time: {text}"));
        }
        let rule = data.get("rule").map(scalar_text).unwrap_or_default();
        let repeat = match rule.as_str() {
            "MONTHLY" => "monthly",
            "WEEKLY" => "weekly",
            "DAILY" => "daily",
            "HOURLY" => "hourly",
            "" => "once",
            other => other,
        };
        lines.push(format!("  - Repeat: {repeat}"));
    }

    fn find_record(&self, data: &Value, lines: &mut Vec<String>) {
        let returned: Vec<String> = array(data, "fieldIds")
            .iter()
            .map(|id| self.field(Some(id)))
            .collect();
        if !returned.is_empty() {
            lines.push(format!("  - Returned fields: {}", returned.join(", ")));
        }

        let info = data.get("recordInfo").unwrap_or(&Value::Null);
        let source_step = info.get("stepId").and_then(id_string);
        match (data.get("recordType").and_then(Value::as_str), source_step) {
            (Some("Ref"), Some(step_id)) => lines.push(format!(
                "  - Search: filter the records returned by step {}",
                self.ordinal(&step_id)
            )),
            _ => match info.get("conditions").and_then(Value::as_array) {
                Some(conditions) => lines.push(format!(
                    "  - Conditions: {}",
                    condition_list(conditions, info.get("conjunction").and_then(Value::as_str), self.resolver)
                )),
                None => lines.push("  - Conditions: none (all records)".to_string()),
            },
        }

        if truthy(data.get("shouldProceedWithNoResults")) {
            lines.push("  - When nothing is found: continue".to_string());
        }
    }

    fn target_records(&self, data: &Value, lines: &mut Vec<String>) {
        let info = data.get("recordInfo").unwrap_or(&Value::Null);
        let from_step = data.get("recordType").and_then(Value::as_str) == Some("stepRecord")
            || info.get("type").and_then(Value::as_str) == Some("ref");
        if from_step {
            let step = info
                .get("stepNum")
                .map(scalar_text)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| placeholder::UNKNOWN_STEP.to_string());
            lines.push(format!("  - Target: [records found by step {step}]"));
        } else if let Some(conditions) = info.get("conditions").and_then(Value::as_array) {
            lines.push(format!(
                "  - Conditions: {}",
                condition_list(conditions, info.get("conjunction").and_then(Value::as_str), self.resolver)
            ));
        }
    }

    fn assignments(&self, data: &Value, lines: &mut Vec<String>) {
        let assigned = field_assignments(array(data, "values"), self.resolver);
        if !assigned.is_empty() {
            lines.push("  - Set fields:".to_string());
            lines.extend(assigned.into_iter().map(|line| format!("    {line}")));
        }
    }

    fn loop_step(&self, data: &Value, lines: &mut Vec<String>) {
        let kind = data.get("loopType").map(scalar_text).unwrap_or_default();
        let label = match kind.as_str() {
            "forEach" => "for each record",
            "times" => "fixed count",
            other => other,
        };
        lines.push(format!("  - Loop type: {label}"));

        if let Some(source) = data.get("loopData")
            && source.get("type").and_then(Value::as_str) == Some("ref")
        {
            let step = source
                .get("stepNum")
                .map(scalar_text)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| placeholder::UNKNOWN_STEP.to_string());
            lines.push(format!("  - Loop over: [records found by step {step}]"));
        }

        if let Some(start) = data
            .get("loopStartStepId")
            .or_else(|| data.get("startChildStepId"))
            .and_then(id_string)
        {
            lines.push(format!("  - Loop body starts at: step {}", self.ordinal(&start)));
        }

        let max = data
            .get("maxLoopTimes")
            .or_else(|| data.get("maxLoopCount"))
            .filter(|v| truthy(Some(*v)));
        if let Some(max) = max {
            lines.push(format!("  - Max iterations: {}", scalar_text(max)));
        }
    }

    fn branch(&self, data: &Value, lines: &mut Vec<String>) {
        if let Some(condition) = data.get("condition").filter(|c| truthy(Some(*c))) {
            lines.push(format!("  - **Condition**: {}", branch_condition(condition, self.resolver)));
        }

        match data.get("meetConditionStepId").and_then(id_string) {
            Some(target) => lines.push(format!("  - If met: jump to step {}", self.ordinal(&target))),
            None => lines.push("  - If met: continue".to_string()),
        }
        match data.get("notMeetConditionStepId").and_then(id_string) {
            Some(target) => lines.push(format!("  - If not met: jump to step {}", self.ordinal(&target))),
            None => lines.push("  - If not met: (no action)".to_string()),
        }
    }

    fn custom_action(&self, data: &Value, lines: &mut Vec<String>) {
        let pack = data.get("packId").map(scalar_text).unwrap_or_default();
        lines.push(format!("  - Action: custom action (pack: {pack})"));

        let settings: Vec<String> = match data.get("formData") {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| {
                    let label = item
                        .get("label")
                        .or_else(|| item.get("key"))
                        .and_then(Value::as_str)
                        .unwrap_or("setting");
                    let value = match item.get("value") {
                        Some(Value::Array(parts)) => parts
                            .iter()
                            .map(|part| match part.get("text").and_then(Value::as_str) {
                                Some(text) if !text.is_empty() => text.to_string(),
                                _ if part.is_object() => format_value(part, self.resolver, 0),
                                _ => scalar_text(part),
                            })
                            .collect::<String>(),
                        Some(value) => format_value(value, self.resolver, 0),
                        None => String::new(),
                    };
                    format!("    - {label}: {value}")
                })
                .collect(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| format!("    - {key}: {}", format_value(value, self.resolver, 0)))
                .collect(),
            _ => Vec::new(),
        };
        if !settings.is_empty() {
            lines.push("  - Settings:".to_string());
            lines.extend(settings);
        }
    }

    fn generic_settings(&self, data: &Value, lines: &mut Vec<String>) {
        let Some(map) = data.as_object() else { return };
        for (key, value) in map {
            if key == "tableId" || value.is_null() {
                continue;
            }
            lines.push(format!("  - {key}: {}", format_value(value, self.resolver, 2)));
        }
    }
}

fn array<'v>(data: &'v Value, key: &str) -> &'v [Value] {
    data.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse_workflows;

    fn registry() -> NameRegistry {
        let mut registry = NameRegistry::default();
        registry.record_table("tblOrders", "Orders");
        registry.record_field("tblOrders", "fldStatus", "Status");
        registry.record_field("tblOrders", "fldAmount", "Amount");
        registry.record_option("optPaid001", "Paid");
        registry
    }

    fn workflow(steps: Value) -> Workflow {
        let record = json!({
            "id": "7300000000000000042",
            "status": 1,
            "WorkflowExtra": {"Draft": {"title": "Order flow", "steps": steps}}
        });
        parse_workflows(&json!([record]))
            .expect("workflow parses")
            .remove(0)
    }

    #[test]
    fn test_branch_targets_resolve_to_ordinals() {
        let wf = workflow(json!([
            {"id": "t1", "type": "AddRecordTrigger", "data": {"tableId": "tblOrders", "watchedFieldId": "fldStatus"}},
            {"id": "b1", "type": "IfElseBranch", "data": {
                "condition": {"conjunction": "and", "conditions": [
                    {"leftValue": {"type": "ref", "tagType": "step", "stepNum": 1, "fields": [{"fieldId": "fldStatus"}]},
                     "operator": "is", "rightValue": ["optPaid001"]}
                ]},
                "meetConditionStepId": "u1"
            }},
            {"id": "u1", "type": "UpdateRecordAction", "data": {
                "tableId": "tblOrders",
                "recordType": "stepRecord",
                "recordInfo": {"stepNum": 1},
                "values": [{"fieldId": "fldAmount", "value": 0}]
            }}
        ]));
        let rendered = render_workflow(&wf, &registry());

        assert_eq!(rendered.title, "Order flow");
        assert_eq!(rendered.steps[0].title, "When a record is added");
        assert!(rendered.steps[0].body.contains(&"  - Watched field: 「Status」".to_string()));

        let branch = &rendered.steps[1].body;
        assert!(branch.contains(&"  - **Condition**: [step 1's 「Status」] is \"Paid\"".to_string()));
        assert!(branch.contains(&"  - If met: jump to step 3".to_string()));
        assert!(branch.contains(&"  - If not met: (no action)".to_string()));

        let update = &rendered.steps[2].body;
        assert_eq!(
            update,
            &vec![
                "  - Table: 「Orders」".to_string(),
                "  - Target: [records found by step 1]".to_string(),
                "  - Set fields:".to_string(),
                "    - 「Amount」 = 0".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_branch_target_renders_question_mark() {
        let wf = workflow(json!([
            {"id": "b1", "type": "IfElseBranch", "data": {
                "meetConditionStepId": "ghost",
                "notMeetConditionStepId": "b1"
            }}
        ]));
        let rendered = render_workflow(&wf, &registry());
        let body = &rendered.steps[0].body;
        assert!(body.contains(&"  - If met: jump to step ?".to_string()));
        assert!(body.contains(&"  - If not met: jump to step 1".to_string()));
    }

    #[test]
    fn test_find_record_and_loop() {
        let wf = workflow(json!([
            {"id": "t1", "type": "TimerTrigger", "data": {"rule": "DAILY", "startTime": 1700000000000i64}},
            {"id": "f1", "type": "FindRecordAction", "data": {
                "tableId": "tblOrders",
                "fieldIds": ["fldAmount"],
                "recordInfo": {"conditions": [{"fieldId": "fldStatus", "operator": "isNot", "value": "optPaid001"}]},
                "shouldProceedWithNoResults": true
            }},
            {"id": "l1", "type": "Loop", "data": {
                "loopType": "forEach",
                "loopData": {"type": "ref", "stepNum": 2},
                "maxLoopTimes": 50
            }}
        ]));
        let rendered = render_workflow(&wf, &registry());

        assert_eq!(
            rendered.steps[0].body,
            vec!["  - Start time: 2023-11-14 22:13 UTC".to_string(), "  - Repeat: daily".to_string()]
        );
        let find = &rendered.steps[1].body;
        assert!(find.contains(&"  - Returned fields: 「Amount」".to_string()));
        assert!(find.contains(&"  - Conditions: 「Status」 is not \"Paid\"".to_string()));
        assert!(find.contains(&"  - When nothing is found: continue".to_string()));

        assert_eq!(
            rendered.steps[2].body,
            vec![
                "  - Loop type: for each record".to_string(),
                "  - Loop over: [records found by step 2]".to_string(),
                "  - Max iterations: 50".to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_step_type_falls_back_to_raw_config() {
        let wf = workflow(json!([{"id": "x1", "type": "FutureAction", "data": {"k": 1}}]));
        let rendered = render_workflow(&wf, &registry());
        assert_eq!(rendered.steps[0].title, "FutureAction");
        assert_eq!(rendered.steps[0].body, vec!["  - Raw configuration: `{\"k\":1}`".to_string()]);
    }

    #[test]
    fn test_settings_name_referenced_fields_and_tables() {
        let registry = registry();
        let wf = workflow(json!([
            {"id": "n1", "type": "SendNotification", "data": {"receiver": "fldStatus", "target": "tblOrders"}},
            {"id": "x1", "type": "FutureAction", "data": {"watch": "fldAmount"}}
        ]));
        let rendered = render_workflow(&wf, &registry);
        assert_eq!(
            rendered.steps[0].body,
            vec!["  - receiver: 「Status」".to_string(), "  - target: 「Orders」".to_string()]
        );
        assert_eq!(
            rendered.steps[1].body,
            vec!["  - Raw configuration: `{\"watch\":\"「Amount」\"}`".to_string()]
        );

        let markdown = rendered.to_markdown();
        let findings = crate::checker::scan_document(crate::DocumentKind::AutomationMap, &markdown, &registry);
        assert!(
            findings.iter().all(|f| f.reason != "Bare identifier"),
            "{findings:#?}"
        );
        assert!(!markdown.contains("fldStatus"));
    }

    #[test]
    fn test_markdown_layout() {
        let wf = workflow(json!([{"id": "t1", "type": "ButtonTrigger", "data": {"buttonType": "recordMenu"}}]));
        let markdown = render_workflow(&wf, &registry()).to_markdown();
        let expected = [
            "## Order flow",
            "- **Workflow ID**: `7300000000000000042`",
            "- **Status**: Enabled",
            "- **Steps**:",
            "- **Step 1: When a button is clicked**",
            "  - **Step ID**: `t1`",
            "  - Button type: record menu",
        ];
        assert_eq!(markdown, expected.join("\n"));
    }
}
