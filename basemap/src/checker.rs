//! Completeness audit of rendered documents and workflow payloads.
//!
//! The checker is advisory: it reads a snapshot and its documents and
//! reports what did not resolve, it never changes either.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::document::{DocumentKind, DocumentSet};
use crate::model::Snapshot;
use crate::registry::NameRegistry;
use crate::workflow::StepKind;

/// Step payload keys the workflow renderer understands.
static KNOWN_STEP_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // common
        "type", "id", "data", "stepTitle", "next",
        // triggers
        "tableId", "fields", "triggerControlList", "watchedFieldId", "rule", "startTime", "buttonType",
        // find records
        "recordInfo", "fieldsMap", "fieldIds", "recordType", "shouldProceedWithNoResults",
        // add / update records
        "recordList", "updateFields", "values", "maxSetRecordNum",
        // branches
        "condition", "ifStepId", "elseStepId", "meetConditionStepId", "notMeetConditionStepId",
        // loops
        "loopType", "loopData", "loopStartStepId", "maxLoopCount", "maxLoopTimes", "loopMode",
        "startChildStepId",
        // custom actions
        "packId", "formData", "version", "endpointId", "resultTypeInfo", "packType",
        // misc
        "filterInfo", "isEnabled", "stepNum", "watchedCustomTableId",
    ]
    .into_iter()
    .collect()
});

static KNOWN_WORKFLOW_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "id", "base_id", "trigger_name", "creator", "editor", "status", "delete_flag",
        "created_time", "updated_time", "source", "access_mode", "webhook_token", "biz_type",
        "nodeSchema", "WorkflowExtra",
    ]
    .into_iter()
    .collect()
});

static KNOWN_DRAFT_KEYS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["title", "steps", "version"].into_iter().collect());

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(deleted|unnamed|unknown) (table|field|option|operator|[a-z]+):([^\]]+)\]")
        .expect("placeholder pattern")
});
static VAGUE_STEP_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[step (?:\d+|\?) (?:result|loop item)\]").expect("vague step pattern"));
static UNKNOWN_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Unknown type \(-?\d+\)").expect("unknown type pattern"));
static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:tbl|fld|opt)[A-Za-z0-9]{6,}\b").expect("bare id pattern"));
static CODE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").expect("code span pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// One suspicious match in a rendered document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub document: DocumentKind,
    /// 1-based line number.
    pub line: usize,
    /// Nearest `##` heading above the match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// First cell of the table row, when the match sits in a table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<String>,
    pub text: String,
    pub severity: Severity,
    pub reason: String,
    pub diagnosis: String,
}

/// Where an unrecognised payload key was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", content = "name", rename_all = "snake_case")]
pub enum KeyScope {
    Workflow,
    Draft,
    Step(String),
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScope::Workflow => write!(f, "workflow records"),
            KeyScope::Draft => write!(f, "workflow drafts"),
            KeyScope::Step(step_type) => write!(f, "{step_type} steps"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownKey {
    pub scope: KeyScope,
    pub key: String,
    pub occurrences: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub workflows: usize,
    /// Distinct (step type, key) pairs seen across all steps.
    pub step_keys_seen: usize,
    pub unknown_step_types: Vec<String>,
    pub unknown_keys: Vec<UnknownKey>,
    pub findings: Vec<Finding>,
}

impl CompletenessReport {
    /// Percentage of distinct step payload keys the renderer understands.
    pub fn coverage(&self) -> f64 {
        let unknown = self
            .unknown_keys
            .iter()
            .filter(|k| matches!(k.scope, KeyScope::Step(_)))
            .count();
        if self.step_keys_seen == 0 {
            return 100.0;
        }
        100.0 - (unknown as f64 / self.step_keys_seen as f64 * 100.0)
    }

    pub fn problem_count(&self) -> usize {
        self.unknown_keys.len() + self.unknown_step_types.len() + self.findings.len()
    }

    pub fn is_complete(&self) -> bool {
        self.problem_count() == 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "# Completeness report".to_string(),
            String::new(),
            "## Summary".to_string(),
            String::new(),
            "| Check | Result |".to_string(),
            "| --- | --- |".to_string(),
            format!("| Workflows parsed | {} |", self.workflows),
        ];
        let step_unknown = self.unknown_keys.iter().filter(|k| matches!(k.scope, KeyScope::Step(_))).count();
        if step_unknown == 0 {
            lines.push("| Step key coverage | 100% |".to_string());
        } else {
            lines.push(format!(
                "| Step key coverage | {:.1}% ({step_unknown} unrecognised) |",
                self.coverage()
            ));
        }
        lines.push(format!("| Unresolved identifiers | {} |", self.findings.len()));

        if !self.unknown_step_types.is_empty() {
            lines.push(String::new());
            lines.push("## Unrecognised step types".to_string());
            lines.push(String::new());
            for step_type in &self.unknown_step_types {
                lines.push(format!("- `{step_type}` (rendered as raw configuration)"));
            }
        }

        if !self.unknown_keys.is_empty() {
            lines.push(String::new());
            lines.push("## Unrecognised payload keys".to_string());
            for key in &self.unknown_keys {
                lines.push(String::new());
                lines.push(format!("### `{}` in {}", key.key, key.scope));
                lines.push(format!("- **Occurrences**: {}", key.occurrences));
                if let Some(sample) = &key.sample {
                    lines.push(format!("- **Sample**: `{sample}`"));
                }
            }
        }

        if !self.findings.is_empty() {
            lines.push(String::new());
            lines.push("## Document findings".to_string());
            for (index, finding) in self.findings.iter().enumerate() {
                lines.push(String::new());
                lines.push(format!("### {}. {} ({})", index + 1, finding.reason, finding.severity));
                lines.push(format!(
                    "- **Location**: {} line {}",
                    finding.document.file_name(),
                    finding.line
                ));
                lines.push(format!(
                    "- **Context**: section {} / row {}",
                    finding.section.as_deref().unwrap_or("(none)"),
                    finding.row.as_deref().unwrap_or("(none)")
                ));
                lines.push(format!("- **Text**: `{}`", finding.text));
                lines.push(format!("- **Diagnosis**: {}", finding.diagnosis));
            }
        }

        if self.is_complete() {
            lines.push(String::new());
            lines.push("## All clear".to_string());
            lines.push(String::new());
            lines.push("Every identifier resolved and every payload key is recognised.".to_string());
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Audit a snapshot's workflows and scan its rendered documents.
pub fn check(snapshot: &Snapshot, documents: &DocumentSet) -> CompletenessReport {
    let mut keys: IndexMap<(KeyScope, String), (usize, Option<String>)> = IndexMap::new();
    let mut step_keys_seen: HashSet<(String, String)> = HashSet::new();
    let mut unknown_step_types: Vec<String> = Vec::new();

    for workflow in snapshot.workflows() {
        for key in &workflow.record_keys {
            if !KNOWN_WORKFLOW_KEYS.contains(key.as_str()) {
                keys.entry((KeyScope::Workflow, key.clone())).or_insert((0, None)).0 += 1;
            }
        }
        for key in &workflow.draft_keys {
            if !KNOWN_DRAFT_KEYS.contains(key.as_str()) {
                keys.entry((KeyScope::Draft, key.clone())).or_insert((0, None)).0 += 1;
            }
        }
        for step in &workflow.steps {
            if matches!(step.kind, StepKind::Other(_)) && !unknown_step_types.contains(&step.type_name) {
                unknown_step_types.push(step.type_name.clone());
            }
            let Some(data) = step.data.as_object() else { continue };
            for (key, value) in data {
                step_keys_seen.insert((step.type_name.clone(), key.clone()));
                if KNOWN_STEP_KEYS.contains(key.as_str()) {
                    continue;
                }
                let entry = keys
                    .entry((KeyScope::Step(step.type_name.clone()), key.clone()))
                    .or_insert((0, None));
                entry.0 += 1;
                if entry.1.is_none() {
                    entry.1 = Some(sample(&value.to_string()));
                }
            }
        }
    }

    let mut findings = Vec::new();
    for (kind, text) in documents.iter() {
        findings.extend(scan_document(kind, text, &snapshot.registry));
    }

    let report = CompletenessReport {
        workflows: snapshot.workflows().len(),
        step_keys_seen: step_keys_seen.len(),
        unknown_step_types,
        unknown_keys: keys
            .into_iter()
            .map(|((scope, key), (occurrences, sample))| UnknownKey {
                scope,
                key,
                occurrences,
                sample,
            })
            .collect(),
        findings,
    };
    log::debug!(
        "completeness: {} findings, {} unknown keys",
        report.findings.len(),
        report.unknown_keys.len()
    );
    report
}

fn sample(text: &str) -> String {
    const LIMIT: usize = 80;
    let text = text.replace('`', "'");
    if text.chars().count() <= LIMIT {
        return text;
    }
    let cut: String = text.chars().take(LIMIT).collect();
    format!("{cut}...")
}

/// Scan one rendered document for unresolved or suspicious content.
pub fn scan_document(kind: DocumentKind, text: &str, registry: &NameRegistry) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut section: Option<String> = None;

    for (index, line) in text.lines().enumerate() {
        if let Some(heading) = line.strip_prefix("## ") {
            section = Some(heading.trim().to_string());
        }
        let row = first_cell(line);
        let mut push = |matched: &str, severity: Severity, reason: &str, diagnosis: String| {
            findings.push(Finding {
                document: kind,
                line: index + 1,
                section: section.clone(),
                row: row.clone(),
                text: matched.to_string(),
                severity,
                reason: reason.to_string(),
                diagnosis,
            });
        };

        let mut masked: Vec<Range<usize>> = CODE_SPAN.find_iter(line).map(|m| m.range()).collect();

        for caps in PLACEHOLDER.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            masked.push(whole.range());
            let state = caps.get(1).map_or("", |m| m.as_str());
            let entity = caps.get(2).map_or("", |m| m.as_str());
            let id = caps.get(3).map_or("", |m| m.as_str());

            let (severity, reason, diagnosis) = match (state, entity) {
                ("unknown", "operator") => (
                    Severity::Low,
                    "Unknown operator",
                    format!("Condition operator `{id}` has no readable form."),
                ),
                ("unnamed", _) => (
                    Severity::Low,
                    "Unnamed entity",
                    format!("The source {entity} `{id}` exists but carries no name."),
                ),
                _ if id == "(none)" => (
                    Severity::Medium,
                    "Empty reference",
                    format!("A {entity} reference carries no identifier."),
                ),
                _ if registry.contains_id(id) => (
                    Severity::High,
                    "Resolver defect",
                    format!("`{id}` exists in the source snapshot but was not resolved."),
                ),
                _ => (
                    Severity::Medium,
                    "Missing source reference",
                    format!("`{id}` does not exist in the source snapshot; it was probably deleted."),
                ),
            };
            push(whole.as_str(), severity, reason, diagnosis);
        }

        for m in VAGUE_STEP_REF.find_iter(line) {
            push(
                m.as_str(),
                Severity::Low,
                "Vague step reference",
                "The reference names a step but not the value it reads.".to_string(),
            );
        }

        for m in UNKNOWN_TYPE.find_iter(line) {
            push(
                m.as_str(),
                Severity::Medium,
                "Unknown field type",
                "The field type code is not recognised; its configuration is shown raw.".to_string(),
            );
        }

        for m in BARE_ID.find_iter(line) {
            let inside = masked.iter().any(|r| r.start <= m.start() && m.end() <= r.end);
            if inside || !looks_generated(m.as_str()) {
                continue;
            }
            push(
                m.as_str(),
                Severity::High,
                "Bare identifier",
                format!("`{}` appears without a name or placeholder.", m.as_str()),
            );
        }
    }
    findings
}

/// Generated ids mix case or digits after the prefix; plain words do not.
fn looks_generated(candidate: &str) -> bool {
    candidate[3..]
        .chars()
        .any(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

fn first_cell(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix('|')?;
    let cell = rest.split(" | ").next()?.trim().trim_end_matches('|').trim();
    let cell = cell.trim_matches('*');
    (!cell.is_empty() && cell != "---").then(|| cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> NameRegistry {
        let mut registry = NameRegistry::default();
        registry.record_table("tblOrders01", "Orders");
        registry.record_field("tblOrders01", "fldKnown01", "Known");
        registry
    }

    #[test]
    fn test_placeholders_are_diagnosed_by_source_presence() {
        let text = "## Orders\n| Total | Formula |  |  | `「[deleted field:fldKnown01]」 + 「[deleted field:fldGone001]」` | `fldTotal01` |";
        let findings = scan_document(DocumentKind::FieldTable, text, &registry());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].reason, "Resolver defect");
        assert_eq!(findings[0].section.as_deref(), Some("Orders"));
        assert_eq!(findings[0].row.as_deref(), Some("Total"));
        assert_eq!(findings[0].line, 2);
        assert_eq!(findings[1].severity, Severity::Medium);
    }

    #[test]
    fn test_bare_ids_outside_code_spans() {
        let text = "- Table ID: `tblOrders01`\n- Links to tblAbC123xyz\n- optional wording here";
        let findings = scan_document(DocumentKind::Relationships, text, &registry());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].text, "tblAbC123xyz");
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_low_severity_findings() {
        let text = "  - Loop over: [step 2 result] is [unknown operator:isWeird]";
        let findings = scan_document(DocumentKind::AutomationMap, text, &registry());
        let reasons: Vec<&str> = findings.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons, vec!["Unknown operator", "Vague step reference"]);
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
    }

    #[test]
    fn test_unknown_payload_keys_are_reported() {
        let tree = json!([{"schema": {"data": {"tables": []}}}]);
        let automation = json!([{
            "id": "1",
            "status": 1,
            "mystery": true,
            "WorkflowExtra": {"Draft": {"title": "T", "steps": [
                {"id": "s1", "type": "FindRecordAction", "data": {"tableId": "tblOrders01", "newKnob": 3}},
                {"id": "s2", "type": "FutureStep", "data": {}}
            ]}}
        }]);
        let snapshot = Snapshot::from_trees(&tree, Some(Ok(automation))).unwrap();
        let documents = DocumentSet::render(&snapshot);
        let report = check(&snapshot, &documents);

        assert_eq!(report.workflows, 1);
        assert_eq!(report.unknown_step_types, vec!["FutureStep".to_string()]);
        let keys: Vec<(String, &str)> = report
            .unknown_keys
            .iter()
            .map(|k| (k.scope.to_string(), k.key.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("workflow records".to_string(), "mystery"),
                ("FindRecordAction steps".to_string(), "newKnob"),
            ]
        );
        assert!((report.coverage() - 50.0).abs() < f64::EPSILON);
        assert!(!report.is_complete());
        assert!(report.render().contains("### `newKnob` in FindRecordAction steps"));
    }

    #[test]
    fn test_clean_snapshot_reports_all_clear() {
        let tree = json!([{"schema": {"data": {"tables": [
            {"meta": {"id": "tblOrders01", "name": "Orders"}, "fieldMap": {
                "fldKnown01": {"name": "Known", "type": 1}
            }}
        ]}}}]);
        let snapshot = Snapshot::from_trees(&tree, None).unwrap();
        let report = check(&snapshot, &DocumentSet::render(&snapshot));
        assert!(report.is_complete(), "{report:#?}");
        assert!(report.render().contains("## All clear"));
    }
}
