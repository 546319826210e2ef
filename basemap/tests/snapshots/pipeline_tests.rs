use crate::support::*;
use basemap::{AutomationState, DecodeError, DocumentKind, Severity, Snapshot, analyze, formula};

#[test]
fn full_pipeline_renders_every_document() {
    let analysis = analyze(&fixture()).unwrap();

    assert_eq!(analysis.snapshot.tables.len(), 2);
    assert_eq!(analysis.snapshot.field_count(), 6);

    let fields = analysis.documents.get(DocumentKind::FieldTable);
    assert!(fields.starts_with("# Field table\n\n> Tables: 2, fields: 6\n"));
    assert!(fields.contains("| Total | Formula |  |  | `「Items」.「Price」.SUM()` | `fldTotal001` |"));
    assert!(fields.contains("Links to 「Items」"));

    let relationships = analysis.documents.get(DocumentKind::Relationships);
    assert!(relationships.contains("## Orders"));
    assert!(!relationships.contains("## Items"));

    let automation = analysis.documents.get(DocumentKind::AutomationMap);
    assert!(automation.contains("## Mark paid"));
    assert!(automation.contains("- **Step 1: Order added**"));
    assert!(automation.contains("  - Watched field: 「Status」"));
    assert!(automation.contains("  - If met: jump to step 3"));
}

#[test]
fn big_integer_ids_survive_decoding() {
    let analysis = analyze(&fixture()).unwrap();
    let workflows = analysis.snapshot.workflows();
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0].id, WORKFLOW_ID);
    assert_eq!(analysis.snapshot.registry.block_name(WORKFLOW_ID), Some("Mark paid"));
    assert!(
        analysis
            .documents
            .automation_map
            .contains(&format!("- **Workflow ID**: `{WORKFLOW_ID}`"))
    );
}

#[test]
fn ids_longer_than_u64_are_kept_verbatim() {
    let big = "730000000000000000012345";
    let snapshot = to_text_with_big_ids(&snapshot_tree(orders_fields()), big);
    let automation = to_text_with_big_ids(&automation_tree(steps("s3")), big);
    let analysis = analyze(&payload_from_text(&snapshot, Some(&automation))).unwrap();

    assert_eq!(analysis.snapshot.workflows()[0].id, big);
    assert!(analysis.documents.automation_map.contains("## Mark paid"));
}

#[test]
fn fixture_documents_are_complete() {
    let analysis = analyze(&fixture()).unwrap();
    let report = &analysis.report;

    assert_eq!(report.workflows, 1);
    assert_eq!(report.count(Severity::High), 0, "{:#?}", report.findings);
    assert!(report.is_complete(), "{:#?}", report);
    assert!(report.render().contains("## All clear"));
}

#[test]
fn no_bare_identifiers_leak_into_documents() {
    let analysis = analyze(&fixture()).unwrap();
    for (kind, text) in analysis.documents.iter() {
        let bare = basemap::checker::scan_document(kind, text, &analysis.snapshot.registry)
            .into_iter()
            .filter(|f| f.reason == "Bare identifier")
            .count();
        assert_eq!(bare, 0, "bare identifier in {kind}");
    }
}

#[test]
fn missing_branch_target_renders_question_mark() {
    let analysis = analyze(&fixture_with(orders_fields(), steps("sGone"))).unwrap();
    assert!(
        analysis
            .documents
            .automation_map
            .contains("  - If met: jump to step ?")
    );
}

#[test]
fn deleted_field_reference_is_diagnosed() {
    let mut fields = orders_fields();
    fields["fldTotal001"]["property"]["formula"] = json!("$table[tblItems001].$field[fldGone0001] + 1");
    let analysis = analyze(&fixture_with(fields, steps("s3"))).unwrap();

    assert!(
        analysis
            .documents
            .field_table
            .contains("[deleted field:fldGone0001]")
    );
    let finding = analysis
        .report
        .findings
        .iter()
        .find(|f| f.text == "[deleted field:fldGone0001]")
        .unwrap();
    assert_eq!(finding.severity, Severity::Medium);
    assert_eq!(finding.section.as_deref(), Some("Orders"));
}

#[test]
fn formula_translation_is_idempotent() {
    let analysis = analyze(&fixture()).unwrap();
    let registry = &analysis.snapshot.registry;
    let once = formula::translate(
        "$table[tblItems001].$field[fldPrice001].SUM() + $field[fldAmount01]",
        "tblOrders01",
        registry,
    );
    assert_eq!(once, "「Items」.「Price」.SUM() + 「Amount」");
    assert_eq!(formula::translate(&once, "tblOrders01", registry), once);
}

#[test]
fn rendering_twice_gives_identical_text() {
    let a = analyze(&fixture()).unwrap();
    let b = analyze(&fixture()).unwrap();
    assert_eq!(a.documents, b.documents);
}

#[test]
fn broken_automation_blob_keeps_the_schema() {
    let snapshot = to_text_with_big_ids(&snapshot_tree(orders_fields()), WORKFLOW_ID);
    let mut payload = payload_from_text(&snapshot, None);
    payload.automation = Some(Blob::Base64("bm90IGd6aXA=".to_string()));

    let analysis = analyze(&payload).unwrap();
    assert!(matches!(analysis.snapshot.automation, AutomationState::Failed(_)));
    assert!(analysis.documents.automation_map.contains("could not be decoded"));
    assert!(analysis.documents.field_table.contains("## Orders"));
}

#[test]
fn container_text_round_trips_through_serde() {
    let payload = fixture();
    let text = serde_json::to_string(&payload).unwrap();
    assert!(text.contains("\"gzipSnapshot\""));
    let snapshot = Snapshot::from_container(&text).unwrap();
    assert_eq!(snapshot.tables.len(), 2);
}

#[test]
fn missing_snapshot_blob_is_an_error() {
    let err = analyze(&RawPayload::default()).unwrap_err();
    assert!(matches!(err, DecodeError::MissingBlob("snapshot")));
}

#[test]
fn plain_payload_without_automation() {
    let tree = json!([{"schema": {"data": {"table": {
        "meta": {"id": "tblSolo0001", "name": "Solo"},
        "fieldMap": {"fldOnly0001": {"name": "Only", "type": 1}}
    }}}}]);
    let analysis = analyze(&payload(&tree, None)).unwrap();
    assert!(analysis.documents.field_table.contains("## Solo"));
    assert!(analysis.documents.automation_map.contains("no automation data"));
    assert_eq!(analysis.report.workflows, 0);
}
