use crate::support::*;
use basemap::{ChangeRecord, ChangeType, DiffOutcome, Snapshot, compare, diff};

fn changes(outcome: &DiffOutcome) -> &[ChangeRecord] {
    outcome.changes().expect("both sides decode")
}

#[test]
fn identical_payloads_have_no_changes() {
    let outcome = compare(&fixture(), &fixture());
    assert!(changes(&outcome).is_empty());
    assert!(outcome.render().contains("No changes detected"));
}

#[test]
fn field_rename_and_retype_is_one_modification() {
    let mut old_fields = orders_fields();
    old_fields["fldY"] = json!({"name": "Amount", "type": 2});
    let mut new_fields = orders_fields();
    new_fields["fldY"] = json!({
        "name": "Total",
        "type": 20,
        "property": {"formula": "$table[tblOrders01].$field[fldY] * 2"}
    });

    let outcome = compare(
        &fixture_with(old_fields, steps("s3")),
        &fixture_with(new_fields, steps("s3")),
    );
    let changes = changes(&outcome);
    assert_eq!(changes.len(), 1, "{changes:#?}");

    let ChangeRecord::FieldModified { table, old, new } = &changes[0] else {
        panic!("expected a field modification, got {changes:?}");
    };
    assert_eq!(table.name, "Orders");
    assert_eq!(old.name, "Amount");
    assert_eq!(new.name, "Total");
    assert_eq!(new.type_label, "Formula");
    assert_eq!(new.config, "`「Orders」.「Total」 * 2`");

    let report = outcome.render();
    assert!(report.contains("## Field table changes"));
    assert!(report.contains("### 「Orders」"));
}

#[test]
fn table_deletion_and_addition_are_symmetric() {
    let two_tables = fixture();
    let tree = json!([{"schema": {
        "tableMap": {"tblOrders01": {"name": "Orders"}},
        "base": {"blockInfos": {"blk1": {"blockToken": "__BIG__", "name": "Mark paid"}}},
        "data": {"tables": [{"meta": {"id": "tblOrders01"}, "fieldMap": orders_fields()}]}
    }}]);
    let snapshot = to_text_with_big_ids(&tree, WORKFLOW_ID);
    let automation = to_text_with_big_ids(&automation_tree(steps("s3")), WORKFLOW_ID);
    let one_table = payload_from_text(&snapshot, Some(&automation));

    let forward = compare(&two_tables, &one_table);
    let deleted: Vec<_> = changes(&forward)
        .iter()
        .filter_map(|c| match c {
            ChangeRecord::TableDeleted { table } => Some(table.name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deleted, vec!["Items"]);

    let backward = compare(&one_table, &two_tables);
    let added: Vec<_> = changes(&backward)
        .iter()
        .filter_map(|c| match c {
            ChangeRecord::TableAdded { table } => Some(table.name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(added, vec!["Items"]);
}

#[test]
fn step_changes_separate_title_from_body() {
    let old = fixture();
    let mut renamed = steps("s3");
    renamed[2]["stepTitle"] = json!("Drop order");
    let new = fixture_with(orders_fields(), renamed);

    let outcome = compare(&old, &new);
    let changes = changes(&outcome);
    assert_eq!(changes.len(), 1);
    let ChangeRecord::StepModified { old, new, .. } = &changes[0] else {
        panic!("expected a step modification, got {changes:?}");
    };
    assert_eq!(old.title, "Remove order");
    assert_eq!(new.title, "Drop order");
    assert_eq!(old.body, new.body);
    assert_eq!(changes[0].change_type(), ChangeType::Modified);
    assert!(outcome.render().contains("\"Remove order\" -> \"Drop order\""));
}

#[test]
fn workflow_removal_is_reported_with_old_name() {
    let snapshot = to_text_with_big_ids(&snapshot_tree(orders_fields()), WORKFLOW_ID);
    let without = payload_from_text(&snapshot, Some("[]"));

    let outcome = compare(&fixture(), &without);
    let changes = changes(&outcome);
    assert_eq!(changes.len(), 1);
    let ChangeRecord::WorkflowDeleted { workflow } = &changes[0] else {
        panic!("expected a workflow deletion, got {changes:?}");
    };
    assert_eq!(workflow.title, "Mark paid");
    assert_eq!(workflow.id, WORKFLOW_ID);
}

#[test]
fn unreadable_old_side_is_a_diagnostic() {
    let broken = RawPayload::new(Blob::Base64("bm90IGd6aXA=".to_string()), None);

    let outcome = compare(&broken, &fixture());
    assert!(matches!(outcome, DiffOutcome::OldUnreadable { .. }));
    assert!(outcome.changes().is_none());
    assert!(outcome.render().contains("previous snapshot could not be decoded"));

    let outcome = compare(&fixture(), &broken);
    assert!(matches!(outcome, DiffOutcome::NewUnreadable { .. }));

    let outcome = compare(&broken, &broken);
    assert!(matches!(outcome, DiffOutcome::BothUnreadable { .. }));
}

#[test]
fn failed_automation_skips_workflows_with_a_note() {
    let snapshot = to_text_with_big_ids(&snapshot_tree(orders_fields()), WORKFLOW_ID);
    let mut broken = payload_from_text(&snapshot, None);
    broken.automation = Some(Blob::Base64("bm90IGd6aXA=".to_string()));

    let outcome = compare(&fixture(), &broken);
    let DiffOutcome::Compared { changes, notes } = &outcome else {
        panic!("expected a comparison, got {outcome:?}");
    };
    assert!(changes.is_empty());
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("workflows were not compared"));
}

#[test]
fn decoded_diff_ignores_workflows_when_automation_failed() {
    let snapshot = to_text_with_big_ids(&snapshot_tree(orders_fields()), WORKFLOW_ID);
    let mut broken = payload_from_text(&snapshot, None);
    broken.automation = Some(Blob::Base64("bm90IGd6aXA=".to_string()));

    let healthy = Snapshot::decode(&fixture()).unwrap();
    let broken = Snapshot::decode(&broken).unwrap();

    assert!(diff(&healthy, &broken).is_empty());
    assert!(diff(&broken, &healthy).is_empty());
}
