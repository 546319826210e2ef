pub(crate) use basemap::{Blob, RawPayload};
pub(crate) use serde_json::{Value, json};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, write::GzEncoder};
use std::io::Write;

/// Workflow id used by the fixtures; 19 digits, above the float-safe range.
pub(crate) const WORKFLOW_ID: &str = "7300000000000000001";

pub(crate) fn gzip_base64(text: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

/// Serialize `tree`, then swap every `"__BIG__"` string for a bare integer
/// literal so the payload carries numbers no f64 or u64 can hold.
pub(crate) fn to_text_with_big_ids(tree: &Value, big: &str) -> String {
    serde_json::to_string(tree).unwrap().replace("\"__BIG__\"", big)
}

pub(crate) fn payload_from_text(snapshot: &str, automation: Option<&str>) -> RawPayload {
    RawPayload::new(
        Blob::Base64(gzip_base64(snapshot)),
        automation.map(|text| Blob::Base64(gzip_base64(text))),
    )
}

pub(crate) fn payload(snapshot: &Value, automation: Option<&Value>) -> RawPayload {
    let snapshot = serde_json::to_string(snapshot).unwrap();
    let automation = automation.map(|tree| serde_json::to_string(tree).unwrap());
    payload_from_text(&snapshot, automation.as_deref())
}

pub(crate) fn orders_fields() -> Value {
    json!({
        "fldName0001": {"name": "Customer", "type": 1},
        "fldAmount01": {"name": "Amount", "type": 2},
        "fldStatus01": {"name": "Status", "type": 3, "property": {"options": [
            {"id": "optPaid0001", "name": "Paid"},
            {"id": "optOpen0001", "name": "Open"}
        ]}},
        "fldItems001": {"name": "Items", "type": 21, "property": {"tableId": "tblItems001"}},
        "fldTotal001": {"name": "Total", "type": 20, "property": {
            "formula": "$table[tblItems001].$field[fldPrice001].SUM()"
        }}
    })
}

pub(crate) fn snapshot_tree(orders_fields: Value) -> Value {
    json!([{
        "schema": {
            "tableMap": {
                "tblOrders01": {"name": "Orders"},
                "tblItems001": {"name": "Items"}
            },
            "base": {"blockInfos": {"blk1": {"blockToken": "__BIG__", "name": "Mark paid"}}},
            "data": {"tables": [
                {"meta": {"id": "tblOrders01"}, "fieldMap": orders_fields},
                {"meta": {"id": "tblItems001"}, "fieldMap": {
                    "fldPrice001": {"name": "Price", "type": 2}
                }}
            ]}
        }
    }])
}

pub(crate) fn steps(branch_target: &str) -> Value {
    json!([
        {"id": "s1", "type": "AddRecordTrigger", "stepTitle": "Order added",
         "data": {"tableId": "tblOrders01", "watchedFieldId": "fldStatus01"}},
        {"id": "s2", "type": "IfElseBranch", "stepTitle": "Is it paid",
         "data": {"meetConditionStepId": branch_target}},
        {"id": "s3", "type": "DeleteRecordAction", "stepTitle": "Remove order",
         "data": {"tableId": "tblOrders01"}}
    ])
}

pub(crate) fn automation_tree(steps: Value) -> Value {
    let draft = serde_json::to_string(&json!({"steps": steps})).unwrap();
    json!([{
        "id": "__BIG__",
        "status": 1,
        "WorkflowExtra": {"Draft": draft}
    }])
}

/// The standard two-table fixture with one workflow, ids as bare big integers.
pub(crate) fn fixture_with(orders_fields: Value, steps: Value) -> RawPayload {
    let snapshot = to_text_with_big_ids(&snapshot_tree(orders_fields), WORKFLOW_ID);
    let automation = to_text_with_big_ids(&automation_tree(steps), WORKFLOW_ID);
    payload_from_text(&snapshot, Some(&automation))
}

pub(crate) fn fixture() -> RawPayload {
    fixture_with(orders_fields(), steps("s3"))
}
