use crate::support::*;
use basemap::{FileStore, SnapshotStore, StoreError, analyze, compare, project_id_from_url};
use indexmap::IndexMap;

fn documents_of(payload: &RawPayload) -> IndexMap<String, String> {
    analyze(payload)
        .unwrap()
        .documents
        .iter()
        .map(|(kind, text)| (kind.file_name().to_string(), text.to_string()))
        .collect()
}

#[test]
fn stored_payload_compares_against_the_next_capture() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path(), 2);
    let project = project_id_from_url("https://example.com/base/Prj0001xyz?table=tblOrders01").unwrap();

    let first = fixture();
    let stored = store.save(&project, &first, documents_of(&first)).unwrap();
    assert_eq!(stored.version, 1);
    assert!(stored.documents.contains_key("field-table.md"));

    let mut renamed = orders_fields();
    renamed["fldAmount01"]["name"] = json!("Net amount");
    let second = fixture_with(renamed, steps("s3"));

    let previous = store.latest(&project).unwrap().unwrap();
    assert_eq!(previous.payload, first);

    let outcome = compare(&previous.payload, &second);
    assert_eq!(outcome.changes().map(<[_]>::len), Some(1));

    store.save(&project, &second, documents_of(&second)).unwrap();
    store.save(&project, &second, documents_of(&second)).unwrap();
    assert_eq!(store.versions(&project).unwrap(), vec![2, 3]);
}

#[test]
fn stored_versions_are_readable_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path(), 2);
    store.save("demo", &fixture(), IndexMap::new()).unwrap();

    let path = dir.path().join("demo").join("demo_v1.json");
    let value: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(value["project"], "demo");
    assert_eq!(value["version"], 1);
    assert!(value["payload"]["gzipSnapshot"].is_string());
}

#[test]
fn corrupted_version_file_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path(), 2);
    std::fs::create_dir_all(dir.path().join("demo")).unwrap();
    std::fs::write(dir.path().join("demo").join("demo_v4.json"), "{").unwrap();

    assert!(matches!(store.latest("demo"), Err(StoreError::Json { .. })));
}
