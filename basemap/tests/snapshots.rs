#[path = "snapshots/diff_tests.rs"]
mod diff_tests;
#[path = "snapshots/pipeline_tests.rs"]
mod pipeline_tests;
#[path = "snapshots/store_tests.rs"]
mod store_tests;
#[path = "snapshots/support.rs"]
mod support;
