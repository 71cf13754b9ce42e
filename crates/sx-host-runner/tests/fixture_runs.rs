use std::fs;

use sx_engine::{EngineOptions, ErrorKind};
use sx_host_runner::run_script_file;

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

const FIXTURE: &str = r#"{
  "schema_version": "sx.fixture@0.1.0",
  "operations": {
    "who_am_i": { "ok": "user-1" },
    "retrieve": { "ok": { "id": 42, "name": "Widget" } },
    "delete": { "error": "insufficient privileges" }
  }
}"#;

#[test]
fn script_runs_against_fixture_replies() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(
        &dir,
        "hello.sxs",
        "{ var rec = service.retrieve(42); return rec.name; }",
    );
    let fixture = write(&dir, "fixture.json", FIXTURE);

    let report =
        run_script_file(&script, Some(&fixture), &EngineOptions::default()).unwrap();
    assert!(report.outcome.success, "{}", report.outcome.message);
    assert_eq!(report.outcome.message, "Widget");
    assert_eq!(report.capability_calls, ["retrieve"]);
    assert_eq!(report.lang_id, sx_engine::language::LANG_ID);
    assert!(!report.unit_fingerprint.is_empty());
}

#[test]
fn fixture_error_reply_classifies_as_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(&dir, "del.sxs", "{ return service.delete(7); }");
    let fixture = write(&dir, "fixture.json", FIXTURE);

    let report =
        run_script_file(&script, Some(&fixture), &EngineOptions::default()).unwrap();
    assert!(!report.outcome.success);
    assert_eq!(report.outcome.error_kind, Some(ErrorKind::RuntimeError));
    assert_eq!(report.outcome.message, "insufficient privileges");
}

#[test]
fn operation_outside_the_fixture_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(&dir, "other.sxs", "{ return service.create(new Map()); }");
    let fixture = write(&dir, "fixture.json", FIXTURE);

    let report =
        run_script_file(&script, Some(&fixture), &EngineOptions::default()).unwrap();
    assert_eq!(report.outcome.error_kind, Some(ErrorKind::RuntimeError));
    assert!(report.outcome.message.contains("no fixture reply"));
}

#[test]
fn security_violation_never_touches_the_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(
        &dir,
        "bad.sxs",
        "{ var t = fs.read_text(\"/etc/shadow\"); return service.who_am_i(); }",
    );
    let fixture = write(&dir, "fixture.json", FIXTURE);

    let report =
        run_script_file(&script, Some(&fixture), &EngineOptions::default()).unwrap();
    assert_eq!(
        report.outcome.error_kind,
        Some(ErrorKind::SecurityViolation)
    );
    assert!(report.capability_calls.is_empty());
    assert!(!report.stats.compile_attempted);
}

#[test]
fn report_serializes_with_schema_version() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(&dir, "one.sxs", "{ return 1 + 1; }");

    let report = run_script_file(&script, None, &EngineOptions::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(
        json["schema_version"],
        sx_contracts::SX_HOST_RUNNER_REPORT_SCHEMA_VERSION
    );
    assert_eq!(json["outcome"]["success"], true);
    assert_eq!(json["outcome"]["message"], "2");
}
