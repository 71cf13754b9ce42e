//! End-to-end pipeline behavior: one submitted body in, one classified
//! outcome out.

use std::cell::RefCell;
use std::time::Duration;

use sx_engine::{
    run_script, run_script_with_stats, CapabilityError, CapabilityHandle, EngineOptions,
    ErrorKind, ScriptValue,
};

#[derive(Default)]
struct RecordingHandle {
    calls: RefCell<Vec<String>>,
}

impl CapabilityHandle for RecordingHandle {
    fn invoke(
        &self,
        operation: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, CapabilityError> {
        self.calls.borrow_mut().push(operation.to_string());
        match operation {
            "who_am_i" => Ok(ScriptValue::Str("user-1".into())),
            "retrieve" => {
                let mut map = std::collections::BTreeMap::new();
                map.insert("id".to_string(), args[0].clone());
                map.insert("name".to_string(), ScriptValue::Str("Widget".into()));
                Ok(ScriptValue::Map(map))
            }
            "fail" => Err(CapabilityError::new("operation rejected by platform")),
            other => Err(CapabilityError::new(format!("unknown operation '{other}'"))),
        }
    }
}

fn options() -> EngineOptions {
    EngineOptions::default()
}

#[test]
fn valid_script_succeeds_and_reaches_the_capability() {
    let handle = RecordingHandle::default();
    let outcome = run_script(
        "{ var who = service.who_am_i(); return \"hello \" + who; }",
        &handle,
        &options(),
    );
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.error_kind, None);
    assert_eq!(outcome.message, "hello user-1");
    assert_eq!(handle.calls.borrow().as_slice(), ["who_am_i"]);
}

#[test]
fn null_return_gets_the_stock_message() {
    let outcome = run_script("{ return null; }", &RecordingHandle::default(), &options());
    assert!(outcome.success);
    assert_eq!(outcome.message, "script completed with no return value");
}

#[test]
fn container_return_renders_as_json() {
    let outcome = run_script(
        "{ var m = new Map(); m[\"n\"] = 2; return m; }",
        &RecordingHandle::default(),
        &options(),
    );
    assert!(outcome.success);
    assert_eq!(outcome.message, "{\"n\":2}");
}

#[test]
fn forbidden_reference_is_a_security_violation_and_skips_compilation() {
    let handle = RecordingHandle::default();
    let (outcome, stats) = run_script_with_stats(
        "{ return fs.read_text(\"/etc/passwd\"); }",
        &handle,
        &options(),
    );
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::SecurityViolation));
    assert!(outcome.message.contains("fs.read_text"), "{}", outcome.message);
    assert!(!stats.compile_attempted);
    assert!(!stats.executed);
    assert!(handle.calls.borrow().is_empty());
}

#[test]
fn all_security_violations_are_reported_together() {
    let body = "{ var p = proc.spawn(\"sh\"); var f = new FileStream(\"x\"); \
                var dynamic = 1; return null; }";
    let outcome = run_script(body, &RecordingHandle::default(), &options());
    assert_eq!(outcome.error_kind, Some(ErrorKind::SecurityViolation));
    let detail = outcome.detail.expect("violation detail");
    assert_eq!(detail.as_array().unwrap().len(), 3);
}

#[test]
fn dynamic_parameter_binding_is_a_security_violation() {
    let outcome = run_script(
        "{ return pass(1); } fn pass(dynamic) { return 1; }",
        &RecordingHandle::default(),
        &options(),
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::SecurityViolation));
    assert!(outcome.message.contains("dynamic"), "{}", outcome.message);
}

#[test]
fn parse_failure_is_a_compilation_error_without_validation() {
    let outcome = run_script(
        "{ var x = ; return x; }",
        &RecordingHandle::default(),
        &options(),
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::CompilationError));
    assert!(outcome.message.contains("SX-PARSE"), "{}", outcome.message);
}

#[test]
fn compile_diagnostics_are_accumulated_in_one_outcome() {
    let outcome = run_script(
        "{ var a = missing_one; var b = missing_two; return a; }",
        &RecordingHandle::default(),
        &options(),
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::CompilationError));
    let detail = outcome.detail.expect("diagnostic detail");
    assert_eq!(
        detail["schema_version"],
        sx_contracts::SX_DIAG_SCHEMA_VERSION
    );
    assert_eq!(detail["diagnostics"].as_array().unwrap().len(), 2);
}

#[test]
fn thrown_value_is_a_runtime_error() {
    let outcome = run_script(
        "{ throw \"record not found\"; }",
        &RecordingHandle::default(),
        &options(),
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::RuntimeError));
    assert!(outcome.message.contains("record not found"));
    assert!(outcome.detail.is_some(), "runtime errors carry a backtrace");
}

#[test]
fn failed_capability_operation_is_a_runtime_error_verbatim() {
    let outcome = run_script(
        "{ return service.fail(); }",
        &RecordingHandle::default(),
        &options(),
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::RuntimeError));
    assert_eq!(outcome.message, "operation rejected by platform");
}

#[test]
fn fuel_exhaustion_is_classified_as_a_runtime_error() {
    let opts = EngineOptions {
        fuel: 20_000,
        ..EngineOptions::default()
    };
    let (outcome, stats) = run_script_with_stats(
        "{ var n = 0; while (true) { n = n + 1; } return n; }",
        &RecordingHandle::default(),
        &opts,
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::RuntimeError));
    assert!(outcome.message.contains("fuel budget exhausted"));
    assert!(stats.executed);
}

#[test]
fn stats_account_fuel_on_success() {
    let (outcome, stats) = run_script_with_stats(
        "{ var n = 0; while (n < 100) { n = n + 1; } return n; }",
        &RecordingHandle::default(),
        &options(),
    );
    assert!(outcome.success);
    assert!(stats.fuel_used > 100);
}

#[test]
fn deadline_is_enforced() {
    let opts = EngineOptions {
        deadline: Duration::from_millis(0),
        ..EngineOptions::default()
    };
    let outcome = run_script(
        "{ var n = 0; while (true) { n = n + 1; } return n; }",
        &RecordingHandle::default(),
        &opts,
    );
    assert_eq!(outcome.error_kind, Some(ErrorKind::RuntimeError));
    assert!(
        outcome.message.contains("deadline exceeded"),
        "{}",
        outcome.message
    );
}

#[test]
fn same_body_produces_the_same_fingerprint_and_outcome() {
    let body = "{ var rec = service.retrieve(42); return rec.name; }";
    let (a, sa) = run_script_with_stats(body, &RecordingHandle::default(), &options());
    let (b, sb) = run_script_with_stats(body, &RecordingHandle::default(), &options());
    assert_eq!(sa.unit_fingerprint, sb.unit_fingerprint);
    assert!(!sa.unit_fingerprint.is_empty());
    assert_eq!(a, b);
    assert_eq!(a.message, "Widget");
}

#[test]
fn outcome_carries_the_schema_version() {
    let outcome = run_script("{ return 1; }", &RecordingHandle::default(), &options());
    assert_eq!(outcome.schema_version, sx_contracts::SX_OUTCOME_SCHEMA_VERSION);
}

#[test]
fn oversized_source_is_rejected_before_parsing() {
    let big = format!("{{ var s = \"{}\"; return s; }}", "a".repeat(70_000));
    let outcome = run_script(&big, &RecordingHandle::default(), &options());
    assert_eq!(outcome.error_kind, Some(ErrorKind::CompilationError));
    assert!(outcome.message.contains("SX-LIMIT-0001"));
}
