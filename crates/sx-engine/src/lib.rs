//! Compile-and-execute pipeline for untrusted scripts.
//!
//! A caller submits a script body and a borrowed capability handle; the
//! engine wraps the body into a translation unit, statically validates it
//! against the denylist, compiles it in memory, executes it under hard
//! resource ceilings, and classifies any failure into one of four error
//! kinds. Nothing is written to disk and nothing survives the call: each
//! invocation builds, runs, and discards its own module.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde::Serialize;

pub mod ast;
pub mod builtins;
pub mod capability;
pub mod compile;
pub mod diagnostics;
pub mod generate;
pub mod guide;
pub mod language;
pub mod lexer;
pub mod outcome;
pub mod parser;
pub mod validate;
pub mod value;
pub mod vm;

pub use capability::{CapabilityError, CapabilityHandle};
pub use outcome::{ErrorKind, ExecutionOutcome};
pub use value::{ScriptValue, ValueBudget};
pub use vm::VmBudget;

use diagnostics::Diagnostic;
use language::limits;
use sx_contracts::SX_DIAG_SCHEMA_VERSION;

/// Per-invocation knobs. Defaults match the hosted service configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub fuel: u64,
    pub deadline: Duration,
    pub max_call_depth: usize,
    pub values: ValueBudget,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let b = VmBudget::default();
        Self {
            fuel: b.fuel,
            deadline: b.deadline,
            max_call_depth: b.max_call_depth,
            values: b.values,
        }
    }
}

impl EngineOptions {
    fn vm_budget(&self) -> VmBudget {
        VmBudget {
            fuel: self.fuel,
            deadline: self.deadline,
            max_call_depth: self.max_call_depth,
            values: self.values,
        }
    }
}

/// Instrumentation for one pipeline run; reported alongside the outcome so
/// hosts can assert stage ordering and account for fuel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub unit_fingerprint: String,
    pub compile_attempted: bool,
    pub executed: bool,
    pub fuel_used: u64,
}

/// Runs the full pipeline. Never panics: engine bugs surface as
/// internal-error outcomes.
pub fn run_script(
    body: &str,
    service: &dyn CapabilityHandle,
    options: &EngineOptions,
) -> ExecutionOutcome {
    run_script_with_stats(body, service, options).0
}

pub fn run_script_with_stats(
    body: &str,
    service: &dyn CapabilityHandle,
    options: &EngineOptions,
) -> (ExecutionOutcome, PipelineStats) {
    let mut stats = PipelineStats::default();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_pipeline(body, service, options, &mut stats)
    }));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let what = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ExecutionOutcome::failure(
                ErrorKind::InternalError,
                format!("engine panicked: {what}"),
                None,
            )
        }
    };
    (outcome, stats)
}

fn run_pipeline(
    body: &str,
    service: &dyn CapabilityHandle,
    options: &EngineOptions,
    stats: &mut PipelineStats,
) -> ExecutionOutcome {
    let max_source = limits::max_source_bytes();
    if body.len() > max_source {
        return ExecutionOutcome::failure(
            ErrorKind::CompilationError,
            format!(
                "SX-LIMIT-0001: script too large: max_source_bytes={max_source} got {}",
                body.len()
            ),
            None,
        );
    }

    let unit = generate::wrap_script_body(body);
    stats.unit_fingerprint = unit.fingerprint.clone();

    // A broken tree is a compilation error; security validation only runs
    // over a fully parsed unit.
    let ast = match parser::parse_unit(&unit.source) {
        Ok(ast) => ast,
        Err(diags) => return compilation_failure(&diags),
    };

    let violations = validate::validate_unit(&ast);
    if !violations.is_empty() {
        let message = format!(
            "script rejected by security validation ({} violation{}): {}",
            violations.len(),
            if violations.len() == 1 { "" } else { "s" },
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
        let detail = serde_json::to_value(&violations).ok();
        return ExecutionOutcome::failure(ErrorKind::SecurityViolation, message, detail);
    }

    stats.compile_attempted = true;
    let module = match compile::compile_unit(&ast, &unit.fingerprint) {
        Ok(module) => module,
        Err(diags) => return compilation_failure(&diags),
    };

    stats.executed = true;
    match vm::execute_entry(&module, service, &options.vm_budget()) {
        Ok((value, exec)) => {
            stats.fuel_used = exec.fuel_used;
            ExecutionOutcome::success(render_return(&value))
        }
        Err(vm::ExecError::Runtime { message, detail }) => ExecutionOutcome::failure(
            ErrorKind::RuntimeError,
            message,
            detail.map(serde_json::Value::String),
        ),
        Err(vm::ExecError::Internal(message)) => {
            ExecutionOutcome::failure(ErrorKind::InternalError, message, None)
        }
    }
}

fn compilation_failure(diags: &[Diagnostic]) -> ExecutionOutcome {
    let message = format!(
        "script failed to compile ({} diagnostic{}): {}",
        diags.len(),
        if diags.len() == 1 { "" } else { "s" },
        diags
            .iter()
            .map(Diagnostic::render)
            .collect::<Vec<_>>()
            .join("; ")
    );
    let detail = serde_json::json!({
        "schema_version": SX_DIAG_SCHEMA_VERSION,
        "diagnostics": diags,
    });
    ExecutionOutcome::failure(ErrorKind::CompilationError, message, Some(detail))
}

fn render_return(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Null => "script completed with no return value".to_string(),
        other => other.render(),
    }
}
