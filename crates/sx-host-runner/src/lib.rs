//! Deterministic host for the script engine.
//!
//! Binds the entry parameter to a fixture-backed capability handle so a
//! script run is fully reproducible from the script file and the fixture
//! file. The handle is built per run, lent to the engine for that one call,
//! and dropped.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use sx_contracts::{SX_FIXTURE_SCHEMA_VERSION, SX_HOST_RUNNER_REPORT_SCHEMA_VERSION};
use sx_engine::{
    CapabilityError, CapabilityHandle, EngineOptions, ExecutionOutcome, PipelineStats,
    ScriptValue,
};

/// One canned reply. Exactly one of `ok` / `error` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureReply {
    #[serde(default)]
    pub ok: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureFile {
    schema_version: String,
    #[serde(default)]
    operations: BTreeMap<String, FixtureReply>,
}

/// Capability handle answering from canned per-operation replies.
///
/// Operations missing from the fixture fail, so a script run can never reach
/// anything the fixture author did not spell out.
#[derive(Debug, Default)]
pub struct FixtureCapabilityHandle {
    operations: BTreeMap<String, FixtureReply>,
    calls: RefCell<Vec<String>>,
}

impl FixtureCapabilityHandle {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(text).context("parse fixture")?;
        if file.schema_version != SX_FIXTURE_SCHEMA_VERSION {
            bail!(
                "unsupported fixture schema_version {:?}, expected {:?}",
                file.schema_version,
                SX_FIXTURE_SCHEMA_VERSION
            );
        }
        for (op, reply) in &file.operations {
            if reply.ok.is_some() == reply.error.is_some() {
                bail!("fixture operation {op:?} must set exactly one of \"ok\" or \"error\"");
            }
        }
        Ok(Self {
            operations: file.operations,
            calls: RefCell::new(Vec::new()),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read fixture: {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CapabilityHandle for FixtureCapabilityHandle {
    fn invoke(
        &self,
        operation: &str,
        _args: &[ScriptValue],
    ) -> Result<ScriptValue, CapabilityError> {
        self.calls.borrow_mut().push(operation.to_string());
        match self.operations.get(operation) {
            Some(FixtureReply { ok: Some(v), .. }) => Ok(ScriptValue::from_json(v)),
            Some(FixtureReply {
                error: Some(message),
                ..
            }) => Err(CapabilityError::new(message.clone())),
            _ => Err(CapabilityError::new(format!(
                "no fixture reply for operation '{operation}'"
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("fixture handle ({} operations)", self.operations.len())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub schema_version: String,
    pub lang_id: String,
    pub unit_fingerprint: String,
    pub duration_ms: u64,
    pub capability: String,
    pub capability_calls: Vec<String>,
    pub outcome: ExecutionOutcome,
    pub stats: PipelineStats,
}

/// Runs one script file against an optional fixture and reports the outcome.
pub fn run_script_file(
    script: &Path,
    fixture: Option<&Path>,
    options: &EngineOptions,
) -> Result<HostReport> {
    let body = std::fs::read_to_string(script)
        .with_context(|| format!("read script: {}", script.display()))?;
    let handle = match fixture {
        Some(path) => FixtureCapabilityHandle::from_file(path)?,
        None => FixtureCapabilityHandle::default(),
    };
    let started = Instant::now();
    let (outcome, stats) = sx_engine::run_script_with_stats(&body, &handle, options);
    Ok(HostReport {
        schema_version: SX_HOST_RUNNER_REPORT_SCHEMA_VERSION.to_string(),
        lang_id: sx_engine::language::LANG_ID.to_string(),
        unit_fingerprint: stats.unit_fingerprint.clone(),
        duration_ms: started.elapsed().as_millis() as u64,
        capability: handle.describe(),
        capability_calls: handle.calls(),
        outcome,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_rejects_ambiguous_replies() {
        let text = format!(
            r#"{{"schema_version":"{SX_FIXTURE_SCHEMA_VERSION}","operations":{{"op":{{}}}}}}"#
        );
        assert!(FixtureCapabilityHandle::from_json_str(&text).is_err());
    }

    #[test]
    fn fixture_rejects_wrong_schema_version() {
        let text = r#"{"schema_version":"sx.fixture@9.9.9","operations":{}}"#;
        assert!(FixtureCapabilityHandle::from_json_str(text).is_err());
    }

    #[test]
    fn unknown_operation_fails_the_call() {
        let text = format!(r#"{{"schema_version":"{SX_FIXTURE_SCHEMA_VERSION}","operations":{{}}}}"#);
        let handle = FixtureCapabilityHandle::from_json_str(&text).unwrap();
        let err = handle.invoke("who_am_i", &[]).unwrap_err();
        assert!(err.message.contains("who_am_i"));
    }
}
