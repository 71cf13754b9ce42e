//! The flat, serializable result of one pipeline invocation.

use serde::{Deserialize, Serialize};

use sx_contracts::SX_OUTCOME_SCHEMA_VERSION;

/// Which stage rejected the script. Exactly these four kinds; downstream
/// consumers branch on them, so new failure modes must map into one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Static validation found denylist breaches. The compiler was never
    /// invoked.
    SecurityViolation,
    /// Parsing or compilation produced error diagnostics.
    CompilationError,
    /// The script ran and misbehaved: trap, thrown value, failed capability
    /// operation, or an exhausted execution budget.
    RuntimeError,
    /// The engine itself failed; never the script's fault.
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SecurityViolation => "security_violation",
            ErrorKind::CompilationError => "compilation_error",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// Flat outcome shape: a success bit, a human-readable message, and optional
/// structured detail. Single-level by design so callers in any language can
/// consume it without walking a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub schema_version: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub message: String,
    /// Structured supplement: violation list, diagnostic list, or a script
    /// backtrace, depending on `error_kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            schema_version: SX_OUTCOME_SCHEMA_VERSION.to_string(),
            success: true,
            error_kind: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn failure(
        kind: ErrorKind,
        message: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Self {
        Self {
            schema_version: SX_OUTCOME_SCHEMA_VERSION.to_string(),
            success: false,
            error_kind: Some(kind),
            message: message.into(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_serializes_without_error_fields() {
        let json = serde_json::to_value(ExecutionOutcome::success("done")).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["success"], true);
        assert!(!obj.contains_key("error_kind"));
        assert!(!obj.contains_key("detail"));
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_value(ErrorKind::SecurityViolation).unwrap();
        assert_eq!(json, "security_violation");
        assert_eq!(ErrorKind::RuntimeError.as_str(), "runtime_error");
    }

    #[test]
    fn outcome_round_trips() {
        let out = ExecutionOutcome::failure(
            ErrorKind::CompilationError,
            "2 diagnostics",
            Some(serde_json::json!(["a", "b"])),
        );
        let back: ExecutionOutcome =
            serde_json::from_str(&serde_json::to_string(&out).unwrap()).unwrap();
        assert_eq!(back, out);
    }
}
