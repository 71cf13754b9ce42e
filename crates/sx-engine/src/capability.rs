//! The borrowed capability handle.
//!
//! The engine receives an already-authenticated handle per call and borrows
//! it for exactly one invocation. It never constructs, stores, clones, or
//! re-authenticates one: the handle a caller supplies is the only network
//! identity a script can ever act under. Thread-safety of concurrent use of
//! the same handle belongs to the handle provider.

use crate::value::ScriptValue;

/// A failed capability operation. The message is preserved verbatim into the
/// runtime-error outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityError {
    pub message: String,
}

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CapabilityError {}

/// Object-safe surface of the pre-authenticated platform connection.
///
/// Scripts reach it only through method calls on the entry parameter
/// (`service.op(args)`); each such call dispatches here.
pub trait CapabilityHandle {
    fn invoke(
        &self,
        operation: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, CapabilityError>;

    /// Short description for reports and the guide.
    fn describe(&self) -> String {
        "capability handle".to_string()
    }
}
