//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings
//! that appear in machine-readable I/O (execution outcomes, diagnostics, host
//! runner reports, fixture files).

pub const SX_OUTCOME_SCHEMA_VERSION: &str = "sx.outcome@0.1.0";
pub const SX_DIAG_SCHEMA_VERSION: &str = "sx.diag@0.1.0";
pub const SX_HOST_RUNNER_REPORT_SCHEMA_VERSION: &str = "sx-host-runner.report@0.1.0";
pub const SX_FIXTURE_SCHEMA_VERSION: &str = "sx.fixture@0.1.0";
