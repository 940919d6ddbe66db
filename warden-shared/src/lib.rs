//! Warden Shared - types used by both the orchestrator library and the CLI.
//!
//! This crate holds the error taxonomy, the report types that errors carry,
//! and the constants (exit codes, environment variables, file names) that
//! both sides must agree on.

pub mod constants;
pub mod errors;

pub use errors::{PreflightFailure, ValidationReport, Violation, WardenError, WardenResult};
