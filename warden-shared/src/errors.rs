//! Error taxonomy for the orchestrator.
//!
//! Errors are categorized by what the operator can do about them:
//! - [`WardenError::Configuration`] / [`WardenError::Preflight`]: nothing was
//!   mutated, fix the input or the host and run again
//! - [`WardenError::Privilege`]: the service identity could not be established
//! - [`WardenError::Phase`]: a phase failed, re-running resumes at that phase
//! - [`WardenError::StateCorruption`]: the persisted Run State is unreadable

use crate::constants::exit_codes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Top-Level Error
// ============================================================================

#[derive(Debug, Error)]
pub enum WardenError {
    /// One or more configuration fields were rejected (all of them listed).
    #[error("configuration rejected:\n{0}")]
    Configuration(ValidationReport),

    /// Host is unsuitable; nothing has been mutated yet.
    #[error("pre-flight checks failed:\n{0}")]
    Preflight(PreflightFailure),

    /// Cannot establish or switch to the service identity.
    #[error("privilege: {0}")]
    Privilege(String),

    /// A phase's external step failed or returned an unexpected result.
    ///
    /// Completed phases stay recorded, so the same invocation picks up here.
    #[error(
        "phase {phase} ({name}) failed: {detail}\n\
         Re-run the same command with the same configuration to resume at phase {phase}."
    )]
    Phase {
        phase: String,
        name: String,
        detail: String,
    },

    /// Persisted Run State cannot be parsed or fingerprinted.
    #[error("run state corrupt: {0}")]
    StateCorruption(String),

    /// Persisted Run State does not apply to this invocation.
    #[error("run state conflict: {0}")]
    StateConflict(String),

    /// Another orchestrator owns this host's Run State.
    #[error("install in progress: {0}")]
    InstallInProgress(String),

    /// Operator interrupt (Ctrl-C) reached a running command.
    #[error("interrupted by operator")]
    Interrupted,

    #[error("storage: {0}")]
    Storage(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type WardenResult<T> = Result<T, WardenError>;

impl WardenError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::Configuration(_) => exit_codes::CONFIGURATION,
            WardenError::Preflight(_) => exit_codes::PREFLIGHT,
            WardenError::Privilege(_) => exit_codes::PRIVILEGE,
            WardenError::Phase { .. } => exit_codes::PHASE_FAILED,
            WardenError::StateConflict(_) | WardenError::InstallInProgress(_) => {
                exit_codes::STATE_CONFLICT
            }
            WardenError::Interrupted => exit_codes::INTERRUPTED,
            WardenError::StateCorruption(_)
            | WardenError::Storage(_)
            | WardenError::InvalidState(_)
            | WardenError::Internal(_) => exit_codes::INTERNAL,
        }
    }

    /// Whether this error happened before anything on the host was mutated.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            WardenError::Configuration(_) | WardenError::Preflight(_) | WardenError::Privilege(_)
        )
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Storage(err.to_string())
    }
}

// ============================================================================
// Configuration Violations
// ============================================================================

/// A single rejected configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Whether any violation names `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// `Ok(())` when empty, otherwise a [`WardenError::Configuration`].
    pub fn into_result(self) -> WardenResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(WardenError::Configuration(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", violation)?;
        }
        Ok(())
    }
}

// ============================================================================
// Pre-flight Failure
// ============================================================================

/// Hard-failed pre-flight checks, each rendered as `check: detail`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightFailure {
    pub blockers: Vec<String>,
}

impl fmt::Display for PreflightFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, blocker) in self.blockers.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", blocker)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_never_started_from_partial() {
        let config = WardenError::Configuration(ValidationReport::new());
        let preflight = WardenError::Preflight(PreflightFailure::default());
        let phase = WardenError::Phase {
            phase: "4".into(),
            name: "Certificates".into(),
            detail: "exit 1".into(),
        };

        assert_eq!(config.exit_code(), 2);
        assert_eq!(preflight.exit_code(), 3);
        assert_eq!(phase.exit_code(), 4);
        assert!(config.is_pre_mutation());
        assert!(!phase.is_pre_mutation());
    }

    #[test]
    fn test_validation_report_lists_every_violation() {
        let mut report = ValidationReport::new();
        report.push(Violation::new("admin_password", "too short"));
        report.push(Violation::new("domain", "malformed"));

        let err = report.clone().into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("admin_password: too short"));
        assert!(text.contains("domain: malformed"));
        assert!(report.mentions("domain"));
        assert!(!report.mentions("admin_email"));
    }

    #[test]
    fn test_phase_error_explains_how_to_resume() {
        let err = WardenError::Phase {
            phase: "4".into(),
            name: "Certificates".into(),
            detail: "`openssl req` exited with status 1".into(),
        };
        let text = err.to_string();

        assert!(text.starts_with("phase 4 (Certificates) failed: `openssl req`"));
        assert!(text.contains("same configuration to resume at phase 4"));
    }

    #[test]
    fn test_empty_report_is_ok() {
        assert!(ValidationReport::new().into_result().is_ok());
    }

    #[test]
    fn test_interrupted_exit_code() {
        assert_eq!(WardenError::Interrupted.exit_code(), 130);
        assert_eq!(
            WardenError::InstallInProgress("pid 42".into()).exit_code(),
            6
        );
    }
}
