//! Phase descriptors, identifiers and the per-phase execution context.

use crate::config::Configuration;
use crate::runner::{CommandResult, CommandRunner, CommandSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use warden_shared::{WardenError, WardenResult};

/// Ordered phase identifier: `10`, or `10.6` for a sub-phase after 10.
///
/// The part after the dot is a sub-phase number, not a decimal fraction:
/// `10.10` sorts after `10.6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId {
    pub major: u16,
    pub minor: u16,
}

impl PhaseId {
    pub const fn new(major: u16) -> Self {
        Self { major, minor: 0 }
    }

    pub const fn sub(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{}", self.major)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid phase id '{}'", s);
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (s, None),
        };
        let major = major.parse().map_err(|_| invalid())?;
        let minor = match minor {
            Some(minor) => minor.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl Serialize for PhaseId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PhaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a phase within one run.
///
/// ```text
/// Pending → Running → Completed
///                   → Failed
/// Pending → Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped
        )
    }

    pub fn can_transition_to(&self, target: PhaseStatus) -> bool {
        use PhaseStatus::*;
        matches!(
            (self, target),
            (Pending, Running) | (Pending, Skipped) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Move to `target`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, target: PhaseStatus) -> WardenResult<()> {
        if !self.can_transition_to(target) {
            return Err(WardenError::InvalidState(format!(
                "phase cannot move from {} to {}",
                self, target
            )));
        }
        *self = target;
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a phase did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "feature", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyCompleted,
    Excluded(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyCompleted => f.write_str("completed in an earlier run"),
            SkipReason::Excluded(feature) => write!(f, "feature '{}' excluded", feature),
        }
    }
}

#[derive(Debug, Error)]
pub enum PhaseError {
    /// Operator interrupt; the phase must not be recorded at all.
    #[error("interrupted")]
    Interrupted,

    #[error("{0}")]
    Failed(String),
}

impl From<WardenError> for PhaseError {
    fn from(err: WardenError) -> Self {
        match err {
            WardenError::Interrupted => PhaseError::Interrupted,
            other => PhaseError::Failed(other.to_string()),
        }
    }
}

/// Executable body of a phase.
///
/// Success is decided from exit statuses and explicit checks the body
/// performs, never from the text a command printed.
#[async_trait]
pub trait Phase: Send + Sync {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError>;
}

/// What a phase body gets: the configuration and a recording runner handle.
pub struct PhaseContext<'a> {
    config: &'a Configuration,
    runner: &'a dyn CommandRunner,
    results: Mutex<Vec<CommandResult>>,
    notes: Mutex<Vec<String>>,
}

impl<'a> PhaseContext<'a> {
    pub fn new(config: &'a Configuration, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            results: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Configuration {
        self.config
    }

    /// Run one command and record its result.
    ///
    /// A fatal outcome becomes [`PhaseError::Failed`]; a recoverable one is
    /// returned for the body to inspect.
    pub async fn run(&self, spec: CommandSpec) -> Result<CommandResult, PhaseError> {
        let result = self.runner.run(&spec).await?;
        self.results.lock().push(result.clone());

        match &result.outcome {
            outcome if outcome.is_fatal() => Err(PhaseError::Failed(
                outcome.detail().unwrap_or("command failed").to_string(),
            )),
            outcome => {
                if let Some(detail) = outcome.detail() {
                    tracing::debug!(command = %result.command, "Tolerated failure: {}", detail);
                }
                Ok(result)
            }
        }
    }

    /// Attach a diagnostic line to the phase report.
    pub fn note(&self, message: impl Into<String>) {
        self.notes.lock().push(message.into());
    }

    pub fn into_parts(self) -> (Vec<CommandResult>, Vec<String>) {
        (self.results.into_inner(), self.notes.into_inner())
    }
}

/// One entry of the ordered phase list.
#[derive(Clone)]
pub struct PhaseDescriptor {
    id: PhaseId,
    name: String,
    mandatory: bool,
    repeatable: bool,
    feature: Option<String>,
    body: Arc<dyn Phase>,
}

impl PhaseDescriptor {
    /// A mandatory, run-once phase.
    pub fn new(id: PhaseId, name: impl Into<String>, body: Arc<dyn Phase>) -> Self {
        Self {
            id,
            name: name.into(),
            mandatory: true,
            repeatable: false,
            feature: None,
            body,
        }
    }

    /// Skipped when `feature` is in the configuration's exclusion set.
    pub fn skippable(mut self, feature: impl Into<String>) -> Self {
        self.mandatory = false;
        self.feature = Some(feature.into());
        self
    }

    /// Safe to run again on every invocation, even after completion.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn id(&self) -> PhaseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    pub fn body(&self) -> &Arc<dyn Phase> {
        &self.body
    }
}

impl fmt::Debug for PhaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mandatory", &self.mandatory)
            .field("repeatable", &self.repeatable)
            .field("feature", &self.feature)
            .finish()
    }
}
