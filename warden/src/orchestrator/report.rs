use super::phase::{PhaseId, PhaseStatus, SkipReason};
use crate::runner::CommandResult;
use std::time::Duration;
use warden_shared::{WardenError, WardenResult};

/// What happened to one phase in a run.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub id: PhaseId,
    pub name: String,
    pub status: PhaseStatus,
    pub skip_reason: Option<SkipReason>,
    pub duration: Option<Duration>,
    pub commands: Vec<CommandResult>,
    pub notes: Vec<String>,
    pub error: Option<String>,
}

impl PhaseReport {
    pub(crate) fn new(id: PhaseId, name: &str, status: PhaseStatus) -> Self {
        Self {
            id,
            name: name.to_string(),
            status,
            skip_reason: None,
            duration: None,
            commands: Vec::new(),
            notes: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed {
        phase: PhaseId,
        name: String,
        detail: String,
    },
}

/// Result of one walk over the phase list.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub install_id: String,
    pub fingerprint: String,
    /// Highest phase completed before this run started.
    pub resumed_after: Option<PhaseId>,
    pub phases: Vec<PhaseReport>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn phase(&self, id: PhaseId) -> Option<&PhaseReport> {
        self.phases.iter().find(|phase| phase.id == id)
    }

    pub fn with_status(&self, status: PhaseStatus) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(move |phase| phase.status == status)
    }

    /// Ids of the phases whose bodies ran, in execution order.
    pub fn executed(&self) -> Vec<PhaseId> {
        self.phases
            .iter()
            .filter(|phase| matches!(phase.status, PhaseStatus::Completed | PhaseStatus::Failed))
            .map(|phase| phase.id)
            .collect()
    }

    /// `Err(WardenError::Phase)` for a failed run.
    pub fn into_result(self) -> WardenResult<RunReport> {
        match &self.outcome {
            RunOutcome::Completed => Ok(self),
            RunOutcome::Failed {
                phase,
                name,
                detail,
            } => Err(WardenError::Phase {
                phase: phase.to_string(),
                name: name.clone(),
                detail: detail.clone(),
            }),
        }
    }
}
