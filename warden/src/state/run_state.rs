use crate::orchestrator::PhaseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use warden_shared::constants::STATE_SCHEMA_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// An orchestrator is (or was, until it died) walking the phases.
    Running,
    Failed,
    Completed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPhase {
    pub id: PhaseId,
    pub name: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub phase: PhaseId,
    pub name: String,
    pub detail: String,
    pub failed_at: DateTime<Utc>,
}

/// Persisted progress of one install.
///
/// Only valid for resume while `fingerprint` matches the current
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub schema_version: u32,
    pub install_id: String,
    pub fingerprint: String,
    pub status: RunStatus,
    /// In completion order, which is ascending id order.
    pub completed: Vec<CompletedPhase>,
    pub failure: Option<PhaseFailure>,
    pub owner_pid: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(install_id: impl Into<String>, fingerprint: impl Into<String>, owner_pid: u32) -> Self {
        let now = Utc::now();
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            install_id: install_id.into(),
            fingerprint: fingerprint.into(),
            status: RunStatus::Running,
            completed: Vec::new(),
            failure: None,
            owner_pid,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn matches(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }

    pub fn highest_completed(&self) -> Option<PhaseId> {
        self.completed.iter().map(|phase| phase.id).max()
    }

    pub fn is_completed(&self, id: PhaseId) -> bool {
        self.completed.iter().any(|phase| phase.id == id)
    }

    /// Take ownership for a new walk by `pid`.
    pub fn claim(&mut self, pid: u32) {
        self.owner_pid = pid;
        self.status = RunStatus::Running;
        self.updated_at = Utc::now();
    }

    /// Record `id` as done. A repeat completion refreshes its timestamp.
    pub fn record_completion(&mut self, id: PhaseId, name: &str) {
        let now = Utc::now();
        match self.completed.iter_mut().find(|phase| phase.id == id) {
            Some(existing) => existing.completed_at = now,
            None => self.completed.push(CompletedPhase {
                id,
                name: name.to_string(),
                completed_at: now,
            }),
        }
        if self.failure.as_ref().is_some_and(|f| f.phase == id) {
            self.failure = None;
        }
        self.updated_at = now;
    }

    pub fn record_failure(&mut self, id: PhaseId, name: &str, detail: &str) {
        let now = Utc::now();
        self.status = RunStatus::Failed;
        self.failure = Some(PhaseFailure {
            phase: id,
            name: name.to_string(),
            detail: detail.to_string(),
            failed_at: now,
        });
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.failure = None;
        self.updated_at = Utc::now();
    }
}
