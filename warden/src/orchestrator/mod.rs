//! The phase state machine.
//!
//! A run is a deterministic walk over the declared phase list:
//!
//! 1. Load the Run State for this install. A state recorded under another
//!    configuration fingerprint is a conflict, never a silent resume.
//! 2. For each phase in ascending id order: skip it when its id is at or
//!    below the highest completed id (unless repeatable) or when its feature
//!    is excluded; otherwise run it.
//! 3. Persist the Run State after every completed phase, before the next
//!    one starts.
//! 4. On failure, persist the failure and stop. Nothing is rolled back.
//! 5. After the last phase, mark the state completed or delete it.
//!
//! An interrupt leaves the Run State exactly as it was after the last
//! completed phase.

mod phase;
mod report;

pub use phase::{
    Phase, PhaseContext, PhaseDescriptor, PhaseError, PhaseId, PhaseStatus, SkipReason,
};
pub use report::{PhaseReport, RunOutcome, RunReport};

use crate::config::Configuration;
use crate::runner::CommandRunner;
use crate::state::{RunState, RunStatus, StateStore};
use crate::util::process::{current_pid, is_process_alive};
use std::sync::Arc;
use std::time::Instant;
use warden_shared::{WardenError, WardenResult};

/// How an existing Run State is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Resume a matching state, start fresh when there is none.
    #[default]
    Auto,
    /// A matching state must exist.
    Require,
    /// Archive any existing state and start from the first phase.
    Fresh,
}

/// What happens to the Run State after every phase succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Keep it with status `completed`; later runs only repeat repeatable phases.
    #[default]
    MarkTerminal,
    Delete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub resume: ResumePolicy,
    pub completion: CompletionPolicy,
}

pub struct Orchestrator {
    phases: Vec<PhaseDescriptor>,
    store: Arc<dyn StateStore>,
    runner: Arc<dyn CommandRunner>,
    options: OrchestratorOptions,
    pid: u32,
}

impl Orchestrator {
    /// Fails when phase ids are not strictly increasing in declared order.
    pub fn new(
        phases: Vec<PhaseDescriptor>,
        store: Arc<dyn StateStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> WardenResult<Self> {
        for pair in phases.windows(2) {
            if pair[0].id() >= pair[1].id() {
                return Err(WardenError::InvalidState(format!(
                    "phase {} ({}) is declared after phase {} ({})",
                    pair[1].id(),
                    pair[1].name(),
                    pair[0].id(),
                    pair[0].name()
                )));
            }
        }
        Ok(Self {
            phases,
            store,
            runner,
            options: OrchestratorOptions::default(),
            pid: current_pid(),
        })
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Pid recorded as the owner of the Run State.
    pub fn with_owner_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn phases(&self) -> &[PhaseDescriptor] {
        &self.phases
    }

    /// Walk the phases for `config`.
    ///
    /// A phase failure is reported through [`RunReport::outcome`]; `Err` is
    /// reserved for conflicts, storage errors and interrupts.
    pub async fn run(&self, config: &Configuration) -> WardenResult<RunReport> {
        let install_id = config.install_id();
        let fingerprint = config.fingerprint();

        let prior = self.load_prior(install_id, fingerprint)?;
        let resumed_after = prior.as_ref().and_then(RunState::highest_completed);
        let mut state = match prior {
            Some(mut state) => {
                state.claim(self.pid);
                self.store.save(&state)?;
                state
            }
            None => RunState::new(install_id, fingerprint, self.pid),
        };

        tracing::info!(
            install_id,
            resumed_after = ?resumed_after.map(|id| id.to_string()),
            phases = self.phases.len(),
            "Starting run"
        );

        let mut reports = Vec::with_capacity(self.phases.len());
        for (index, descriptor) in self.phases.iter().enumerate() {
            if let Some(reason) = self.skip_reason(descriptor, resumed_after, config) {
                let mut status = PhaseStatus::Pending;
                status.transition(PhaseStatus::Skipped)?;
                tracing::info!(
                    phase = %descriptor.id(),
                    name = descriptor.name(),
                    reason = %reason,
                    "Skipping phase"
                );
                let mut report = PhaseReport::new(descriptor.id(), descriptor.name(), status);
                report.skip_reason = Some(reason);
                reports.push(report);
                continue;
            }

            let report = self.execute(descriptor, config).await?;
            match report.status {
                PhaseStatus::Completed => {
                    state.record_completion(descriptor.id(), descriptor.name());
                    self.store.save(&state)?;
                    reports.push(report);
                }
                _ => {
                    let detail = report.error.clone().unwrap_or_default();
                    state.record_failure(descriptor.id(), descriptor.name(), &detail);
                    self.store.save(&state)?;
                    reports.push(report);

                    for pending in &self.phases[index + 1..] {
                        reports.push(PhaseReport::new(
                            pending.id(),
                            pending.name(),
                            PhaseStatus::Pending,
                        ));
                    }
                    return Ok(RunReport {
                        install_id: install_id.to_string(),
                        fingerprint: fingerprint.to_string(),
                        resumed_after,
                        phases: reports,
                        outcome: RunOutcome::Failed {
                            phase: descriptor.id(),
                            name: descriptor.name().to_string(),
                            detail,
                        },
                    });
                }
            }
        }

        match self.options.completion {
            CompletionPolicy::MarkTerminal => {
                state.mark_completed();
                self.store.save(&state)?;
            }
            CompletionPolicy::Delete => {
                self.store.remove(install_id)?;
            }
        }
        tracing::info!(install_id, "All phases completed");

        Ok(RunReport {
            install_id: install_id.to_string(),
            fingerprint: fingerprint.to_string(),
            resumed_after,
            phases: reports,
            outcome: RunOutcome::Completed,
        })
    }

    fn load_prior(&self, install_id: &str, fingerprint: &str) -> WardenResult<Option<RunState>> {
        if self.options.resume == ResumePolicy::Fresh && self.store.discard(install_id)? {
            tracing::info!(install_id, "Discarded prior run state, starting fresh");
        }

        let loaded = match self.store.load(install_id) {
            Ok(state) => state,
            Err(WardenError::StateCorruption(detail)) => {
                tracing::warn!(install_id, "Run state unreadable, treating as absent: {}", detail);
                self.store.discard(install_id)?;
                None
            }
            Err(e) => return Err(e),
        };

        let Some(state) = loaded else {
            if self.options.resume == ResumePolicy::Require {
                return Err(WardenError::StateConflict(format!(
                    "no run state to resume for install '{}'",
                    install_id
                )));
            }
            return Ok(None);
        };

        if !state.matches(fingerprint) {
            return Err(WardenError::StateConflict(format!(
                "run state for install '{}' was recorded with a different configuration \
                 (fingerprint {} vs {}); restore the original configuration to resume, \
                 or run `warden reset` / pass --fresh to start over",
                install_id,
                short(&state.fingerprint),
                short(fingerprint)
            )));
        }

        if state.status == RunStatus::Running && state.owner_pid != self.pid {
            if is_process_alive(state.owner_pid) {
                return Err(WardenError::InstallInProgress(format!(
                    "install '{}' is being run by pid {}",
                    install_id, state.owner_pid
                )));
            }
            tracing::warn!(
                install_id,
                owner_pid = state.owner_pid,
                "Previous run ended without finishing; resuming"
            );
        }

        Ok(Some(state))
    }

    fn skip_reason(
        &self,
        descriptor: &PhaseDescriptor,
        resumed_after: Option<PhaseId>,
        config: &Configuration,
    ) -> Option<SkipReason> {
        let done = resumed_after.is_some_and(|highest| descriptor.id() <= highest);
        if done && !descriptor.is_repeatable() {
            return Some(SkipReason::AlreadyCompleted);
        }
        match descriptor.feature() {
            Some(feature) if !descriptor.is_mandatory() && config.is_excluded(feature) => {
                Some(SkipReason::Excluded(feature.to_string()))
            }
            _ => None,
        }
    }

    async fn execute(
        &self,
        descriptor: &PhaseDescriptor,
        config: &Configuration,
    ) -> WardenResult<PhaseReport> {
        let mut status = PhaseStatus::Pending;
        status.transition(PhaseStatus::Running)?;
        tracing::info!(phase = %descriptor.id(), name = descriptor.name(), "Starting phase");

        let started = Instant::now();
        let ctx = PhaseContext::new(config, self.runner.as_ref());
        let outcome = descriptor.body().execute(&ctx).await;
        let (commands, notes) = ctx.into_parts();
        let duration = started.elapsed();

        let mut report = PhaseReport::new(descriptor.id(), descriptor.name(), status);
        report.duration = Some(duration);
        report.commands = commands;
        report.notes = notes;

        match outcome {
            Ok(()) => {
                report.status.transition(PhaseStatus::Completed)?;
                tracing::info!(
                    phase = %descriptor.id(),
                    name = descriptor.name(),
                    duration_ms = duration.as_millis() as u64,
                    "Phase completed"
                );
            }
            Err(PhaseError::Interrupted) => {
                tracing::warn!(
                    phase = %descriptor.id(),
                    name = descriptor.name(),
                    "Interrupted; run state left at the last completed phase"
                );
                return Err(WardenError::Interrupted);
            }
            Err(PhaseError::Failed(detail)) => {
                report.status.transition(PhaseStatus::Failed)?;
                tracing::error!(
                    phase = %descriptor.id(),
                    name = descriptor.name(),
                    "Phase failed: {}",
                    detail
                );
                report.error = Some(detail);
            }
        }
        Ok(report)
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
