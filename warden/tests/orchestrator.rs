//! Integration tests for the phase walk: ordering, resumption, conflicts.

use std::sync::Arc;
use tempfile::TempDir;
use warden::config::Configuration;
use warden::orchestrator::{
    CompletionPolicy, Orchestrator, OrchestratorOptions, PhaseId, PhaseStatus, ResumePolicy,
    RunOutcome, SkipReason,
};
use warden::state::{MemoryStateStore, RunState, RunStatus, StateStore};
use warden_shared::WardenError;
use warden_test_utils::{
    RecordingRunner, sample_configuration, scripted_phase, scripted_phase_at, scripted_phases,
};

// ============================================================================
// TEST FIXTURES
// ============================================================================

struct TestContext {
    config: Configuration,
    store: Arc<MemoryStateStore>,
    runner: Arc<RecordingRunner>,
    _install_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self::with_env(&[])
    }

    fn with_env(extra: &[(&str, &str)]) -> Self {
        let install_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            config: sample_configuration(install_dir.path(), extra),
            store: Arc::new(MemoryStateStore::new()),
            runner: RecordingRunner::new(),
            _install_dir: install_dir,
        }
    }

    fn orchestrator(&self, phases: usize) -> Orchestrator {
        Orchestrator::new(
            scripted_phases(phases as u16),
            self.store.clone(),
            self.runner.clone(),
        )
        .unwrap()
    }

    fn completed_ids(&self) -> Vec<PhaseId> {
        self.store
            .current(self.config.install_id())
            .map(|state| state.completed.iter().map(|phase| phase.id).collect())
            .unwrap_or_default()
    }
}

fn ids(range: std::ops::RangeInclusive<u16>) -> Vec<PhaseId> {
    range.map(PhaseId::new).collect()
}

// ============================================================================
// ORDERING
// ============================================================================

#[tokio::test]
async fn phases_run_in_ascending_order() {
    let ctx = TestContext::new();
    let report = ctx.orchestrator(4).run(&ctx.config).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.executed(), ids(1..=4));
    assert_eq!(
        ctx.runner.invocations(),
        vec!["true phase-1", "true phase-2", "true phase-3", "true phase-4"]
    );
}

#[test]
fn out_of_order_declaration_is_rejected() {
    let ctx = TestContext::new();
    let phases = vec![scripted_phase(2), scripted_phase(1)];
    let err = Orchestrator::new(phases, ctx.store.clone(), ctx.runner.clone())
        .err()
        .unwrap();
    assert!(matches!(err, WardenError::InvalidState(_)));

    let duplicated = vec![scripted_phase(3), scripted_phase(3)];
    assert!(Orchestrator::new(duplicated, ctx.store.clone(), ctx.runner.clone()).is_err());
}

#[tokio::test]
async fn sub_phase_runs_between_its_neighbours() {
    let ctx = TestContext::new();
    let phases = vec![
        scripted_phase(2),
        scripted_phase_at(PhaseId::sub(2, 5)),
        scripted_phase(3),
    ];
    let report = Orchestrator::new(phases, ctx.store.clone(), ctx.runner.clone())
        .unwrap()
        .run(&ctx.config)
        .await
        .unwrap();

    assert_eq!(
        report.executed(),
        vec![PhaseId::new(2), PhaseId::sub(2, 5), PhaseId::new(3)]
    );
}

#[tokio::test]
async fn excluded_feature_is_skipped_and_mandatory_phases_still_run() {
    let ctx = TestContext::with_env(&[("WARDEN_EXCLUDE", "firewall")]);
    let phases = vec![
        scripted_phase(1),
        scripted_phase(2).skippable("firewall"),
        scripted_phase(3).skippable("feeds"),
        scripted_phase(4),
    ];
    let report = Orchestrator::new(phases, ctx.store.clone(), ctx.runner.clone())
        .unwrap()
        .run(&ctx.config)
        .await
        .unwrap();

    assert_eq!(
        report.executed(),
        vec![PhaseId::new(1), PhaseId::new(3), PhaseId::new(4)]
    );
    let skipped = report.phase(PhaseId::new(2)).unwrap();
    assert_eq!(skipped.status, PhaseStatus::Skipped);
    assert_eq!(
        skipped.skip_reason,
        Some(SkipReason::Excluded("firewall".to_string()))
    );
    assert_eq!(ctx.runner.count_for("phase-2"), 0);
}

// ============================================================================
// PERSISTENCE AND RESUMPTION
// ============================================================================

#[tokio::test]
async fn state_is_saved_after_every_completed_phase() {
    let ctx = TestContext::new();
    ctx.orchestrator(3).run(&ctx.config).await.unwrap();

    let history = ctx.store.history();
    let progress: Vec<usize> = history.iter().map(|state| state.completed.len()).collect();
    assert_eq!(progress, vec![1, 2, 3, 3]);
    assert_eq!(history.last().unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn failure_stops_the_walk_and_rerun_resumes_at_the_failed_phase() {
    let ctx = TestContext::new();
    ctx.runner.fail_matching("phase-4");

    let first = ctx.orchestrator(6).run(&ctx.config).await.unwrap();
    match &first.outcome {
        RunOutcome::Failed { phase, detail, .. } => {
            assert_eq!(*phase, PhaseId::new(4));
            assert!(detail.contains("simulated failure"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(ctx.runner.count_for("phase-5"), 0);
    assert_eq!(ctx.completed_ids(), ids(1..=3));
    assert_eq!(
        first.phase(PhaseId::new(6)).unwrap().status,
        PhaseStatus::Pending
    );

    let state = ctx.store.current(ctx.config.install_id()).unwrap();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.failure.as_ref().unwrap().phase, PhaseId::new(4));

    ctx.runner.clear_failures();
    ctx.runner.reset();
    let second = ctx.orchestrator(6).run(&ctx.config).await.unwrap();

    assert!(second.is_success());
    assert_eq!(second.resumed_after, Some(PhaseId::new(3)));
    assert_eq!(second.executed(), ids(4..=6));
    assert_eq!(
        ctx.runner.invocations(),
        vec!["true phase-4", "true phase-5", "true phase-6"]
    );
    for id in ids(1..=3) {
        assert_eq!(
            second.phase(id).unwrap().skip_reason,
            Some(SkipReason::AlreadyCompleted)
        );
    }
}

#[tokio::test]
async fn failed_run_converts_to_phase_error() {
    let ctx = TestContext::new();
    ctx.runner.fail_matching("phase-2");
    let err = ctx
        .orchestrator(3)
        .run(&ctx.config)
        .await
        .unwrap()
        .into_result()
        .unwrap_err();

    assert!(matches!(err, WardenError::Phase { ref phase, .. } if phase == "2"));
    assert_eq!(err.exit_code(), 4);
    let message = err.to_string();
    assert!(message.contains("simulated failure"));
    assert!(message.contains("resume at phase 2"));
}

#[tokio::test]
async fn interrupt_leaves_state_at_last_completed_phase() {
    let ctx = TestContext::new();
    ctx.runner.interrupt_matching("phase-3");

    let err = ctx.orchestrator(5).run(&ctx.config).await.unwrap_err();
    assert!(matches!(err, WardenError::Interrupted));

    let state = ctx.store.current(ctx.config.install_id()).unwrap();
    assert_eq!(ctx.completed_ids(), ids(1..=2));
    assert!(state.failure.is_none());
    assert_eq!(state.status, RunStatus::Running);

    ctx.runner.clear_interrupts();
    ctx.runner.reset();
    let resumed = ctx.orchestrator(5).run(&ctx.config).await.unwrap();
    assert_eq!(resumed.executed(), ids(3..=5));
}

#[tokio::test]
async fn completed_install_only_repeats_repeatable_phases() {
    let ctx = TestContext::new();
    let phases = || {
        vec![
            scripted_phase(1),
            scripted_phase(2),
            scripted_phase(3).repeatable(),
        ]
    };
    Orchestrator::new(phases(), ctx.store.clone(), ctx.runner.clone())
        .unwrap()
        .run(&ctx.config)
        .await
        .unwrap();
    ctx.runner.reset();

    let again = Orchestrator::new(phases(), ctx.store.clone(), ctx.runner.clone())
        .unwrap()
        .run(&ctx.config)
        .await
        .unwrap();

    assert!(again.is_success());
    assert_eq!(ctx.runner.invocations(), vec!["true phase-3"]);
    let state = ctx.store.current(ctx.config.install_id()).unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.completed.len(), 3);
}

#[tokio::test]
async fn delete_policy_removes_state_on_success() {
    let ctx = TestContext::new();
    ctx.orchestrator(2)
        .with_options(OrchestratorOptions {
            completion: CompletionPolicy::Delete,
            ..Default::default()
        })
        .run(&ctx.config)
        .await
        .unwrap();

    assert!(ctx.store.current(ctx.config.install_id()).is_none());
}

// ============================================================================
// CONFLICTS
// ============================================================================

#[tokio::test]
async fn changed_configuration_is_a_conflict_not_a_silent_resume() {
    let ctx = TestContext::new();
    ctx.runner.fail_matching("phase-2");
    ctx.orchestrator(3).run(&ctx.config).await.unwrap();
    ctx.runner.clear_failures();
    ctx.runner.reset();

    let changed = sample_configuration(
        ctx.config.install_dir(),
        &[("WARDEN_DOMAIN", "other.example.org")],
    );
    let err = ctx.orchestrator(3).run(&changed).await.unwrap_err();

    assert!(matches!(err, WardenError::StateConflict(ref msg) if msg.contains("--fresh")));
    assert!(ctx.runner.invocations().is_empty());
    assert_eq!(ctx.completed_ids(), ids(1..=1));
}

#[tokio::test]
async fn fresh_policy_discards_prior_state() {
    let ctx = TestContext::new();
    ctx.runner.fail_matching("phase-2");
    ctx.orchestrator(3).run(&ctx.config).await.unwrap();
    ctx.runner.clear_failures();
    ctx.runner.reset();

    let changed = sample_configuration(
        ctx.config.install_dir(),
        &[("WARDEN_DOMAIN", "other.example.org")],
    );
    let report = ctx
        .orchestrator(3)
        .with_options(OrchestratorOptions {
            resume: ResumePolicy::Fresh,
            ..Default::default()
        })
        .run(&changed)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.executed(), ids(1..=3));
    assert_eq!(ctx.store.archived(), vec![ctx.config.install_id().to_string()]);
}

#[tokio::test]
async fn require_policy_without_state_is_a_conflict() {
    let ctx = TestContext::new();
    let err = ctx
        .orchestrator(2)
        .with_options(OrchestratorOptions {
            resume: ResumePolicy::Require,
            ..Default::default()
        })
        .run(&ctx.config)
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::StateConflict(_)));
    assert!(ctx.runner.invocations().is_empty());
}

#[tokio::test]
async fn corrupt_state_is_archived_and_treated_as_absent() {
    let ctx = TestContext::new();
    ctx.store.corrupt(ctx.config.install_id());

    let report = ctx.orchestrator(2).run(&ctx.config).await.unwrap();

    assert_eq!(report.resumed_after, None);
    assert_eq!(report.executed(), ids(1..=2));
    assert_eq!(ctx.store.archived().len(), 1);
}

// ============================================================================
// STALE OWNERSHIP
// ============================================================================

fn running_state(ctx: &TestContext, owner_pid: u32) -> RunState {
    let mut state = RunState::new(ctx.config.install_id(), ctx.config.fingerprint(), owner_pid);
    state.record_completion(PhaseId::new(1), "Scripted 1");
    state
}

#[tokio::test]
async fn live_owner_blocks_a_second_run() {
    let ctx = TestContext::new();
    // pid 1 always exists.
    ctx.store.save(&running_state(&ctx, 1)).unwrap();

    let err = ctx.orchestrator(3).run(&ctx.config).await.unwrap_err();
    assert!(matches!(err, WardenError::InstallInProgress(_)));
    assert!(ctx.runner.invocations().is_empty());
}

#[tokio::test]
async fn dead_owner_is_resumed() {
    let ctx = TestContext::new();
    ctx.store
        .save(&running_state(&ctx, i32::MAX as u32))
        .unwrap();

    let report = ctx.orchestrator(3).run(&ctx.config).await.unwrap();

    assert_eq!(report.resumed_after, Some(PhaseId::new(1)));
    assert_eq!(report.executed(), ids(2..=3));
    let state = ctx.store.current(ctx.config.install_id()).unwrap();
    assert_eq!(state.owner_pid, std::process::id());
}
