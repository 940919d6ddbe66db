//! Interrupting a real child process mid-phase, with state on disk.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use warden::InstallLayout;
use warden::orchestrator::{Orchestrator, PhaseDescriptor, PhaseId};
use warden::phases::CommandPhase;
use warden::runner::{CommandSpec, SystemRunner};
use warden::state::{RunStatus, StateStore};
use warden_shared::WardenError;
use warden_test_utils::sample_configuration;

fn shell_phase(n: u16, script: &'static str) -> PhaseDescriptor {
    PhaseDescriptor::new(
        PhaseId::new(n),
        format!("Shell {}", n),
        Arc::new(CommandPhase::new(move |_| {
            vec![CommandSpec::new("sh").args(["-c", script])]
        })),
    )
}

#[tokio::test]
async fn interrupt_during_phase_keeps_previous_progress_on_disk() {
    let home = TempDir::new().unwrap();
    let install = TempDir::new().unwrap();
    let layout = InstallLayout::new(home.path());
    layout.prepare().unwrap();
    let store = Arc::new(layout.state_store());
    let config = sample_configuration(install.path(), &[]);

    let cancel = CancellationToken::new();
    let runner = Arc::new(
        SystemRunner::new(cancel.clone()).with_kill_grace(Duration::from_millis(500)),
    );
    let phases = vec![
        shell_phase(1, "true"),
        shell_phase(2, "sleep 30"),
        shell_phase(3, "true"),
    ];

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = Orchestrator::new(phases, store.clone(), runner)
        .unwrap()
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert!(started.elapsed() < Duration::from_secs(10));

    let state = store.load(config.install_id()).unwrap().unwrap();
    let completed: Vec<PhaseId> = state.completed.iter().map(|p| p.id).collect();
    assert_eq!(completed, vec![PhaseId::new(1)]);
    assert_eq!(state.status, RunStatus::Running);
    assert!(state.failure.is_none());
}

#[tokio::test]
async fn failing_command_is_recorded_with_its_output() {
    let home = TempDir::new().unwrap();
    let install = TempDir::new().unwrap();
    let layout = InstallLayout::new(home.path());
    layout.prepare().unwrap();
    let store = Arc::new(layout.state_store());
    let config = sample_configuration(install.path(), &[]);

    let runner = Arc::new(SystemRunner::new(CancellationToken::new()));
    let phases = vec![
        shell_phase(1, "true"),
        shell_phase(2, "echo 'certificate request rejected' >&2; exit 7"),
    ];
    let report = Orchestrator::new(phases, store.clone(), runner)
        .unwrap()
        .run(&config)
        .await
        .unwrap();

    assert!(!report.is_success());
    let state = store.load(config.install_id()).unwrap().unwrap();
    let failure = state.failure.unwrap();
    assert_eq!(failure.phase, PhaseId::new(2));
    assert!(failure.detail.contains("exited with status 7"));
    assert!(failure.detail.contains("certificate request rejected"));
}
