//! The platform catalog driven end to end against a recording runner.

use std::sync::Arc;
use tempfile::TempDir;
use warden::orchestrator::{Orchestrator, PhaseId, PhaseStatus};
use warden::phases;
use warden::state::MemoryStateStore;
use warden_test_utils::{RecordingRunner, sample_configuration};

fn runner() -> Arc<RecordingRunner> {
    let runner = RecordingRunner::new();
    runner.respond("ps --status running", "3f2a\n9c1b\n");
    runner
}

#[tokio::test]
async fn full_install_runs_every_phase() {
    let dir = TempDir::new().unwrap();
    let config = sample_configuration(dir.path(), &[]);
    let runner = runner();
    let report = Orchestrator::new(phases::catalog(), Arc::new(MemoryStateStore::new()), runner.clone())
        .unwrap()
        .run(&config)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.executed().len(), 11);
    assert!(dir.path().join(".env").is_file());
    assert_eq!(runner.count_for("loadDefaultFeeds"), 1);
    assert_eq!(runner.count_for("ufw --force enable"), 1);
}

#[tokio::test]
async fn excluded_features_issue_no_commands() {
    let dir = TempDir::new().unwrap();
    let config = sample_configuration(dir.path(), &[("WARDEN_EXCLUDE", "feeds,firewall")]);
    let runner = runner();
    let report = Orchestrator::new(phases::catalog(), Arc::new(MemoryStateStore::new()), runner.clone())
        .unwrap()
        .run(&config)
        .await
        .unwrap();

    assert_eq!(
        report.phase(PhaseId::sub(7, 5)).unwrap().status,
        PhaseStatus::Skipped
    );
    assert_eq!(report.phase(PhaseId::new(8)).unwrap().status, PhaseStatus::Skipped);
    assert_eq!(runner.count_for("loadDefaultFeeds"), 0);
    assert_eq!(runner.count_for("ufw allow"), 0);
    assert_eq!(
        report.phase(PhaseId::new(9)).unwrap().status,
        PhaseStatus::Completed
    );
}

#[tokio::test]
async fn secrets_never_appear_in_arguments_or_logged_command_lines() {
    let dir = TempDir::new().unwrap();
    let config = sample_configuration(dir.path(), &[]);
    let runner = runner();
    let report = Orchestrator::new(phases::catalog(), Arc::new(MemoryStateStore::new()), runner.clone())
        .unwrap()
        .run(&config)
        .await
        .unwrap();

    let secrets: Vec<String> = config
        .secrets()
        .into_iter()
        .map(|(_, secret)| secret.expose().to_string())
        .collect();
    for line in runner.invocations() {
        for secret in &secrets {
            assert!(!line.contains(secret.as_str()), "secret leaked into `{}`", line);
        }
    }
    for phase in &report.phases {
        for command in &phase.commands {
            for secret in &secrets {
                assert!(!command.command.contains(secret.as_str()));
            }
        }
    }
    let env_file = std::fs::read_to_string(dir.path().join(".env")).unwrap();
    for secret in &secrets {
        assert!(!env_file.contains(secret.as_str()));
    }
}

#[tokio::test]
async fn verification_failure_is_reported_against_phase_nine() {
    let dir = TempDir::new().unwrap();
    let config = sample_configuration(dir.path(), &[]);
    // No containers listed as running.
    let runner = RecordingRunner::new();
    let report = Orchestrator::new(phases::catalog(), Arc::new(MemoryStateStore::new()), runner)
        .unwrap()
        .run(&config)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.phase(PhaseId::new(9)).unwrap().status, PhaseStatus::Failed);
}
