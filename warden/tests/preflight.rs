//! Pre-flight checks against a fake host.

use std::path::Path;
use warden::config::Environment;
use warden::preflight::{CheckOutcome, Requirements, check};
use warden_shared::WardenError;
use warden_test_utils::FakeProbe;

fn requirements(environment: Environment) -> Requirements {
    Requirements::for_environment(environment, Path::new("/opt/warden"))
}

#[test]
fn roomy_host_passes_every_check() {
    let report = check(&requirements(Environment::Production), &FakeProbe::roomy());
    assert!(!report.is_blocking());
    assert_eq!(report.warnings().count(), 0);
    report.enforce(false).unwrap();
}

#[test]
fn below_minimum_blocks_with_every_reason_listed() {
    let probe = FakeProbe::roomy()
        .with_disk_gib(10)
        .with_memory_gib(2)
        .with_busy_port(443)
        .without_binary("sudo");
    let err = check(&requirements(Environment::Development), &probe)
        .enforce(false)
        .unwrap_err();

    let WardenError::Preflight(failure) = &err else {
        panic!("expected pre-flight error");
    };
    assert_eq!(failure.blockers.len(), 4);
    assert_eq!(err.exit_code(), 3);
    let text = err.to_string();
    assert!(text.contains("disk"));
    assert!(text.contains("port 443"));
    assert!(text.contains("binary sudo"));
}

#[test]
fn between_minimum_and_recommended_only_warns() {
    let probe = FakeProbe::roomy().with_memory_gib(10).with_cpus(5);
    let report = check(&requirements(Environment::Production), &probe);

    assert!(!report.is_blocking());
    let warned: Vec<&str> = report.warnings().map(|r| r.name.as_str()).collect();
    assert_eq!(warned, vec!["memory", "cpu"]);
}

#[test]
fn installable_binary_missing_is_a_warning() {
    let report = check(
        &requirements(Environment::Staging),
        &FakeProbe::roomy().without_binary("docker"),
    );
    let docker = report
        .results()
        .iter()
        .find(|r| r.name == "binary docker")
        .unwrap();
    assert_eq!(docker.outcome, CheckOutcome::SoftFail);
}

#[test]
fn skip_checks_overrides_hard_failures() {
    let probe = FakeProbe::roomy().with_cpus(1);
    let report = check(&requirements(Environment::Production), &probe);
    assert!(report.is_blocking());
    report.enforce(true).unwrap();
}

#[test]
fn thresholds_grow_with_environment() {
    let dev = requirements(Environment::Development);
    let prod = requirements(Environment::Production);
    assert!(dev.disk_bytes.minimum < prod.disk_bytes.minimum);
    assert!(dev.memory_bytes.recommended < prod.memory_bytes.recommended);
}
