//! Host validation before any phase runs.
//!
//! Follows "validate early": every check inspects the host without changing
//! it, and all checks run even when one fails so the operator sees every
//! blocker in one pass.

mod probe;

pub use probe::{HostProbe, SystemProbe};

use crate::config::Environment;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use warden_shared::{PreflightFailure, WardenError, WardenResult};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    /// Warn and continue.
    SoftFail,
    /// Abort unless overridden.
    HardFail,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckOutcome::Pass => "pass",
            CheckOutcome::SoftFail => "warn",
            CheckOutcome::HardFail => "FAIL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub outcome: CheckOutcome,
    pub detail: String,
}

impl CheckResult {
    fn new(name: impl Into<String>, outcome: CheckOutcome, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome,
            detail: detail.into(),
        }
    }
}

/// Below `minimum` is a hard failure, below `recommended` a soft one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub minimum: u64,
    pub recommended: u64,
}

impl Threshold {
    pub const fn new(minimum: u64, recommended: u64) -> Self {
        Self {
            minimum,
            recommended,
        }
    }

    pub fn classify(&self, actual: u64) -> CheckOutcome {
        if actual < self.minimum {
            CheckOutcome::HardFail
        } else if actual < self.recommended {
            CheckOutcome::SoftFail
        } else {
            CheckOutcome::Pass
        }
    }
}

/// An external program the phases call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRequirement {
    pub name: String,
    /// Missing hard requirements cannot be installed by a phase.
    pub hard: bool,
}

impl BinaryRequirement {
    pub fn hard(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hard: true,
        }
    }

    pub fn installable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hard: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    pub disk_path: PathBuf,
    pub disk_bytes: Threshold,
    pub memory_bytes: Threshold,
    pub cpu_cores: Threshold,
    pub ports: Vec<u16>,
    pub binaries: Vec<BinaryRequirement>,
}

impl Requirements {
    pub fn for_environment(environment: Environment, install_dir: &Path) -> Self {
        let (disk, memory, cores) = match environment {
            Environment::Development => ((20, 40), (4, 8), (2, 4)),
            Environment::Staging => ((40, 80), (6, 12), (2, 4)),
            Environment::Production => ((60, 120), (8, 16), (4, 8)),
        };
        Self {
            disk_path: install_dir.to_path_buf(),
            disk_bytes: Threshold::new(disk.0 * GIB, disk.1 * GIB),
            memory_bytes: Threshold::new(memory.0 * GIB, memory.1 * GIB),
            cpu_cores: Threshold::new(cores.0, cores.1),
            ports: vec![80, 443],
            binaries: vec![
                BinaryRequirement::hard("sudo"),
                BinaryRequirement::installable("git"),
                BinaryRequirement::installable("curl"),
                BinaryRequirement::installable("openssl"),
                BinaryRequirement::installable("docker"),
            ],
        }
    }
}

/// Every check result of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreflightReport {
    results: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn hard_failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == CheckOutcome::HardFail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CheckResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == CheckOutcome::SoftFail)
    }

    pub fn is_blocking(&self) -> bool {
        self.hard_failures().next().is_some()
    }

    /// Log warnings and reject hard failures unless `overridden`.
    pub fn enforce(&self, overridden: bool) -> WardenResult<()> {
        for warning in self.warnings() {
            tracing::warn!(check = %warning.name, "{}", warning.detail);
        }

        let blockers: Vec<String> = self
            .hard_failures()
            .map(|r| format!("{}: {}", r.name, r.detail))
            .collect();
        if blockers.is_empty() {
            return Ok(());
        }

        if overridden {
            for blocker in &blockers {
                tracing::warn!("Pre-flight failure overridden by skip_checks: {}", blocker);
            }
            return Ok(());
        }
        Err(WardenError::Preflight(PreflightFailure { blockers }))
    }
}

fn bytes_check(name: &str, actual: Option<u64>, threshold: Threshold) -> CheckResult {
    let Some(actual) = actual else {
        return CheckResult::new(name, CheckOutcome::SoftFail, "could not be determined");
    };
    let outcome = threshold.classify(actual);
    let detail = format!(
        "{:.1} GiB available (minimum {} GiB, recommended {} GiB)",
        actual as f64 / GIB as f64,
        threshold.minimum / GIB,
        threshold.recommended / GIB
    );
    CheckResult::new(name, outcome, detail)
}

/// Run every check against `probe`.
pub fn check(requirements: &Requirements, probe: &dyn HostProbe) -> PreflightReport {
    let mut results = vec![
        bytes_check(
            "disk",
            probe.available_disk_bytes(&requirements.disk_path),
            requirements.disk_bytes,
        ),
        bytes_check(
            "memory",
            probe.available_memory_bytes(),
            requirements.memory_bytes,
        ),
    ];

    results.push(match probe.cpu_count() {
        Some(cores) => CheckResult::new(
            "cpu",
            requirements.cpu_cores.classify(cores as u64),
            format!(
                "{} cores (minimum {}, recommended {})",
                cores, requirements.cpu_cores.minimum, requirements.cpu_cores.recommended
            ),
        ),
        None => CheckResult::new("cpu", CheckOutcome::SoftFail, "could not be determined"),
    });

    for &port in &requirements.ports {
        let name = format!("port {}", port);
        results.push(if probe.port_in_use(port) {
            CheckResult::new(name, CheckOutcome::HardFail, "already in use")
        } else {
            CheckResult::new(name, CheckOutcome::Pass, "free")
        });
    }

    for binary in &requirements.binaries {
        let name = format!("binary {}", binary.name);
        results.push(match probe.find_binary(&binary.name) {
            Some(path) => CheckResult::new(name, CheckOutcome::Pass, path.display().to_string()),
            None if binary.hard => {
                CheckResult::new(name, CheckOutcome::HardFail, "not found on PATH")
            }
            None => CheckResult::new(
                name,
                CheckOutcome::SoftFail,
                "not found on PATH; will be installed",
            ),
        });
    }

    let report = PreflightReport { results };
    tracing::debug!(
        checks = report.results.len(),
        blocking = report.is_blocking(),
        "Pre-flight checks finished"
    );
    report
}
