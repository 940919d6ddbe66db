//! Fakes and fixtures for warden's integration tests.
//!
//! Nothing here touches the host: the runner records instead of spawning,
//! the probe reports whatever it is told, and the account database is a map.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use warden::config::{ConfigResolver, Configuration};
use warden::credentials::CredentialGenerator;
use warden::orchestrator::{PhaseDescriptor, PhaseId};
use warden::phases::CommandPhase;
use warden::preflight::HostProbe;
use warden::privilege::{AccountDatabase, Identity};
use warden::runner::{CapturedOutput, CommandOutcome, CommandResult, CommandRunner, CommandSpec};
use warden_shared::{WardenError, WardenResult};

// ============================================================================
// Command runner
// ============================================================================

/// Records every command; fails or interrupts those matching a pattern.
///
/// Patterns are matched against the space-joined argv, so sensitive specs
/// can still be targeted.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<CommandSpec>>,
    failing: Mutex<BTreeSet<String>>,
    interrupting: Mutex<BTreeSet<String>>,
    stdout: Mutex<Vec<(String, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commands containing `pattern` exit with status 1.
    pub fn fail_matching(&self, pattern: &str) {
        self.failing.lock().insert(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Commands containing `pattern` behave as if Ctrl-C arrived mid-run.
    pub fn interrupt_matching(&self, pattern: &str) {
        self.interrupting.lock().insert(pattern.to_string());
    }

    pub fn clear_interrupts(&self) {
        self.interrupting.lock().clear();
    }

    /// Commands containing `pattern` print `text` on stdout.
    pub fn respond(&self, pattern: &str, text: &str) {
        self.stdout.lock().push((pattern.to_string(), text.to_string()));
    }

    /// Space-joined argv of every invocation, in order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|spec| spec.argv().join(" "))
            .collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.invocations.lock().clone()
    }

    pub fn count_for(&self, pattern: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    pub fn reset(&self) {
        self.invocations.lock().clear();
    }
}

fn matches_any(patterns: &Mutex<BTreeSet<String>>, line: &str) -> bool {
    patterns.lock().iter().any(|pattern| line.contains(pattern.as_str()))
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> WardenResult<CommandResult> {
        let line = spec.argv().join(" ");
        self.invocations.lock().push(spec.clone());

        if matches_any(&self.interrupting, &line) {
            return Err(WardenError::Interrupted);
        }

        let fails = matches_any(&self.failing, &line);
        let stdout = self
            .stdout
            .lock()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, text)| CapturedOutput::from_text(text))
            .unwrap_or_default();
        let stderr = if fails {
            CapturedOutput::from_text("simulated failure\n")
        } else {
            CapturedOutput::default()
        };
        let exit_code = Some(if fails { 1 } else { 0 });
        let outcome = if fails {
            let detail =
                CommandResult::failure_detail(&spec.display(), exit_code, false, &stdout, &stderr);
            CommandOutcome::failure(spec.allows_failure(), detail)
        } else {
            CommandOutcome::Success
        };

        Ok(CommandResult {
            command: spec.display(),
            exit_code,
            stdout,
            stderr,
            duration: Duration::from_millis(1),
            timed_out: false,
            outcome,
        })
    }
}

// ============================================================================
// Host probe
// ============================================================================

const GIB: u64 = 1024 * 1024 * 1024;

/// Host probe answering from fixed values.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub disk_bytes: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub cpus: Option<usize>,
    pub busy_ports: BTreeSet<u16>,
    pub binaries: BTreeSet<String>,
}

impl FakeProbe {
    /// A host comfortably above every environment's recommendation.
    pub fn roomy() -> Self {
        Self {
            disk_bytes: Some(500 * GIB),
            memory_bytes: Some(64 * GIB),
            cpus: Some(16),
            busy_ports: BTreeSet::new(),
            binaries: ["sudo", "git", "curl", "openssl", "docker"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn with_disk_gib(mut self, gib: u64) -> Self {
        self.disk_bytes = Some(gib * GIB);
        self
    }

    pub fn with_memory_gib(mut self, gib: u64) -> Self {
        self.memory_bytes = Some(gib * GIB);
        self
    }

    pub fn with_cpus(mut self, cpus: usize) -> Self {
        self.cpus = Some(cpus);
        self
    }

    pub fn with_busy_port(mut self, port: u16) -> Self {
        self.busy_ports.insert(port);
        self
    }

    pub fn without_binary(mut self, name: &str) -> Self {
        self.binaries.remove(name);
        self
    }
}

impl HostProbe for FakeProbe {
    fn available_disk_bytes(&self, _path: &Path) -> Option<u64> {
        self.disk_bytes
    }

    fn available_memory_bytes(&self) -> Option<u64> {
        self.memory_bytes
    }

    fn cpu_count(&self) -> Option<usize> {
        self.cpus
    }

    fn port_in_use(&self, port: u16) -> bool {
        self.busy_ports.contains(&port)
    }

    fn find_binary(&self, name: &str) -> Option<PathBuf> {
        self.binaries
            .contains(name)
            .then(|| PathBuf::from("/usr/bin").join(name))
    }
}

// ============================================================================
// Account database
// ============================================================================

pub fn identity(name: &str, uid: u32) -> Identity {
    Identity {
        name: name.to_string(),
        uid,
        gid: uid,
        home: PathBuf::from(if uid == 0 {
            "/root".to_string()
        } else {
            format!("/home/{}", name)
        }),
        shell: PathBuf::from("/bin/bash"),
    }
}

/// Account database backed by a map.
pub struct FakeAccounts {
    current: Identity,
    users: Mutex<BTreeMap<String, Identity>>,
    /// Appear on the second lookup, as if created in between.
    pending: Mutex<BTreeMap<String, Identity>>,
}

impl FakeAccounts {
    pub fn running_as(current: Identity) -> Self {
        let mut users = BTreeMap::new();
        users.insert(current.name.clone(), current.clone());
        Self {
            current,
            users: Mutex::new(users),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn root() -> Self {
        Self::running_as(identity("root", 0))
    }

    pub fn operator() -> Self {
        Self::running_as(identity("operator", 1000))
    }

    pub fn with_user(self, user: Identity) -> Self {
        self.users.lock().insert(user.name.clone(), user);
        self
    }

    /// `user` is missing on the first lookup and present afterwards.
    pub fn with_pending_user(self, user: Identity) -> Self {
        self.pending.lock().insert(user.name.clone(), user);
        self
    }
}

impl AccountDatabase for FakeAccounts {
    fn current(&self) -> WardenResult<Identity> {
        Ok(self.current.clone())
    }

    fn lookup(&self, name: &str) -> WardenResult<Option<Identity>> {
        if let Some(found) = self.users.lock().get(name) {
            return Ok(Some(found.clone()));
        }
        if let Some(created) = self.pending.lock().remove(name) {
            self.users.lock().insert(name.to_string(), created);
        }
        Ok(None)
    }
}

// ============================================================================
// Configuration fixtures
// ============================================================================

/// Environment with every required non-secret field set.
pub fn sample_env(install_dir: &Path) -> Vec<(String, String)> {
    [
        ("WARDEN_HOST_ADDRESS", "10.0.0.5".to_string()),
        ("WARDEN_DOMAIN", "misp.example.org".to_string()),
        ("WARDEN_ADMIN_EMAIL", "soc@example.org".to_string()),
        ("WARDEN_ADMIN_ORG", "Example SOC".to_string()),
        ("WARDEN_INSTALL_DIR", install_dir.display().to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

/// Resolved configuration with seeded secrets and `extra` env on top.
pub fn sample_configuration(install_dir: &Path, extra: &[(&str, &str)]) -> Configuration {
    let mut env = sample_env(install_dir);
    env.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    ConfigResolver::new()
        .with_env(env)
        .resolve(&mut CredentialGenerator::seeded(42))
        .expect("sample configuration resolves")
}

/// `count` mandatory phases with ids 1..=count; phase N runs `phase-N`.
pub fn scripted_phases(count: u16) -> Vec<PhaseDescriptor> {
    (1..=count).map(scripted_phase).collect()
}

pub fn scripted_phase(n: u16) -> PhaseDescriptor {
    scripted_phase_at(PhaseId::new(n))
}

pub fn scripted_phase_at(id: PhaseId) -> PhaseDescriptor {
    let marker = format!("phase-{}", id);
    PhaseDescriptor::new(
        id,
        format!("Scripted {}", id),
        Arc::new(CommandPhase::new(move |_| {
            vec![CommandSpec::new("true").arg(marker.clone())]
        })),
    )
}
