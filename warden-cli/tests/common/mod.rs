#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Isolated data home; the binary never sees the caller's `WARDEN_*` variables.
pub struct TestContext {
    pub home: TempDir,
}

impl TestContext {
    pub fn home_path(&self) -> &Path {
        self.home.path()
    }

    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_warden");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(30));
        cmd.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("HOME", self.home.path());
        cmd.arg("--home").arg(self.home.path());
        cmd
    }

    pub fn state_dir(&self) -> PathBuf {
        self.home.path().join("state")
    }
}

pub fn warden() -> TestContext {
    TestContext {
        home: TempDir::new().expect("Failed to create temp dir"),
    }
}
