use crate::commands::{check, install, reset, secret, status};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use warden::InstallLayout;
use warden_shared::constants::envs;

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Resumable installer for a containerized threat-intelligence platform"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Data directory for run state, credentials and logs
    #[arg(long, global = true, env = envs::WARDEN_HOME)]
    pub home: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalFlags {
    pub fn layout(&self) -> anyhow::Result<InstallLayout> {
        Ok(InstallLayout::resolve(self.home.as_deref())?)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the platform, resuming an interrupted install when possible
    Install(install::InstallArgs),
    /// Run the pre-flight host checks only
    Check(check::CheckArgs),
    /// Show recorded install progress
    Status(status::StatusArgs),
    /// Archive the recorded progress so the next install starts over
    Reset(reset::ResetArgs),
    /// Print a freshly generated secret
    Secret(secret::SecretArgs),
}
