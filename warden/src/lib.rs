//! Warden - resumable provisioning orchestrator.
//!
//! Walks an ordered list of installation phases for a multi-container
//! threat-intelligence platform, persisting progress after every phase so an
//! interrupted or failed install resumes where it stopped.
//!
//! The pieces, in the order an install uses them:
//! - [`config`]: layer defaults, file, environment and prompts into a
//!   validated, immutable [`config::Configuration`]
//! - [`credentials`]: generate policy-conforming secrets and persist them once
//! - [`privilege`]: refuse superuser execution, create and switch to the
//!   service identity
//! - [`preflight`]: check the host before anything is mutated
//! - [`orchestrator`]: the phase state machine, backed by [`state`]
//! - [`runner`]: every external command goes through a [`runner::CommandRunner`]

pub mod config;
pub mod credentials;
pub mod layout;
pub mod orchestrator;
pub mod phases;
pub mod preflight;
pub mod privilege;
pub mod runner;
pub mod state;
pub mod util;

pub use config::{ConfigResolver, Configuration, Environment};
pub use layout::InstallLayout;
pub use orchestrator::{
    CompletionPolicy, Orchestrator, OrchestratorOptions, ResumePolicy, RunOutcome, RunReport,
};
pub use runner::{CommandRunner, CommandSpec, SystemRunner};
pub use warden_shared::{WardenError, WardenResult};
