//! Service identity management.
//!
//! The orchestrator never runs privileged operations as root. It refuses to
//! start as the superuser, creates a dedicated service account when missing
//! (through `sudo useradd`), and replaces its own process image with an
//! equivalent invocation under that account before touching any file.

mod accounts;
mod manager;
mod reexec;

pub use accounts::{AccountDatabase, Identity, SystemAccounts};
pub use manager::{PrivilegeManager, ServiceIdentitySpec};
pub use reexec::{Handoff, handoff_command};
