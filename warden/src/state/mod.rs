//! Run State: what has completed, for which configuration.

mod lock;
mod run_state;
mod store;

pub use lock::InstallLock;
pub use run_state::{CompletedPhase, PhaseFailure, RunState, RunStatus};
pub use store::{FileStateStore, MemoryStateStore, StateStore};
