//! Data home layout.
//!
//! ```text
//! <home>/
//!   .lock                    install lock
//!   credentials.json         credential record (0600)
//!   state/<install_id>.json  run state (0600)
//!   state/archive/           discarded run states
//!   logs/warden.log
//! ```

use crate::credentials::CredentialStore;
use crate::state::FileStateStore;
use crate::util::ensure_private_dir;
use std::path::{Path, PathBuf};
use warden_shared::constants::{envs, layout};
use warden_shared::{WardenError, WardenResult};

#[derive(Clone, Debug)]
pub struct InstallLayout {
    home_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    /// `explicit`, else `$WARDEN_HOME`, else `~/.warden` of the running user.
    pub fn resolve(explicit: Option<&Path>) -> WardenResult<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(path) = std::env::var_os(envs::WARDEN_HOME).filter(|p| !p.is_empty()) {
            return Ok(Self::new(PathBuf::from(path)));
        }
        dirs::home_dir()
            .map(|home| Self::new(home.join(layout::WARDEN_DIR)))
            .ok_or_else(|| {
                WardenError::Storage(format!(
                    "cannot determine home directory; set {}",
                    envs::WARDEN_HOME
                ))
            })
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home_dir.join(layout::LOCK_FILE)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.home_dir.join(layout::STATE_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(layout::LOGS_DIR)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.home_dir.join(layout::CREDENTIALS_FILE)
    }

    pub fn state_store(&self) -> FileStateStore {
        FileStateStore::new(self.state_dir())
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(self.credentials_path())
    }

    /// Create the directory tree, private to the running identity.
    pub fn prepare(&self) -> WardenResult<()> {
        ensure_private_dir(&self.home_dir, 0o700)?;
        ensure_private_dir(&self.state_dir(), 0o700)?;
        ensure_private_dir(&self.logs_dir(), 0o700)?;
        Ok(())
    }
}
