use nix::unistd::{User, geteuid};
use serde::Serialize;
use std::path::PathBuf;
use warden_shared::{WardenError, WardenResult};

/// A local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl Identity {
    pub fn is_superuser(&self) -> bool {
        self.uid == 0
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
            shell: user.shell,
        }
    }
}

/// Read access to the host's account database.
pub trait AccountDatabase: Send + Sync {
    /// Effective identity of this process.
    fn current(&self) -> WardenResult<Identity>;

    fn lookup(&self, name: &str) -> WardenResult<Option<Identity>>;
}

/// Accounts from the system's passwd database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAccounts;

impl AccountDatabase for SystemAccounts {
    fn current(&self) -> WardenResult<Identity> {
        let uid = geteuid();
        match User::from_uid(uid) {
            Ok(Some(user)) => Ok(user.into()),
            Ok(None) => Err(WardenError::Privilege(format!(
                "effective uid {} has no passwd entry",
                uid
            ))),
            Err(e) => Err(WardenError::Privilege(format!(
                "failed to look up uid {}: {}",
                uid, e
            ))),
        }
    }

    fn lookup(&self, name: &str) -> WardenResult<Option<Identity>> {
        User::from_name(name)
            .map(|user| user.map(Identity::from))
            .map_err(|e| WardenError::Privilege(format!("failed to look up user {}: {}", name, e)))
    }
}
