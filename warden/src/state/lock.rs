//! Single-orchestrator guard for a data home.
//!
//! Uses `flock` so the lock disappears with the process, whether it exits,
//! crashes or is killed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use warden_shared::constants::layout;
use warden_shared::{WardenError, WardenResult};

/// Exclusive lock on `<home>/.lock`, released on drop.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Take the lock without blocking.
    ///
    /// Fails with [`WardenError::InstallInProgress`] when another process
    /// holds it.
    pub fn acquire(home_dir: &Path) -> WardenResult<Self> {
        std::fs::create_dir_all(home_dir)
            .map_err(|e| WardenError::Storage(format!("failed to create home dir: {}", e)))?;

        let lock_path = home_dir.join(layout::LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| WardenError::Storage(format!("failed to open lock file: {}", e)))?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                let holder = std::fs::read_to_string(&lock_path).unwrap_or_default();
                let holder = holder.trim();
                return Err(WardenError::InstallInProgress(format!(
                    "another warden process{} is using {}",
                    if holder.is_empty() {
                        String::new()
                    } else {
                        format!(" (pid {})", holder)
                    },
                    home_dir.display()
                )));
            }
            return Err(WardenError::Storage(format!(
                "failed to acquire lock: {}",
                err
            )));
        }

        // Holder pid is informational only; the flock is the lock.
        let _ = file
            .set_len(0)
            .and_then(|_| write!(file, "{}", std::process::id()));

        tracing::debug!(lock_path = %lock_path.display(), "Acquired install lock");
        Ok(InstallLock {
            file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        tracing::debug!(lock_path = %self.path.display(), "Released install lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let lock = InstallLock::acquire(temp_dir.path()).unwrap();
        assert_eq!(lock.path(), temp_dir.path().join(".lock"));
        assert!(lock.path().exists());
    }

    #[test]
    fn test_second_acquire_reports_install_in_progress() {
        let temp_dir = TempDir::new().unwrap();
        let _held = InstallLock::acquire(temp_dir.path()).unwrap();

        let err = InstallLock::acquire(temp_dir.path()).unwrap_err();
        assert!(matches!(err, WardenError::InstallInProgress(_)));
        assert!(err.to_string().contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _lock = InstallLock::acquire(temp_dir.path()).unwrap();
        }
        let _again = InstallLock::acquire(temp_dir.path()).unwrap();
    }

    #[test]
    fn test_lock_contended_across_threads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();
        let _held = InstallLock::acquire(&path).unwrap();

        let result = std::thread::spawn(move || InstallLock::acquire(&path).map(|_| ()))
            .join()
            .unwrap();
        assert!(result.is_err());
    }
}
