pub mod logging;
pub mod process;

pub use logging::{LogHandle, init_logging};

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use warden_shared::{WardenError, WardenResult};

/// Create `path` (and parents) and restrict it to `mode`.
pub fn ensure_private_dir(path: &Path, mode: u32) -> WardenResult<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        WardenError::Storage(format!("failed to create {}: {}", path.display(), e))
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        WardenError::Storage(format!(
            "failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

/// Replace `path` with `contents` atomically.
///
/// The temporary file is created in the destination directory with `mode`
/// already applied, so the final file is never visible with wider permissions.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> WardenResult<()> {
    let dir = path.parent().ok_or_else(|| {
        WardenError::Storage(format!("{} has no parent directory", path.display()))
    })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .permissions(std::fs::Permissions::from_mode(mode))
        .tempfile_in(dir)
        .map_err(|e| WardenError::Storage(format!("failed to create temp file: {}", e)))?;

    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| WardenError::Storage(format!("failed to write {}: {}", path.display(), e)))?;

    tmp.persist(path).map_err(|e| {
        WardenError::Storage(format!("failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Create `path` with `contents` and `mode`; fails if it already exists.
///
/// Same temp-file path as [`write_atomic`], but the final rename refuses to
/// replace an existing file. `path` either does not exist or holds all of
/// `contents`.
pub fn write_new(path: &Path, contents: &[u8], mode: u32) -> WardenResult<()> {
    let dir = path.parent().ok_or_else(|| {
        WardenError::Storage(format!("{} has no parent directory", path.display()))
    })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .permissions(std::fs::Permissions::from_mode(mode))
        .tempfile_in(dir)
        .map_err(|e| WardenError::Storage(format!("failed to create temp file: {}", e)))?;

    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| WardenError::Storage(format!("failed to write {}: {}", path.display(), e)))?;

    tmp.persist_noclobber(path).map_err(|e| {
        WardenError::Storage(format!("failed to create {}: {}", path.display(), e.error))
    })?;
    Ok(())
}
