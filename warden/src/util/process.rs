//! Process liveness and signalling.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;

/// Check if a process with the given PID exists.
///
/// Sends the null signal. `EPERM` means the process exists but belongs to
/// another user, which still counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send `signal` to every process in group `pgid`.
///
/// # Returns
/// * `true` - Signal delivered or the group no longer exists
/// * `false` - Delivery failed for another reason
pub fn signal_process_group(pgid: u32, signal: Signal) -> bool {
    let Ok(raw) = i32::try_from(pgid) else {
        return false;
    };
    if raw <= 1 {
        // 0 and 1 would address our own group or init.
        return false;
    }
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => true,
        Err(e) => {
            tracing::debug!(pgid, signal = ?signal, error = %e, "Failed to signal process group");
            false
        }
    }
}

/// PID of the running process.
pub fn current_pid() -> u32 {
    std::process::id()
}
