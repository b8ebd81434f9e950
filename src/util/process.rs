use anyhow::{Context, Result};
use log::trace;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/**
 * Whether a process with this PID exists and has not exited.
 *
 * A zombie still answers `kill(pid, 0)`, so we also peek at the state field
 * of `/proc/<pid>/stat`.
 */
pub fn is_alive(pid: Pid) -> bool {
    if pid.as_raw() <= 0 {
        return false;
    }
    match kill(pid, None) {
        // EPERM means it exists but belongs to someone else
        Ok(()) | Err(Errno::EPERM) => (),
        Err(_) => return false,
    }

    match std::fs::read_to_string(format!("/proc/{}/stat", pid.as_raw())) {
        Ok(stat) => {
            // The command name is parenthesised and may contain spaces
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next());
            !matches!(state, Some("Z") | Some("X"))
        }
        // No procfs, trust kill()
        Err(_) => true,
    }
}

/// Sends SIGTERM, treating an already-gone process as success.
pub fn terminate(pid: Pid) -> Result<()> {
    trace!("Sending SIGTERM to {}", pid);
    match kill(pid, Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            trace!("Process {} already gone", pid);
            Ok(())
        }
        Err(e) => Err(e).context(format!("failed to signal process {}", pid)),
    }
}
