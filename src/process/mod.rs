//! Signalling other processes by pid.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Whether a process with this pid exists.
///
/// Sends the null signal; `EPERM` still means the process exists.
pub fn is_process_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };

    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Ask a process to shut down with SIGTERM.
pub fn terminate(pid: u32) -> Result<(), Errno> {
    let pid = to_pid(pid).ok_or(Errno::ESRCH)?;
    kill(pid, Signal::SIGTERM)
}
