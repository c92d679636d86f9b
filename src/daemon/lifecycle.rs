//! Process-level lifecycle: pid file, status checks, stop, daemonizing.

use crate::config::Config;
use crate::process::{is_process_alive, terminate};
use anyhow::{bail, Context, Result};
use nix::unistd::{fork, setsid, ForkResult};
use std::fs::{self, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// How long `stop` waits for the daemon to remove its socket.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Daemon status indicating process and socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    NotRunning,
    /// Process alive and accepting connections.
    Running { pid: u32 },
    /// Process alive but the socket does not answer.
    ProcessOnly { pid: u32 },
}

impl DaemonStatus {
    pub fn pid(&self) -> Option<u32> {
        match self {
            DaemonStatus::NotRunning => None,
            DaemonStatus::Running { pid } | DaemonStatus::ProcessOnly { pid } => Some(*pid),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the current process.
    pub fn write_current(&self) -> Result<()> {
        fs::write(&self.path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Failed to write PID file {}", self.path.display()))
    }

    /// `None` if the file is missing or does not hold a pid.
    pub fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
    }

    pub fn remove(&self) -> Result<()> {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e)
                    .with_context(|| format!("Failed to remove PID file {}", self.path.display()));
            }
        }
        Ok(())
    }
}

/// Check daemon status, removing pid and socket files left by a dead process.
pub fn check_status(socket_path: &Path, pid_path: &Path) -> DaemonStatus {
    let pid_file = PidFile::new(pid_path);

    let Some(pid) = pid_file.read() else {
        let _ = pid_file.remove();
        if socket_path.exists() && UnixStream::connect(socket_path).is_err() {
            let _ = fs::remove_file(socket_path);
        }
        return DaemonStatus::NotRunning;
    };

    if !is_process_alive(pid) {
        let _ = pid_file.remove();
        let _ = fs::remove_file(socket_path);
        return DaemonStatus::NotRunning;
    }

    match UnixStream::connect(socket_path) {
        Ok(_) => DaemonStatus::Running { pid },
        Err(_) => DaemonStatus::ProcessOnly { pid },
    }
}

/// Send SIGTERM to the daemon and wait for it to remove its socket.
///
/// # Returns
/// The pid that was stopped
pub fn stop(config: &Config) -> Result<u32> {
    let socket_path = config.socket_path();
    let pid = match check_status(&socket_path, &config.pid_path()) {
        DaemonStatus::NotRunning => bail!("Daemon is not running"),
        DaemonStatus::Running { pid } | DaemonStatus::ProcessOnly { pid } => pid,
    };

    terminate(pid).with_context(|| format!("Failed to signal daemon (pid {pid})"))?;

    let deadline = Instant::now() + STOP_TIMEOUT;
    while Instant::now() < deadline {
        if !socket_path.exists() && !is_process_alive(pid) {
            return Ok(pid);
        }
        thread::sleep(Duration::from_millis(100));
    }

    bail!(
        "Daemon did not exit within {} seconds. It may be frozen. Try: kill -9 {pid}",
        STOP_TIMEOUT.as_secs()
    )
}

/// Detach from the terminal: double fork, new session, output to `log_path`.
///
/// Returns in the daemon process only; both parents exit. Must be called
/// before any thread is spawned.
pub fn daemonize(log_path: &Path) -> Result<()> {
    match unsafe { fork() }.context("First fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    match unsafe { fork() }.context("Second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
    let log_fd = log_file.as_raw_fd();

    unsafe {
        libc::close(0);
        if libc::dup2(log_fd, 1) < 0 {
            bail!("Failed to redirect stdout");
        }
        if libc::dup2(log_fd, 2) < 0 {
            bail!("Failed to redirect stderr");
        }
    }

    Ok(())
}
