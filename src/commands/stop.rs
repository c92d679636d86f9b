//! Stop command - gracefully shuts down the daemon

use super::common::Context;
use crate::daemon::{self, check_status, DaemonStatus};
use anyhow::{Context as _, Result};
use colored::Colorize;

/// Execute the stop command to gracefully shut down the daemon
pub fn execute(ctx: &Context) -> Result<()> {
    let config = match ctx.load_config() {
        Ok(config) => config,
        Err(_) => {
            println!("{} Daemon is not running", "─".dimmed());
            return Ok(());
        }
    };

    if check_status(&config.socket_path(), &config.pid_path()) == DaemonStatus::NotRunning {
        println!("{} Daemon is not running", "─".dimmed());
        return Ok(());
    }

    println!("{} Stopping daemon...", "→".cyan().bold());
    let pid = daemon::stop(&config).context("Failed to stop daemon")?;

    println!("{} Daemon stopped (pid {pid})", "✓".green().bold());
    Ok(())
}
