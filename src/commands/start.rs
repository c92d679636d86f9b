//! Start command - runs the startup pipeline, then serves until stopped

use super::common::Context;
use crate::daemon::{check_status, daemonize, Daemon, DaemonStatus, PidFile, Startup};
use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use std::sync::atomic::Ordering;
use tracing::info;

pub fn execute(ctx: &Context, foreground: bool) -> Result<()> {
    if let Ok(config) = ctx.load_config() {
        if let DaemonStatus::Running { pid } | DaemonStatus::ProcessOnly { pid } =
            check_status(&config.socket_path(), &config.pid_path())
        {
            bail!("Daemon is already running (pid {pid})");
        }
    }

    let daemon = Daemon::new(ctx.data_dir().clone());
    let shutdown_flag = daemon.shutdown_flag();

    let running = match daemon.start()? {
        Startup::NeedsFirstRunSetup { config_path } => {
            println!(
                "{} Wrote default configuration to {}",
                "→".cyan().bold(),
                config_path.display()
            );
            println!("  Fill in the [identity] section, then run `murmur start` again.");
            return Ok(());
        }
        Startup::Ready(running) => running,
    };

    let config = running.config().clone();
    println!(
        "{} Daemon ready on {}",
        "✓".green().bold(),
        config.socket_path().display()
    );

    if !foreground {
        println!("  Logging to {}", config.log_path().display());
        daemonize(&config.log_path())?;
    }

    let pid_file = PidFile::new(&config.pid_path());
    pid_file.write_current()?;

    ctrlc::set_handler(move || shutdown_flag.store(true, Ordering::Relaxed))
        .context("Failed to install signal handler")?;

    info!("Daemon running (pid {})", std::process::id());
    let served = running.serve();
    info!("Daemon stopped");

    pid_file.remove()?;
    served.context("IPC gateway failed")
}
