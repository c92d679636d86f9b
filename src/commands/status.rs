use super::common::Context;
use crate::daemon::{check_status, DaemonStatus};
use anyhow::Result;
use colored::Colorize;

pub fn execute(ctx: &Context) -> Result<()> {
    let config_path = ctx.data_dir().config_path();
    println!("Data directory: {}", ctx.data_dir().root().display());

    if !config_path.exists() {
        println!(
            "{} Not configured yet. Run `murmur start` to write {}",
            "─".dimmed(),
            config_path.display()
        );
        return Ok(());
    }

    let config = ctx.load_config()?;
    println!("User: {}", config.identity.user_id);

    match check_status(&config.socket_path(), &config.pid_path()) {
        DaemonStatus::Running { pid } => println!(
            "{} Running (pid {pid}) on {}",
            "✓".green().bold(),
            config.socket_path().display()
        ),
        DaemonStatus::ProcessOnly { pid } => println!(
            "{} Process {pid} is alive but not answering on {}",
            "!".yellow().bold(),
            config.socket_path().display()
        ),
        DaemonStatus::NotRunning => println!("{} Not running", "─".dimmed()),
    }
    Ok(())
}
