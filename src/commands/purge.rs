use super::common::{into_result, Context};
use crate::daemon::Command;
use anyhow::{Context as _, Result};
use colored::Colorize;

pub fn execute(ctx: &Context) -> Result<()> {
    let mut client = ctx.connect()?;
    let response = client
        .request(Command::Purge)
        .context("Failed to request purge")?;
    into_result(response)?;

    println!("{} Message history deleted", "✓".green().bold());
    Ok(())
}
