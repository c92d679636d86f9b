use super::common::{format_message, Context};
use crate::daemon::Push;
use anyhow::Result;
use colored::Colorize;

/// Print pushed messages until the daemon goes away.
pub fn execute(ctx: &Context) -> Result<()> {
    let mut client = ctx.connect()?;
    println!("{} Listening for messages (Ctrl+C to stop)", "→".cyan().bold());

    for push in client.pushes() {
        match push {
            Push::Message(message) => println!("{}", format_message(&message)),
        }
    }

    println!("{} Daemon closed the connection", "─".dimmed());
    Ok(())
}
