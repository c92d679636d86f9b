use super::common::{format_message, into_result, Context};
use crate::daemon::Command;
use crate::session::Message;
use anyhow::{Context as _, Result};
use colored::Colorize;

pub fn execute(ctx: &Context) -> Result<()> {
    let mut client = ctx.connect()?;
    let response = client
        .request(Command::Playback)
        .context("Failed to request playback")?;
    let messages: Vec<Message> =
        serde_json::from_value(into_result(response)?).context("Unexpected playback result")?;

    if messages.is_empty() {
        println!("{} No messages", "─".dimmed());
        return Ok(());
    }
    for message in &messages {
        println!("{}", format_message(message));
    }
    Ok(())
}
