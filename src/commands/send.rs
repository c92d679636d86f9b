use super::common::{into_result, Context};
use crate::daemon::Command;
use crate::session::SendReceipt;
use anyhow::{Context as _, Result};
use colored::Colorize;

pub fn execute(ctx: &Context, to: String, message: String) -> Result<()> {
    let mut client = ctx.connect()?;
    let response = client
        .request(Command::Send { to, message })
        .context("Failed to send request")?;
    let receipt: SendReceipt =
        serde_json::from_value(into_result(response)?).context("Unexpected send result")?;

    let state = if receipt.delivered {
        "delivered".green()
    } else {
        "queued".yellow()
    };
    println!(
        "{} Sent to {} ({state}, key {})",
        "✓".green().bold(),
        receipt.to.bold(),
        short_key(&receipt.key)
    );
    Ok(())
}

/// First twelve characters of a message key.
fn short_key(key: &str) -> String {
    key.chars().take(12).collect()
}
