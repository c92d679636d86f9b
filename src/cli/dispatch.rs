use anyhow::Result;
use murmur::commands::{common::Context, listen, playback, purge, send, start, status, stop};

use super::types::{Cli, Commands};

pub fn dispatch(cli: Cli) -> Result<()> {
    let ctx = Context::new(cli.datadir, cli.config)?;

    match cli.command {
        Commands::Start { foreground } => start::execute(&ctx, foreground),
        Commands::Stop => stop::execute(&ctx),
        Commands::Status => status::execute(&ctx),
        Commands::Send { to, message } => send::execute(&ctx, to, message),
        Commands::Playback => playback::execute(&ctx),
        Commands::Purge => purge::execute(&ctx),
        Commands::Listen => listen::execute(&ctx),
    }
}
