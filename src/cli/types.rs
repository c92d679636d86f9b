use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Local messaging daemon", long_about = None)]
#[command(version)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// Data directory (default: ~/.murmur)
    #[arg(long, global = true, value_name = "DIR")]
    pub datadir: Option<PathBuf>,

    /// Configuration file name, relative to the data directory
    #[arg(long, global = true, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the daemon (writes a default config on first run)
    Start {
        /// Stay attached to the terminal instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show whether the daemon is running
    Status,

    /// Send a message through the daemon
    Send {
        /// Recipient user id
        to: String,

        /// Message text
        message: String,
    },

    /// Print stored message history
    Playback,

    /// Delete stored message history
    Purge,

    /// Print inbound messages as they arrive
    Listen,
}
