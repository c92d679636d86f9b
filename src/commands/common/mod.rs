//! Helpers shared by the command implementations.

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;

use crate::config::Config;
use crate::daemon::{IpcClient, Response};
use crate::fs::DataDir;
use crate::session::Message;

/// Where the daemon's files live, as chosen on the command line.
pub struct Context {
    data_dir: DataDir,
}

impl Context {
    /// # Arguments
    /// * `datadir` - Explicit data directory, or `None` for `~/.murmur`
    /// * `config_name` - Configuration file name relative to the data directory
    pub fn new(datadir: Option<PathBuf>, config_name: PathBuf) -> Result<Self> {
        let root = match datadir {
            Some(dir) => dir,
            None => DataDir::default_root()
                .context("Could not determine home directory; pass --datadir")?,
        };
        Ok(Self {
            data_dir: DataDir::new(root).with_config_name(config_name),
        })
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    /// Load the configuration without provisioning anything.
    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.data_dir.config_path();
        if !config_path.exists() {
            bail!(
                "No configuration at {}. Run `murmur start` first.",
                config_path.display()
            );
        }
        self.data_dir
            .load_config()
            .with_context(|| format!("Failed to load {}", config_path.display()))
    }

    /// Connect to the running daemon's command socket.
    pub fn connect(&self) -> Result<IpcClient> {
        let config = self.load_config()?;
        IpcClient::connect(&config.socket_path())
            .context("Could not reach the daemon. Is it running? Try `murmur start`.")
    }
}

/// The result of a successful response, or the daemon's error.
pub fn into_result(response: Response) -> Result<Value> {
    match response.error {
        Some(error) => bail!("Daemon returned error: {error}"),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

pub fn format_message(message: &Message) -> String {
    format!(
        "{} {} {} {}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        message.from.bold(),
        "→".dimmed(),
        message.to.bold(),
        message.message
    )
}
