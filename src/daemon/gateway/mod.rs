//! IPC gateway: a Unix socket serving newline-delimited JSON commands.

mod broadcast;
mod client;
mod core;
mod dispatch;
mod lifecycle;
mod registry;


use std::path::PathBuf;
use thiserror::Error;

pub use self::core::{Gateway, MAX_CONNECTIONS};
pub use dispatch::dispatch;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("a daemon is already listening on {0}")]
    AlreadyRunning(PathBuf),

    #[error("failed to remove stale socket {path}: {source}")]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to restrict permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}
