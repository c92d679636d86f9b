//! Core Gateway struct.

use super::registry::ClientRegistry;
use crate::session::Session;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Maximum number of concurrent client connections allowed.
pub const MAX_CONNECTIONS: usize = 100;

/// A bound command socket in front of a session.
///
/// Created by [`Gateway::bind`]; runs until the shutdown flag is set once
/// [`Gateway::serve`] is called. The socket file is removed on drop.
pub struct Gateway {
    pub(super) socket_path: PathBuf,
    pub(super) listener: UnixListener,
    pub(super) session: Arc<dyn Session>,
    pub(super) registry: Arc<ClientRegistry>,
    pub(super) shutdown_flag: Arc<AtomicBool>,
    pub(super) connection_count: Arc<AtomicUsize>,
}

impl Gateway {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Number of clients currently connected.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Request graceful shutdown of the accept loop.
    pub fn shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }
}
