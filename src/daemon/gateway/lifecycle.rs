//! Gateway lifecycle: bind, serve, cleanup.

use super::broadcast::spawn_event_broadcaster;
use super::client::handle_client_connection;
use super::core::{Gateway, MAX_CONNECTIONS};
use super::registry::{ClientRegistry, ClientWriter};
use super::GatewayError;
use crate::session::{Session, SessionEvent};
use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause between accept attempts when no client is waiting.
const ACCEPT_POLL_INTERVAL_MS: u64 = 100;

/// How long one record may take to reach a client before the client is
/// dropped. Bounds the time a client that stopped reading can stall pushes.
pub(super) const CLIENT_WRITE_TIMEOUT_SECS: u64 = 2;

impl Gateway {
    /// Bind the command socket.
    ///
    /// A leftover socket file is removed first, unless a live daemon still
    /// answers on it. The socket is restricted to the owner (0600).
    pub fn bind(
        socket_path: &Path,
        session: Arc<dyn Session>,
        shutdown_flag: Arc<AtomicBool>,
    ) -> Result<Self, GatewayError> {
        if fs::symlink_metadata(socket_path).is_ok() {
            if UnixStream::connect(socket_path).is_ok() {
                return Err(GatewayError::AlreadyRunning(socket_path.to_path_buf()));
            }
            debug!("Removing stale socket {}", socket_path.display());
            if let Err(e) = fs::remove_file(socket_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(GatewayError::RemoveStale {
                        path: socket_path.to_path_buf(),
                        source: e,
                    });
                }
            }
        }

        let listener = UnixListener::bind(socket_path).map_err(|source| GatewayError::Bind {
            path: socket_path.to_path_buf(),
            source,
        })?;

        let configured = fs::set_permissions(socket_path, Permissions::from_mode(0o600))
            .map_err(|source| GatewayError::Permissions {
                path: socket_path.to_path_buf(),
                source,
            })
            .and_then(|()| {
                listener
                    .set_nonblocking(true)
                    .map_err(|source| GatewayError::Io {
                        context: "failed to set socket to non-blocking",
                        source,
                    })
            });
        if let Err(e) = configured {
            let _ = fs::remove_file(socket_path);
            return Err(e);
        }

        info!("Listening on {}", socket_path.display());

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            session,
            registry: Arc::new(ClientRegistry::default()),
            shutdown_flag,
            connection_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Serve clients until the shutdown flag is set, broadcasting `events`
    /// as they arrive. Removes the socket file before returning.
    ///
    /// Requests still being processed at shutdown get no response.
    pub fn serve(&self, events: Receiver<SessionEvent>) -> Result<(), GatewayError> {
        let broadcaster = spawn_event_broadcaster(
            events,
            Arc::clone(&self.registry),
            Arc::clone(&self.shutdown_flag),
        );

        let result = self.accept_loop();

        self.shutdown_flag.store(true, Ordering::Relaxed);
        self.registry.close_all();
        let _ = broadcaster.join();
        self.cleanup()?;

        result
    }

    fn accept_loop(&self) -> Result<(), GatewayError> {
        while !self.shutdown_flag.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let current = self.connection_count.load(Ordering::Relaxed);
                    if current >= MAX_CONNECTIONS {
                        warn!("Connection limit reached ({MAX_CONNECTIONS}), rejecting");
                        drop(stream);
                        continue;
                    }
                    if let Err(e) = self.spawn_client(stream) {
                        warn!("Failed to set up client connection: {e}");
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(ACCEPT_POLL_INTERVAL_MS));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!("Accept error: {e}");
                    return Err(GatewayError::Io {
                        context: "failed to accept connection",
                        source: e,
                    });
                }
            }
        }
        Ok(())
    }

    fn spawn_client(&self, stream: UnixStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(Duration::from_secs(CLIENT_WRITE_TIMEOUT_SECS)))?;
        let writer = ClientWriter::new(stream.try_clone()?)?;
        let id = self.registry.register(writer.clone());
        self.connection_count.fetch_add(1, Ordering::Relaxed);

        let session = Arc::clone(&self.session);
        let registry = Arc::clone(&self.registry);
        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let connection_count = Arc::clone(&self.connection_count);
        let client_writer = writer.clone();

        let spawned = thread::Builder::new()
            .name(format!("murmur-client-{id}"))
            .spawn(move || {
                handle_client_connection(
                    stream,
                    id,
                    client_writer,
                    session,
                    registry,
                    shutdown_flag,
                );
                connection_count.fetch_sub(1, Ordering::Relaxed);
                debug!("Client {id} disconnected");
            });

        if let Err(e) = spawned {
            writer.close();
            self.registry.unregister(id);
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            return Err(e);
        }
        debug!("Client {id} connected");
        Ok(())
    }

    /// Remove the socket file.
    pub(super) fn cleanup(&self) -> Result<(), GatewayError> {
        if let Err(e) = fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(GatewayError::Io {
                    context: "failed to remove socket file",
                    source: e,
                });
            }
        }
        Ok(())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
