//! Connected clients and the requests each one has in flight.

use crate::daemon::protocol::{write_record, ProtocolError};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Write half of a client connection.
///
/// Clones share one lock, so records from response workers and the
/// broadcaster never interleave on the wire. Closing goes through a
/// separate handle and never waits on that lock, so it also interrupts a
/// write that is stuck on a client which stopped reading.
#[derive(Clone)]
pub(super) struct ClientWriter {
    stream: Arc<Mutex<UnixStream>>,
    control: Arc<UnixStream>,
}

impl ClientWriter {
    pub(super) fn new(stream: UnixStream) -> std::io::Result<Self> {
        let control = stream.try_clone()?;
        Ok(Self {
            stream: Arc::new(Mutex::new(stream)),
            control: Arc::new(control),
        })
    }

    pub(super) fn send<T: Serialize>(&self, record: &T) -> Result<(), ProtocolError> {
        let mut stream = self.stream.lock().map_err(|_| {
            ProtocolError::Io(std::io::Error::other("client writer lock poisoned"))
        })?;
        write_record(&mut *stream, record)
    }

    /// Close both directions, waking the client's reader thread and any
    /// blocked writer.
    pub(super) fn close(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

struct ClientEntry {
    writer: ClientWriter,
    pending: Vec<Value>,
}

/// Requests one client may have in flight before new ones are refused.
pub(super) const MAX_IN_FLIGHT_PER_CLIENT: usize = 32;

#[derive(Default)]
pub(super) struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<HashMap<u64, ClientEntry>>,
}

impl ClientRegistry {
    pub(super) fn register(&self, writer: ClientWriter) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut clients) = self.clients.lock() {
            clients.insert(
                id,
                ClientEntry {
                    writer,
                    pending: Vec::new(),
                },
            );
        }
        id
    }

    /// Forget a client. Returns the refs it still had in flight.
    pub(super) fn unregister(&self, id: u64) -> Vec<Value> {
        self.clients
            .lock()
            .ok()
            .and_then(|mut clients| clients.remove(&id))
            .map(|entry| entry.pending)
            .unwrap_or_default()
    }

    /// Record a request as in flight.
    ///
    /// Returns `false`, recording nothing, when the client already has
    /// [`MAX_IN_FLIGHT_PER_CLIENT`] requests outstanding.
    pub(super) fn begin(&self, id: u64, reference: &Value) -> bool {
        let Ok(mut clients) = self.clients.lock() else {
            return false;
        };
        match clients.get_mut(&id) {
            Some(entry) if entry.pending.len() < MAX_IN_FLIGHT_PER_CLIENT => {
                entry.pending.push(reference.clone());
                true
            }
            _ => false,
        }
    }

    pub(super) fn finish(&self, id: u64, reference: &Value) {
        if let Ok(mut clients) = self.clients.lock() {
            if let Some(entry) = clients.get_mut(&id) {
                if let Some(pos) = entry.pending.iter().position(|r| r == reference) {
                    entry.pending.remove(pos);
                }
            }
        }
    }

    pub(super) fn len(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Write `record` to every client. Clients that fail the write are closed
    /// and dropped.
    ///
    /// # Returns
    /// The number of clients the record reached
    pub(super) fn broadcast<T: Serialize>(&self, record: &T) -> usize {
        let writers: Vec<(u64, ClientWriter)> = match self.clients.lock() {
            Ok(clients) => clients
                .iter()
                .map(|(id, entry)| (*id, entry.writer.clone()))
                .collect(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        for (id, writer) in writers {
            match writer.send(record) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!("Dropping client {id} after failed broadcast: {e}");
                    writer.close();
                    self.unregister(id);
                }
            }
        }
        delivered
    }

    pub(super) fn close_all(&self) {
        let writers: Vec<ClientWriter> = match self.clients.lock() {
            Ok(clients) => clients.values().map(|e| e.writer.clone()).collect(),
            Err(_) => return,
        };
        for writer in writers {
            writer.close();
        }
    }
}
