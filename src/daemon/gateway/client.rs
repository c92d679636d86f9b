//! Client connection handling.

use super::dispatch::dispatch;
use super::registry::{ClientRegistry, ClientWriter};
use crate::daemon::protocol::{parse_request, read_line, ProtocolError, Request, Response};
use crate::session::Session;
use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Read requests from one client until it disconnects.
///
/// Each request is handed to its own worker thread, so a slow session call
/// never holds up this client's later requests or anyone else's.
pub(super) fn handle_client_connection(
    stream: UnixStream,
    id: u64,
    writer: ClientWriter,
    session: Arc<dyn Session>,
    registry: Arc<ClientRegistry>,
    shutdown_flag: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    while !shutdown_flag.load(Ordering::Relaxed) {
        match read_line(&mut reader, &mut line) {
            Ok(true) => {}
            Ok(false) => break,
            Err(ProtocolError::TooLarge { limit }) => {
                warn!("Client {id} sent a record over {limit} bytes, closing connection");
                break;
            }
            Err(e) => {
                debug!("Client {id} read error: {e}");
                break;
            }
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match parse_request(&line) {
            Ok(request) => {
                if !registry.begin(id, &request.reference) {
                    debug!("Client {id} has too many requests in flight, refusing one");
                    let busy = Response::failure(
                        request.reference,
                        "too many requests in flight, retry later",
                    );
                    if writer.send(&busy).is_err() {
                        break;
                    }
                    continue;
                }
                spawn_dispatch(
                    id,
                    request,
                    writer.clone(),
                    Arc::clone(&session),
                    Arc::clone(&registry),
                );
            }
            Err(rejected) => {
                debug!("Client {id} sent an invalid request: {}", rejected.reason);
                if writer.send(&Response::from(rejected)).is_err() {
                    break;
                }
            }
        }
    }

    writer.close();
    let abandoned = registry.unregister(id);
    if !abandoned.is_empty() {
        debug!(
            "Client {id} disconnected with {} request(s) in flight",
            abandoned.len()
        );
    }
}

fn spawn_dispatch(
    id: u64,
    request: Request,
    writer: ClientWriter,
    session: Arc<dyn Session>,
    registry: Arc<ClientRegistry>,
) {
    let reference = request.reference.clone();
    let command = request.command.name();
    let worker_writer = writer.clone();
    let worker_registry = Arc::clone(&registry);

    let spawned = thread::Builder::new()
        .name(format!("murmur-request-{id}"))
        .spawn(move || {
            let reference = request.reference.clone();

            let response = panic::catch_unwind(AssertUnwindSafe(|| {
                dispatch(session.as_ref(), request)
            }))
            .unwrap_or_else(|_| {
                Response::failure(reference.clone(), format!("internal error handling {command}"))
            });

            if let Err(e) = worker_writer.send(&response) {
                debug!("Client {id} gone before {command} response: {e}");
                worker_writer.close();
            }
            worker_registry.finish(id, &reference);
        });

    if let Err(e) = spawned {
        warn!("Could not start a worker for client {id} {command}: {e}");
        let busy = Response::failure(reference.clone(), "daemon busy, retry later");
        if let Err(e) = writer.send(&busy) {
            debug!("Client {id} gone before {command} response: {e}");
        }
        registry.finish(id, &reference);
    }
}
