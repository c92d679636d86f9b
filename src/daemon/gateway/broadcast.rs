//! Session event broadcasting thread.

use super::registry::ClientRegistry;
use crate::daemon::protocol::Push;
use crate::session::SessionEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// How often the broadcaster re-checks the shutdown flag while idle.
const EVENT_POLL_INTERVAL_MS: u64 = 100;

/// Spawn the thread that forwards inbound messages to every client.
pub(super) fn spawn_event_broadcaster(
    events: Receiver<SessionEvent>,
    registry: Arc<ClientRegistry>,
    shutdown_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || run_event_broadcaster(events, registry, shutdown_flag))
}

fn run_event_broadcaster(
    events: Receiver<SessionEvent>,
    registry: Arc<ClientRegistry>,
    shutdown_flag: Arc<AtomicBool>,
) {
    let poll = Duration::from_millis(EVENT_POLL_INTERVAL_MS);

    while !shutdown_flag.load(Ordering::Relaxed) {
        match events.recv_timeout(poll) {
            Ok(SessionEvent::Message(message)) => {
                let key = message.key.clone();
                let reached = registry.broadcast(&Push::Message(message));
                debug!("Broadcast message {key} to {reached} client(s)");
            }
            Ok(SessionEvent::Error(reason)) => error!("Session error: {reason}"),
            Ok(SessionEvent::Ready) => debug!("Session reported ready again"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Session event channel closed");
                break;
            }
        }
    }
}
