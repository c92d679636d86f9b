//! Single-node session engine.
//!
//! Persists every sent message, delivers messages addressed to the local
//! user straight back as inbound events, and queues everything else for a
//! transport. Without a transport only loopback sends succeed.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{
    Message, MessageStore, OpenedSession, SendReceipt, Session, SessionError, SessionEvent,
    SessionFactory, SessionOptions,
};
use crate::identity::Identity;
use crate::network::Transport;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSessionFactory;

impl SessionFactory for LocalSessionFactory {
    fn open(
        &self,
        identity: &Identity,
        transport: Transport,
        options: SessionOptions,
    ) -> Result<OpenedSession, SessionError> {
        let store = MessageStore::open(&options.store_path)?;
        let (events, receiver) = mpsc::channel();

        match transport.connection() {
            Some(connection) => debug!(
                "Session transport {}:{} (passive: {})",
                connection.address, connection.port, connection.passive
            ),
            None => debug!("Session opened without transport"),
        }

        let session = LocalSession {
            user_id: identity.user_id().to_string(),
            transport,
            store,
            events,
        };
        session.emit(SessionEvent::Ready);

        Ok(OpenedSession {
            session: Arc::new(session),
            events: receiver,
        })
    }
}

pub struct LocalSession {
    user_id: String,
    transport: Transport,
    store: MessageStore,
    events: Sender<SessionEvent>,
}

impl LocalSession {
    fn emit(&self, event: SessionEvent) {
        // A closed receiver means the daemon is shutting down.
        let _ = self.events.send(event);
    }
}

/// Store key: SHA-256 over the message fields plus a random nonce.
fn message_key(from: &str, to: &str, body: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [from, to, body, timestamp] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

impl Session for LocalSession {
    fn send(&self, to: &str, message: &str) -> Result<SendReceipt, SessionError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(SessionError::InvalidRecipient);
        }
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let loopback = to == self.user_id;
        if !loopback && self.transport == Transport::Offline {
            return Err(SessionError::Offline(to.to_string()));
        }

        let timestamp = Utc::now();
        let record = Message {
            key: message_key(&self.user_id, to, message, &timestamp.to_rfc3339()),
            from: self.user_id.clone(),
            to: to.to_string(),
            message: message.to_string(),
            timestamp,
        };
        self.store.append(&record)?;

        let receipt = SendReceipt {
            key: record.key.clone(),
            to: record.to.clone(),
            delivered: loopback,
            timestamp,
        };
        if loopback {
            self.emit(SessionEvent::Message(record));
        }
        Ok(receipt)
    }

    fn playback(&self) -> Result<Vec<Message>, SessionError> {
        Ok(self.store.read_all()?)
    }

    fn purge(&self) -> Result<(), SessionError> {
        Ok(self.store.clear()?)
    }
}
