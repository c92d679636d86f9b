//! The messaging session: the only thing that touches the message store.
//!
//! A [`SessionFactory`] opens a [`Session`] from an identity and a transport
//! and hands back the session's event channel alongside it. The daemon
//! shares the session with the IPC gateway and drains the events into
//! client broadcasts.

pub mod local;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::identity::Identity;
use crate::network::Transport;
pub use local::{LocalSession, LocalSessionFactory};
pub use store::{MessageStore, StoreError};

/// A message as stored and as pushed to IPC clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Location of the message in the store.
    pub key: String,
    pub from: String,
    pub to: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub key: String,
    pub to: String,
    /// Whether the recipient has received it, as opposed to it being queued.
    pub delivered: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready,
    Error(String),
    Message(Message),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no network transport (passive mode); cannot reach {0}")]
    Offline(String),

    #[error("recipient must not be empty")]
    InvalidRecipient,

    #[error("message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session engine error: {0}")]
    Engine(String),
}

/// Operations the IPC gateway can invoke. Implementations are called from
/// many worker threads at once.
pub trait Session: Send + Sync {
    fn send(&self, to: &str, message: &str) -> Result<SendReceipt, SessionError>;

    /// Stored history, oldest first.
    fn playback(&self) -> Result<Vec<Message>, SessionError>;

    fn purge(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub store_path: PathBuf,
    /// Disable certificate validation for outbound connections.
    pub promiscuous: bool,
}

pub struct OpenedSession {
    pub session: Arc<dyn Session>,
    pub events: Receiver<SessionEvent>,
}

pub trait SessionFactory: Send + Sync {
    /// Open a session. The transport may be [`Transport::Offline`].
    fn open(
        &self,
        identity: &Identity,
        transport: Transport,
        options: SessionOptions,
    ) -> Result<OpenedSession, SessionError>;
}

/// Block until the session reports `Ready`.
///
/// Messages that arrive first are dropped: no IPC client can be connected yet.
pub fn await_ready(events: &Receiver<SessionEvent>) -> Result<(), SessionError> {
    loop {
        match events.recv() {
            Ok(SessionEvent::Ready) => return Ok(()),
            Ok(SessionEvent::Error(reason)) => return Err(SessionError::Engine(reason)),
            Ok(SessionEvent::Message(message)) => {
                debug!("Dropping message {} received before ready", message.key);
            }
            Err(_) => {
                return Err(SessionError::Engine(
                    "session closed before becoming ready".to_string(),
                ))
            }
        }
    }
}
