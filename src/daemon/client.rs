//! Client side of the command socket.

use super::protocol::{
    encode_request, read_record, write_record, Command, ProtocolError, Push, Request, Response,
    ServerRecord,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("daemon closed the connection")]
    Closed,
}

/// A connection to a running daemon.
///
/// Responses and pushes share one stream; whichever kind the caller is not
/// waiting for is queued until asked for.
pub struct IpcClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    responses: VecDeque<Response>,
    pushes: VecDeque<Push>,
}

impl IpcClient {
    pub fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let connect_error = |source| ClientError::Connect {
            path: socket_path.to_path_buf(),
            source,
        };
        let writer = UnixStream::connect(socket_path).map_err(connect_error)?;
        let reader = writer.try_clone().map_err(connect_error)?;

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            responses: VecDeque::new(),
            pushes: VecDeque::new(),
        })
    }

    /// Read timeout for waiting on responses and pushes. `None` blocks forever.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.writer
            .set_read_timeout(timeout)
            .map_err(|e| ClientError::Protocol(ProtocolError::Io(e)))
    }

    /// Send `command` under a fresh ref and wait for its response.
    pub fn request(&mut self, command: Command) -> Result<Response, ClientError> {
        let reference = Value::String(Uuid::new_v4().to_string());
        self.request_with_ref(reference, command)
    }

    pub fn request_with_ref(
        &mut self,
        reference: Value,
        command: Command,
    ) -> Result<Response, ClientError> {
        self.send(&Request {
            reference: reference.clone(),
            command,
        })?;
        self.wait_for(&reference)
    }

    /// Write a request without waiting for its response.
    pub fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        write_record(&mut self.writer, &encode_request(request))?;
        Ok(())
    }

    /// The next response, in arrival order.
    pub fn next_response(&mut self) -> Result<Response, ClientError> {
        loop {
            if let Some(response) = self.responses.pop_front() {
                return Ok(response);
            }
            self.read_one()?;
        }
    }

    /// The response carrying `reference`, queueing any others seen first.
    pub fn wait_for(&mut self, reference: &Value) -> Result<Response, ClientError> {
        loop {
            if let Some(pos) = self.responses.iter().position(|r| &r.reference == reference) {
                if let Some(response) = self.responses.remove(pos) {
                    return Ok(response);
                }
            }
            self.read_one()?;
        }
    }

    pub fn next_push(&mut self) -> Result<Push, ClientError> {
        loop {
            if let Some(push) = self.pushes.pop_front() {
                return Ok(push);
            }
            self.read_one()?;
        }
    }

    /// Blocking iterator over pushes. Ends when the daemon disconnects or a
    /// read fails.
    pub fn pushes(&mut self) -> impl Iterator<Item = Push> + '_ {
        std::iter::from_fn(move || self.next_push().ok())
    }

    fn read_one(&mut self) -> Result<(), ClientError> {
        match read_record(&mut self.reader)? {
            Some(ServerRecord::Response(response)) => self.responses.push_back(response),
            Some(ServerRecord::Push(push)) => self.pushes.push_back(push),
            None => return Err(ClientError::Closed),
        }
        Ok(())
    }
}
