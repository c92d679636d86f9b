//! Wire format of the command channel: newline-delimited JSON records.
//!
//! Clients send requests (`{"type", "body", "ref"}`); the daemon answers
//! each with exactly one response (`{"ref", "error", "result"}`) and pushes
//! inbound messages (`{"type": "message", ...}`) without a `ref`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Read, Write};
use thiserror::Error;

use crate::session::Message;

/// Longest accepted line, excluding the newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode record: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send { to: String, message: String },
    Playback,
    Purge,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Send { .. } => "send",
            Command::Playback => "playback",
            Command::Purge => "purge",
        }
    }

    fn body(&self) -> Value {
        match self {
            Command::Send { to, message } => json!({ "to": to, "message": message }),
            Command::Playback | Command::Purge => json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Opaque correlation value, echoed back verbatim.
    pub reference: Value,
    pub command: Command,
}

/// A line that could not be turned into a [`Request`]. Still gets a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub reference: Value,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "ref")]
    pub reference: Value,
    pub error: Option<String>,
    pub result: Option<Value>,
}

impl Response {
    pub fn success(reference: Value, result: Value) -> Self {
        Self {
            reference,
            error: None,
            result: Some(result),
        }
    }

    pub fn failure(reference: Value, error: impl Into<String>) -> Self {
        Self {
            reference,
            error: Some(error.into()),
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Rejected> for Response {
    fn from(rejected: Rejected) -> Self {
        Response::failure(rejected.reference, rejected.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Push {
    Message(Message),
}

/// Anything the daemon writes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerRecord {
    Push(Push),
    Response(Response),
}

#[derive(Deserialize)]
struct SendBody {
    to: String,
    message: String,
}

/// Decode one request line.
pub fn parse_request(line: &[u8]) -> Result<Request, Rejected> {
    let value: Value = serde_json::from_slice(line).map_err(|e| Rejected {
        reference: Value::Null,
        reason: format!("malformed request: {e}"),
    })?;

    let Value::Object(mut fields) = value else {
        return Err(Rejected {
            reference: Value::Null,
            reason: "malformed request: expected a JSON object".to_string(),
        });
    };

    let reference = fields.remove("ref").unwrap_or(Value::Null);
    let reject = |reason: String| Rejected {
        reference: reference.clone(),
        reason,
    };

    let kind = match fields.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => return Err(reject("request type must be a string".to_string())),
        None => return Err(reject("request is missing a type".to_string())),
    };

    let command = match kind.as_str() {
        "send" => {
            let body = fields.remove("body").unwrap_or(Value::Null);
            let body: SendBody = serde_json::from_value(body)
                .map_err(|e| reject(format!("invalid send body: {e}")))?;
            Command::Send {
                to: body.to,
                message: body.message,
            }
        }
        "playback" => Command::Playback,
        "purge" => Command::Purge,
        other => return Err(reject(format!("unknown request type: {other}"))),
    };

    Ok(Request { reference, command })
}

/// The wire form of a request.
pub fn encode_request(request: &Request) -> Value {
    json!({
        "type": request.command.name(),
        "body": request.command.body(),
        "ref": request.reference,
    })
}

/// Serialize `record` as one line and flush it.
///
/// The whole line goes out in a single `write_all`, so callers holding a
/// per-stream lock never interleave records.
pub fn write_record<T: Serialize, W: Write>(stream: &mut W, record: &T) -> Result<(), ProtocolError> {
    let mut line = serde_json::to_vec(record).map_err(ProtocolError::Encode)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()?;
    Ok(())
}

/// Read one line into `buf`, without the trailing newline.
///
/// # Returns
/// `Ok(false)` at end of stream, `Ok(true)` when a line was read
pub fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, ProtocolError> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::TooLarge {
            limit: MAX_LINE_BYTES,
        });
    }
    Ok(true)
}

/// Read the next daemon record, skipping blank lines.
pub fn read_record<R: BufRead>(reader: &mut R) -> Result<Option<ServerRecord>, ProtocolError> {
    let mut buf = Vec::new();
    loop {
        if !read_line(reader, &mut buf)? {
            return Ok(None);
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return serde_json::from_slice(&buf)
            .map(Some)
            .map_err(ProtocolError::Decode);
    }
}
