use crate::daemon::protocol::{Command, Request, Response};
use crate::session::Session;
use serde::Serialize;
use serde_json::Value;

fn encode<T: Serialize>(payload: &T) -> Result<Value, String> {
    serde_json::to_value(payload).map_err(|e| format!("failed to encode result: {e}"))
}

/// Run one request against the session and build its response.
///
/// The response always carries the request's ref, with either an error or a
/// result, never both.
pub fn dispatch(session: &dyn Session, request: Request) -> Response {
    let Request { reference, command } = request;

    let outcome = match command {
        Command::Send { to, message } => session
            .send(&to, &message)
            .map_err(|e| e.to_string())
            .and_then(|receipt| encode(&receipt)),
        Command::Playback => session
            .playback()
            .map_err(|e| e.to_string())
            .and_then(|messages| encode(&messages)),
        Command::Purge => session
            .purge()
            .map(|()| Value::Null)
            .map_err(|e| e.to_string()),
    };

    match outcome {
        Ok(result) => Response::success(reference, result),
        Err(error) => Response::failure(reference, error),
    }
}
