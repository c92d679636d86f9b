//! Command channel scenarios against a fully started daemon.

use super::helpers::*;
use murmur::daemon::{Command, Push};
use murmur::session::{Message, SendReceipt};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn serve(datadir: &Path, user_id: &str, top_level: &str, network: &str) -> ServingDaemon {
    write_config(datadir, user_id, top_level, network);
    let log = CallLog::default();
    let (running, flag) = start_ready(
        datadir,
        recording_collaborators(&log, RouterBehavior::Maps, datadir),
    );
    ServingDaemon::spawn(running, flag)
}

#[test]
fn test_send_then_playback_over_socket() {
    let temp = TempDir::new().unwrap();
    let daemon = serve(temp.path(), "pat", "", "portmap = false");
    let mut client = daemon.client();

    let response = client
        .request_with_ref(
            json!("r1"),
            Command::Send {
                to: "a@x".to_string(),
                message: "hi".to_string(),
            },
        )
        .unwrap();
    assert_eq!(response.reference, json!("r1"));
    assert!(response.error.is_none());
    let receipt: SendReceipt = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(receipt.to, "a@x");

    let response = client
        .request_with_ref(json!("r2"), Command::Playback)
        .unwrap();
    assert_eq!(response.reference, json!("r2"));
    let history: Vec<Message> = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].key, receipt.key);
    assert_eq!(history[0].message, "hi");
}

#[test]
fn test_failing_send_has_error_and_no_result() {
    let temp = TempDir::new().unwrap();
    // passive: nobody but ourselves is reachable
    let daemon = serve(temp.path(), "quinn", "passive = true", "");
    let mut client = daemon.client();

    let response = client
        .request_with_ref(
            json!("r1"),
            Command::Send {
                to: "a@x".to_string(),
                message: "hi".to_string(),
            },
        )
        .unwrap();

    assert_eq!(response.reference, json!("r1"));
    assert!(response.error.as_deref().is_some_and(|e| !e.is_empty()));
    assert!(response.result.is_none());
}

#[test]
fn test_inbound_messages_are_pushed_to_every_client() {
    let temp = TempDir::new().unwrap();
    let daemon = serve(temp.path(), "rosa", "passive = true", "");
    let mut watcher = daemon.client();
    let mut sender = daemon.client();

    // the watcher is registered once it has been answered
    watcher.request(Command::Playback).unwrap();

    let response = sender
        .request(Command::Send {
            to: "rosa".to_string(),
            message: "note to self".to_string(),
        })
        .unwrap();
    let receipt: SendReceipt = serde_json::from_value(response.result.unwrap()).unwrap();
    assert!(receipt.delivered);

    for client in [&mut watcher, &mut sender] {
        match client.next_push().unwrap() {
            Push::Message(message) => {
                assert_eq!(message.key, receipt.key);
                assert_eq!(message.from, "rosa");
                assert_eq!(message.message, "note to self");
            }
        }
    }
}

#[test]
fn test_purge_clears_history() {
    let temp = TempDir::new().unwrap();
    let daemon = serve(temp.path(), "sam", "", "portmap = false");
    let mut client = daemon.client();

    for text in ["one", "two"] {
        client
            .request(Command::Send {
                to: "b@x".to_string(),
                message: text.to_string(),
            })
            .unwrap();
    }

    let response = client.request_with_ref(json!(9), Command::Purge).unwrap();
    assert_eq!(response.reference, json!(9));
    assert!(response.error.is_none());
    // a null result reads back as None
    assert!(response.result.is_none());

    let response = client.request(Command::Playback).unwrap();
    assert_eq!(response.result, Some(json!([])));
}

#[test]
fn test_history_survives_restart() {
    let temp = TempDir::new().unwrap();
    {
        let daemon = serve(temp.path(), "tess", "", "portmap = false");
        daemon
            .client()
            .request(Command::Send {
                to: "b@x".to_string(),
                message: "persisted".to_string(),
            })
            .unwrap();
    }

    let daemon = serve(temp.path(), "tess", "", "portmap = false");
    let response = daemon.client().request(Command::Playback).unwrap();
    let history: Vec<Message> = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "persisted");
}

#[test]
fn test_shutdown_removes_socket() {
    let temp = TempDir::new().unwrap();
    let mut daemon = serve(temp.path(), "uma", "passive = true", "");
    let _client = daemon.client();

    daemon.stop().expect("serve should exit cleanly");

    assert!(!daemon.socket_path.exists());
}
