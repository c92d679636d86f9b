//! Startup ordering and degradation, observed through recording fakes.

use super::helpers::*;
use murmur::daemon::{Daemon, Stage, Startup};
use murmur::fs::DataDir;
use murmur::network::Transport;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_first_run_writes_template_and_stops() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().join("murmur");
    let log = CallLog::default();

    let daemon = Daemon::with_collaborators(
        DataDir::new(&datadir),
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    match daemon.start().unwrap() {
        Startup::NeedsFirstRunSetup { config_path } => {
            assert_eq!(config_path, datadir.join("config.toml"));
            assert!(config_path.exists());
        }
        Startup::Ready(_) => panic!("first run must stop after writing the template"),
    }
    assert!(log.entries().is_empty(), "no later stage may run: {:?}", log.entries());
    assert!(!datadir.join("identity.key").exists());
    assert!(!datadir.join("murmur.sock").exists());
}

#[test]
fn test_second_run_with_completed_config_reaches_gateway() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().join("murmur");
    let log = CallLog::default();

    let first = Daemon::with_collaborators(
        DataDir::new(&datadir),
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );
    assert!(matches!(
        first.start().unwrap(),
        Startup::NeedsFirstRunSetup { .. }
    ));

    let config_path = datadir.join("config.toml");
    let template = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        template.replace("user_id = \"\"", "user_id = \"hana@example.org\""),
    )
    .unwrap();

    let (running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    assert!(running.gateway().socket_path().exists());
    assert_eq!(
        log.entries(),
        vec![
            "keygen".to_string(),
            "map_port 4338 key_present=true".to_string(),
            "external_ip".to_string(),
            "session.open active 203.0.113.50 promiscuous=false".to_string(),
        ]
    );
}

#[test]
fn test_missing_private_key_is_generated_before_network() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "ivan", "", "portmap = true");
    let log = CallLog::default();

    let (_running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    let keygen = log.position("keygen").expect("keys generated");
    let mapping = log.position("map_port").expect("mapping attempted");
    assert!(keygen < mapping);
    assert!(log.entries()[mapping].ends_with("key_present=true"));
    assert!(datadir.join("identity.pub").exists());
    assert!(datadir.join("identity.key").exists());
}

#[test]
fn test_existing_private_key_is_not_regenerated() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "judy", "passive = true", "");
    fs::write(datadir.join("identity.pub"), "aa\n").unwrap();
    fs::write(datadir.join("identity.key"), "bb\n").unwrap();
    let log = CallLog::default();

    let (running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    assert!(log.position("keygen").is_none());
    assert_eq!(running.identity().public_key(), "aa");
}

#[test]
fn test_passive_mode_builds_no_connection() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "kim", "passive = true", "portmap = true");
    let log = CallLog::default();

    let (running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    assert_eq!(running.transport(), &Transport::Offline);
    assert!(log.position("map_port").is_none());
    assert!(log.position("external_ip").is_none());
    assert_eq!(
        log.entries().last().unwrap(),
        "session.open offline promiscuous=false"
    );
    assert!(running.gateway().socket_path().exists());
}

#[test]
fn test_direct_mode_skips_router() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "lee", "", "address = \"10.1.2.3\"\nportmap = false");
    let log = CallLog::default();

    let (_running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    assert!(log.position("map_port").is_none());
    assert_eq!(
        log.entries().last().unwrap(),
        "session.open active 10.1.2.3 promiscuous=false"
    );
}

#[test]
fn test_promiscuous_flag_reaches_session_only_when_set() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    let log = CallLog::default();

    write_config(&datadir, "pia", "passive = true", "");
    let (first, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );
    assert!(!first.config().promiscuous);
    drop(first);

    write_config(&datadir, "pia", "passive = true\npromiscuous = true", "");
    let (second, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );
    assert!(second.config().promiscuous);

    let opens: Vec<String> = log
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("session.open"))
        .collect();
    assert_eq!(
        opens,
        vec![
            "session.open offline promiscuous=false".to_string(),
            "session.open offline promiscuous=true".to_string(),
        ]
    );
}

#[test]
fn test_mapping_failure_still_reaches_gateway() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "mia", "", "portmap = true");
    let log = CallLog::default();

    let (running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::RejectsMapping, &datadir),
    );

    assert!(running.gateway().socket_path().exists());
    assert!(log.position("external_ip").is_none());
    let connection = running.transport().connection().expect("fallback connection");
    assert!(connection.passive);
    assert!(!connection.forward_port);
}

#[test]
fn test_external_ip_failure_still_reaches_gateway() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "ned", "", "portmap = true");
    let log = CallLog::default();

    let (running, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::HidesExternalIp, &datadir),
    );

    assert!(running.gateway().socket_path().exists());
    assert!(log.position("external_ip").is_some());
    assert!(running.transport().connection().unwrap().passive);
}

#[test]
fn test_second_daemon_on_same_datadir_fails_at_gateway() {
    let temp = TempDir::new().unwrap();
    let datadir = temp.path().to_path_buf();
    write_config(&datadir, "olga", "passive = true", "");
    let log = CallLog::default();

    let (_first, _flag) = start_ready(
        &datadir,
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );

    let second = Daemon::with_collaborators(
        DataDir::new(&datadir),
        recording_collaborators(&log, RouterBehavior::Maps, &datadir),
    );
    let err = second.start().err().expect("socket is taken");
    assert_eq!(err.stage, Stage::Gateway);
}
