//! Test helper functions for E2E tests

use murmur::daemon::{Collaborators, Daemon, GatewayError, IpcClient, RunningDaemon, Startup};
use murmur::fs::DataDir;
use murmur::identity::{Ed25519KeyGenerator, Identity, IdentityError, KeyGenerator, KeyMaterial};
use murmur::network::{PortMapError, PortMapper, Transport};
use murmur::session::{LocalSessionFactory, OpenedSession, SessionError, SessionFactory, SessionOptions};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Ordered record of which collaborator was called, shared by all fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}

pub struct RecordingKeys {
    pub log: CallLog,
}

impl KeyGenerator for RecordingKeys {
    fn generate(&self, user_id: &str, passphrase: &str) -> Result<KeyMaterial, IdentityError> {
        self.log.push("keygen");
        Ed25519KeyGenerator.generate(user_id, passphrase)
    }
}

#[derive(Clone, Copy, Default)]
pub enum RouterBehavior {
    #[default]
    Maps,
    RejectsMapping,
    HidesExternalIp,
}

pub struct RecordingMapper {
    pub log: CallLog,
    pub behavior: RouterBehavior,
    /// Recorded with each call, to show what existed on disk at the time.
    pub private_key_path: PathBuf,
}

impl PortMapper for RecordingMapper {
    fn map_port(&self, port: u16) -> Result<(), PortMapError> {
        self.log.push(format!(
            "map_port {port} key_present={}",
            self.private_key_path.exists()
        ));
        match self.behavior {
            RouterBehavior::RejectsMapping => {
                Err(PortMapError::Mapping("ConflictInMappingEntry".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn external_ip(&self) -> Result<IpAddr, PortMapError> {
        self.log.push("external_ip");
        match self.behavior {
            RouterBehavior::HidesExternalIp => {
                Err(PortMapError::ExternalAddress("no reply".to_string()))
            }
            _ => Ok(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 50))),
        }
    }
}

/// Delegates to the local engine, logging the transport and options it was given.
pub struct RecordingSessions {
    pub log: CallLog,
}

impl SessionFactory for RecordingSessions {
    fn open(
        &self,
        identity: &Identity,
        transport: Transport,
        options: SessionOptions,
    ) -> Result<OpenedSession, SessionError> {
        let kind = match transport.connection() {
            None => "offline".to_string(),
            Some(c) if c.passive => format!("passive {}", c.address),
            Some(c) => format!("active {}", c.address),
        };
        self.log.push(format!(
            "session.open {kind} promiscuous={}",
            options.promiscuous
        ));
        LocalSessionFactory.open(identity, transport, options)
    }
}

pub fn recording_collaborators(
    log: &CallLog,
    behavior: RouterBehavior,
    datadir: &Path,
) -> Collaborators {
    Collaborators {
        keys: Box::new(RecordingKeys { log: log.clone() }),
        port_mapper: Box::new(RecordingMapper {
            log: log.clone(),
            behavior,
            private_key_path: datadir.join("identity.key"),
        }),
        sessions: Box::new(RecordingSessions { log: log.clone() }),
    }
}

/// Write a filled-in configuration for `user_id`.
///
/// # Arguments
/// * `top_level` - Extra top-level keys, e.g. `passive = true`
/// * `network` - Body of the `[network]` table
pub fn write_config(datadir: &Path, user_id: &str, top_level: &str, network: &str) {
    std::fs::create_dir_all(datadir).unwrap();
    std::fs::write(
        datadir.join("config.toml"),
        format!(
            "{top_level}\n\n[identity]\nuser_id = \"{user_id}\"\npassphrase = \"pw\"\n\n[network]\n{network}\n"
        ),
    )
    .unwrap();
}

pub fn start_ready(datadir: &Path, collaborators: Collaborators) -> (RunningDaemon, Arc<AtomicBool>) {
    let daemon = Daemon::with_collaborators(DataDir::new(datadir), collaborators);
    let flag = daemon.shutdown_flag();
    match daemon.start().expect("startup should succeed") {
        Startup::Ready(running) => (running, flag),
        Startup::NeedsFirstRunSetup { .. } => panic!("expected a configured data directory"),
    }
}

/// A daemon serving on a background thread.
pub struct ServingDaemon {
    pub socket_path: PathBuf,
    pub transport: Transport,
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), GatewayError>>>,
}

impl ServingDaemon {
    pub fn spawn(running: RunningDaemon, shutdown_flag: Arc<AtomicBool>) -> Self {
        let socket_path = running.config().socket_path();
        let transport = running.transport().clone();
        let handle = thread::spawn(move || running.serve());
        Self {
            socket_path,
            transport,
            shutdown_flag,
            handle: Some(handle),
        }
    }

    pub fn client(&self) -> IpcClient {
        let client = IpcClient::connect(&self.socket_path).expect("daemon should accept");
        client
            .set_timeout(Some(Duration::from_secs(5)))
            .expect("set timeout");
        client
    }

    pub fn stop(&mut self) -> Result<(), GatewayError> {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        match self.handle.take() {
            Some(handle) => handle.join().expect("serve thread panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for ServingDaemon {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
