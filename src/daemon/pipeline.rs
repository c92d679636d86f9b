//! Ordered, fail-fast daemon startup.
//!
//! Stages run strictly in sequence on the calling thread:
//! data directory, identity, network, session, gateway. A failing stage
//! stops the pipeline; side effects of earlier stages are kept.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::gateway::{Gateway, GatewayError};
use crate::config::Config;
use crate::fs::data_dir::{DataDir, DataDirError, Provisioned};
use crate::identity::{Ed25519KeyGenerator, Identity, IdentityError, IdentityProvisioner, KeyGenerator};
use crate::network::{IgdPortMapper, NetworkBootstrapper, PortMapper, Transport};
use crate::session::{
    await_ready, LocalSessionFactory, SessionError, SessionEvent, SessionFactory, SessionOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DataDirectory,
    Identity,
    Network,
    Session,
    Gateway,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DataDirectory => "data directory",
            Stage::Identity => "identity",
            Stage::Network => "network",
            Stage::Session => "session",
            Stage::Gateway => "IPC gateway",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    DataDir(#[from] DataDirError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Error)]
#[error("startup failed at {stage} stage: {source}")]
pub struct StartupError {
    pub stage: Stage,
    #[source]
    pub source: StageFailure,
}

fn at_stage<E: Into<StageFailure>>(stage: Stage) -> impl FnOnce(E) -> StartupError {
    move |e| StartupError {
        stage,
        source: e.into(),
    }
}

/// Where the pipeline stopped, short of failing.
pub enum Startup {
    /// No configuration existed. The template was written; nothing else ran.
    NeedsFirstRunSetup { config_path: PathBuf },
    Ready(RunningDaemon),
}

/// The pluggable pieces of the pipeline.
pub struct Collaborators {
    pub keys: Box<dyn KeyGenerator>,
    pub port_mapper: Box<dyn PortMapper>,
    pub sessions: Box<dyn SessionFactory>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            keys: Box::new(Ed25519KeyGenerator),
            port_mapper: Box::new(IgdPortMapper::default()),
            sessions: Box::new(LocalSessionFactory),
        }
    }
}

pub struct Daemon {
    data_dir: DataDir,
    collaborators: Collaborators,
    shutdown_flag: Arc<AtomicBool>,
}

impl Daemon {
    pub fn new(data_dir: DataDir) -> Self {
        Self::with_collaborators(data_dir, Collaborators::default())
    }

    pub fn with_collaborators(data_dir: DataDir, collaborators: Collaborators) -> Self {
        Self {
            data_dir,
            collaborators,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the gateway once set. Shared with the running daemon.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Run every startup stage in order.
    pub fn start(self) -> Result<Startup, StartupError> {
        let config = match self.data_dir.ensure().map_err(at_stage(Stage::DataDirectory))? {
            Provisioned::FirstRun { config_path } => {
                info!(
                    "Wrote default configuration to {}; fill it in and start again",
                    config_path.display()
                );
                return Ok(Startup::NeedsFirstRunSetup { config_path });
            }
            Provisioned::Loaded(config) => config,
        };
        info!("Loaded configuration from {}", self.data_dir.config_path().display());

        let identity = provision_identity(self.collaborators.keys.as_ref(), &config)
            .map_err(at_stage(Stage::Identity))?;
        info!(
            "Identity {} ({})",
            identity.user_id(),
            identity.fingerprint()
        );

        let transport =
            NetworkBootstrapper::new(self.collaborators.port_mapper.as_ref()).connect(&config);

        if config.promiscuous {
            warn!("PROMISCUOUS MODE: outbound certificate validation is DISABLED");
        }
        let opened = self
            .collaborators
            .sessions
            .open(
                &identity,
                transport.clone(),
                SessionOptions {
                    store_path: config.store_path(),
                    promiscuous: config.promiscuous,
                },
            )
            .map_err(at_stage(Stage::Session))?;
        await_ready(&opened.events).map_err(at_stage(Stage::Session))?;
        info!("Session ready");

        let gateway = Gateway::bind(
            &config.socket_path(),
            opened.session,
            Arc::clone(&self.shutdown_flag),
        )
        .map_err(at_stage(Stage::Gateway))?;

        Ok(Startup::Ready(RunningDaemon {
            config,
            identity,
            transport,
            gateway,
            events: opened.events,
        }))
    }
}

fn provision_identity(keys: &dyn KeyGenerator, config: &Config) -> Result<Identity, IdentityError> {
    IdentityProvisioner::new(keys).ensure(config)?;
    IdentityProvisioner::load(
        &config.public_key_path(),
        &config.private_key_path(),
        &config.identity.user_id,
        &config.identity.passphrase,
    )
}

/// A daemon whose gateway is bound but not yet serving.
pub struct RunningDaemon {
    config: Config,
    identity: Identity,
    transport: Transport,
    gateway: Gateway,
    events: Receiver<SessionEvent>,
}

impl RunningDaemon {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Serve IPC clients until shutdown is requested.
    pub fn serve(self) -> Result<(), GatewayError> {
        let RunningDaemon {
            gateway, events, ..
        } = self;
        gateway.serve(events)
    }
}
