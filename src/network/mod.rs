//! Network bootstrap: decides how (and whether) the session gets a transport.
//!
//! Three paths, checked in order:
//! 1. passive mode builds no connection at all,
//! 2. without port mapping the configured address is used directly,
//! 3. with port mapping the router is asked for a mapping; any failure there
//!    degrades to a passive-networking connection and startup continues.

pub mod portmap;

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::config::{Config, NetworkConfig};
pub use portmap::{attempt_mapping, IgdPortMapper, PortMapError, PortMapOutcome, PortMapper};

/// Transport parameters handed to the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub address: String,
    pub port: u16,
    /// Ask the engine to forward the port itself. Always off here: the
    /// bootstrapper has either mapped the port already or given up on it.
    pub forward_port: bool,
    /// Engine should not accept inbound connections.
    pub passive: bool,
}

impl Connection {
    pub fn direct(network: &NetworkConfig) -> Self {
        Self {
            address: network.address.clone(),
            port: network.port,
            forward_port: false,
            passive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Passive mode: no connection was constructed.
    Offline,
    Connected(Connection),
}

impl Transport {
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Transport::Offline => None,
            Transport::Connected(connection) => Some(connection),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Passive,
    Direct,
    PortMapped,
}

impl NetworkMode {
    pub fn from_config(config: &Config) -> Self {
        if config.passive {
            NetworkMode::Passive
        } else if config.network.portmap {
            NetworkMode::PortMapped
        } else {
            NetworkMode::Direct
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkMode::Passive => "passive",
            NetworkMode::Direct => "direct",
            NetworkMode::PortMapped => "port-mapped",
        };
        f.write_str(name)
    }
}

/// Connection parameters for a port-mapping attempt's outcome.
pub fn plan_connection(network: &NetworkConfig, outcome: &PortMapOutcome) -> Connection {
    match outcome {
        PortMapOutcome::Mapped { external_address } => Connection {
            address: external_address.to_string(),
            port: network.port,
            forward_port: false,
            passive: false,
        },
        PortMapOutcome::Unmapped { .. } => Connection {
            address: network.address.clone(),
            port: network.port,
            forward_port: false,
            passive: true,
        },
    }
}

pub struct NetworkBootstrapper<'a> {
    mapper: &'a dyn PortMapper,
}

impl<'a> NetworkBootstrapper<'a> {
    pub fn new(mapper: &'a dyn PortMapper) -> Self {
        Self { mapper }
    }

    /// Establish the transport for `config`. Never fails.
    pub fn connect(&self, config: &Config) -> Transport {
        let mode = NetworkMode::from_config(config);
        info!("Network mode: {mode}");

        match mode {
            NetworkMode::Passive => Transport::Offline,
            NetworkMode::Direct => Transport::Connected(Connection::direct(&config.network)),
            NetworkMode::PortMapped => {
                let outcome = attempt_mapping(self.mapper, config.network.port);
                match &outcome {
                    PortMapOutcome::Mapped { external_address } => info!(
                        "Mapped port {} on the router, reachable at {}",
                        config.network.port, external_address
                    ),
                    PortMapOutcome::Unmapped { reason } => warn!(
                        "Port mapping failed ({reason}), continuing with passive networking"
                    ),
                }
                Transport::Connected(plan_connection(&config.network, &outcome))
            }
        }
    }
}
