//! UPnP port mapping.

use igd_next::{search_gateway, Gateway, PortMappingProtocol, SearchOptions};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// How long to wait for a gateway to answer the SSDP search.
const GATEWAY_SEARCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Description attached to mappings created on the router.
const MAPPING_DESCRIPTION: &str = "murmur";

#[derive(Debug, Error)]
pub enum PortMapError {
    #[error("no UPnP gateway found: {0}")]
    Discovery(String),

    #[error("could not determine local address: {0}")]
    LocalAddress(#[source] std::io::Error),

    #[error("port mapping rejected: {0}")]
    Mapping(String),

    #[error("external address lookup failed: {0}")]
    ExternalAddress(String),
}

/// Result of trying to become reachable through the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortMapOutcome {
    Mapped { external_address: IpAddr },
    Unmapped { reason: String },
}

/// Router port mapping, as consumed by the network bootstrapper.
pub trait PortMapper: Send + Sync {
    /// Map external `port` to the same local port, with no expiry.
    fn map_port(&self, port: u16) -> Result<(), PortMapError>;

    /// The router's external address.
    fn external_ip(&self) -> Result<IpAddr, PortMapError>;
}

/// Map the port, then ask for the external address. Either failure yields `Unmapped`.
pub fn attempt_mapping(mapper: &dyn PortMapper, port: u16) -> PortMapOutcome {
    if let Err(e) = mapper.map_port(port) {
        return PortMapOutcome::Unmapped {
            reason: e.to_string(),
        };
    }

    match mapper.external_ip() {
        Ok(external_address) => PortMapOutcome::Mapped { external_address },
        Err(e) => PortMapOutcome::Unmapped {
            reason: e.to_string(),
        },
    }
}

/// [`PortMapper`] backed by an Internet Gateway Device found over SSDP.
///
/// The gateway is searched for on first use and reused afterwards.
pub struct IgdPortMapper {
    search_timeout: Duration,
    gateway: Mutex<Option<Gateway>>,
}

impl Default for IgdPortMapper {
    fn default() -> Self {
        Self::new(GATEWAY_SEARCH_TIMEOUT)
    }
}

impl IgdPortMapper {
    pub fn new(search_timeout: Duration) -> Self {
        Self {
            search_timeout,
            gateway: Mutex::new(None),
        }
    }

    fn with_gateway<T>(
        &self,
        f: impl FnOnce(&Gateway) -> Result<T, PortMapError>,
    ) -> Result<T, PortMapError> {
        let mut slot = self
            .gateway
            .lock()
            .map_err(|_| PortMapError::Discovery("gateway lock poisoned".to_string()))?;

        if slot.is_none() {
            let options = SearchOptions {
                timeout: Some(self.search_timeout),
                ..Default::default()
            };
            let gateway =
                search_gateway(options).map_err(|e| PortMapError::Discovery(e.to_string()))?;
            *slot = Some(gateway);
        }

        match slot.as_ref() {
            Some(gateway) => f(gateway),
            None => Err(PortMapError::Discovery("gateway unavailable".to_string())),
        }
    }
}

impl PortMapper for IgdPortMapper {
    fn map_port(&self, port: u16) -> Result<(), PortMapError> {
        self.with_gateway(|gateway| {
            let local_ip = local_address_towards(gateway.addr)?;
            gateway
                .add_port(
                    PortMappingProtocol::TCP,
                    port,
                    SocketAddr::new(local_ip, port),
                    0,
                    MAPPING_DESCRIPTION,
                )
                .map_err(|e| PortMapError::Mapping(e.to_string()))
        })
    }

    fn external_ip(&self) -> Result<IpAddr, PortMapError> {
        self.with_gateway(|gateway| {
            gateway
                .get_external_ip()
                .map_err(|e| PortMapError::ExternalAddress(e.to_string()))
        })
    }
}

/// The local interface address the OS would route through to reach `peer`.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn local_address_towards(peer: SocketAddr) -> Result<IpAddr, PortMapError> {
    let bind_addr = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).map_err(PortMapError::LocalAddress)?;
    socket.connect(peer).map_err(PortMapError::LocalAddress)?;
    Ok(socket.local_addr().map_err(PortMapError::LocalAddress)?.ip())
}
