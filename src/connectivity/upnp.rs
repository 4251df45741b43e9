//! UPnP IGD (Internet Gateway Device) client
//!
//! UPnP uses SSDP (Simple Service Discovery Protocol) to discover IGD devices
//! on the local network, then uses SOAP to communicate with the gateway. The
//! wire work is done by `igd-next`; this module only adapts it to the
//! forward/clear surface the port mapper dispatches to.

use super::types::{IpProtocol, MappingError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for the SSDP gateway search
pub const UPNP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lease requested from the IGD. Zero means "until cleared or router reboot".
const UPNP_LEASE_SECS: u32 = 0;

/// Operations the port mapper needs from a UPnP IGD gateway
///
/// `forward` and `clear` always cover both TCP and UDP for the port.
pub trait UpnpClient: Send + Sync + 'static {
    /// Public address of the gateway as a printable string
    fn external_ip(&self) -> Result<String, MappingError>;

    /// Forward external `port` (TCP and UDP) to the same port on this host
    fn forward(&self, port: u16, description: &str) -> Result<(), MappingError>;

    /// Remove the TCP and UDP forwards for `port`
    fn clear(&self, port: u16) -> Result<(), MappingError>;
}

/// UPnP client backed by an `igd-next` gateway handle
#[derive(Debug, Clone)]
pub struct IgdClient {
    gateway: igd_next::Gateway,
    local_ip: Ipv4Addr,
}

impl IgdClient {
    /// Search the LAN for an IGD, waiting at most `timeout`
    ///
    /// This blocks the calling thread for the duration of the search.
    pub fn discover(timeout: Duration) -> Result<Self, MappingError> {
        debug!("Searching for UPnP IGD gateway (timeout: {:?})...", timeout);
        let gateway = igd_next::search_gateway(igd_next::SearchOptions {
            timeout: Some(timeout),
            ..Default::default()
        })
        .map_err(|e| {
            debug!("UPnP gateway search failed: {}", e);
            MappingError::GatewayError(format!("UPnP gateway search failed: {}", e))
        })?;

        let local_ip = local_ip_for_gateway(gateway.addr)?;
        info!("Found UPnP gateway at {} (local address {})", gateway.addr, local_ip);

        Ok(Self { gateway, local_ip })
    }

    /// Address of the IGD control endpoint
    pub fn gateway_addr(&self) -> SocketAddr {
        self.gateway.addr
    }

    /// Local address mappings are forwarded to
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    fn add_port(&self, protocol: IpProtocol, port: u16, description: &str) -> Result<(), MappingError> {
        let local_addr = SocketAddr::new(IpAddr::V4(self.local_ip), port);
        debug!("Adding UPnP {} mapping {} -> {}", protocol, port, local_addr);

        self.gateway
            .add_port(
                upnp_protocol(protocol),
                port,
                local_addr,
                UPNP_LEASE_SECS,
                description,
            )
            .map_err(|e| MappingError::upnp("AddPortMapping", e))
    }

    fn remove_port(&self, protocol: IpProtocol, port: u16) -> Result<(), MappingError> {
        debug!("Removing UPnP {} mapping for port {}", protocol, port);

        self.gateway
            .remove_port(upnp_protocol(protocol), port)
            .map_err(|e| MappingError::upnp("DeletePortMapping", e))
    }
}

impl UpnpClient for IgdClient {
    fn external_ip(&self) -> Result<String, MappingError> {
        let ip = self
            .gateway
            .get_external_ip()
            .map_err(|e| MappingError::upnp("GetExternalIPAddress", e))?;
        Ok(ip.to_string())
    }

    fn forward(&self, port: u16, description: &str) -> Result<(), MappingError> {
        self.add_port(IpProtocol::TCP, port, description)?;
        self.add_port(IpProtocol::UDP, port, description)
    }

    fn clear(&self, port: u16) -> Result<(), MappingError> {
        self.remove_port(IpProtocol::TCP, port)?;
        self.remove_port(IpProtocol::UDP, port)
    }
}

fn upnp_protocol(protocol: IpProtocol) -> igd_next::PortMappingProtocol {
    match protocol {
        IpProtocol::TCP => igd_next::PortMappingProtocol::TCP,
        IpProtocol::UDP => igd_next::PortMappingProtocol::UDP,
    }
}

/// Local IPv4 address the OS would use to reach the gateway
///
/// Connecting a UDP socket sends nothing; it only resolves the route.
fn local_ip_for_gateway(gateway: SocketAddr) -> Result<Ipv4Addr, MappingError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| MappingError::Internal(format!("Failed to create socket: {}", e)))?;

    socket
        .connect(gateway)
        .map_err(|e| MappingError::Internal(format!("Failed to connect: {}", e)))?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| MappingError::Internal(format!("Failed to get local address: {}", e)))?;

    match local_addr.ip() {
        IpAddr::V4(ipv4) => Ok(ipv4),
        IpAddr::V6(_) => Err(MappingError::Internal(
            "UPnP requires IPv4 address".to_string(),
        )),
    }
}
