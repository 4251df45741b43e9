//! NAT-PMP (NAT Port Mapping Protocol) client - RFC 6886
//!
//! NAT-PMP is a compact UDP protocol supported by Apple AirPort devices and
//! many non-UPnP gateways. The client talks to port 5351 on the default
//! gateway and supports:
//! - External IP address requests
//! - UDP and TCP port mappings
//! - Mapping deletion (a MAP request with lifetime 0)
//!
//! Requests are retransmitted starting at 250ms and doubling on every retry,
//! bounded by the client's overall timeout.

use super::gateway::find_default_gateway;
use super::types::{IpProtocol, MappingError};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// NAT-PMP server port (IANA assigned)
const NATPMP_SERVER_PORT: u16 = 5351;

/// NAT-PMP protocol version
pub(crate) const NATPMP_VERSION: u8 = 0;

/// Default overall timeout for a NAT-PMP request, retries included
pub const NATPMP_TIMEOUT: Duration = Duration::from_secs(2);

/// First retransmission interval (RFC 6886 section 3.1)
const NATPMP_INITIAL_RETRY: Duration = Duration::from_millis(250);

/// Largest response we expect (MAP response)
const NATPMP_MAX_RESPONSE: usize = 16;

/// Offset added to the request opcode in responses
const NATPMP_RESPONSE_BIT: u8 = 128;

/// Protocol name reported by this client
const NATPMP_PROTOCOL_NAME: &str = "NAT-PMP";

/// NAT-PMP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum NatPmpOpcode {
    /// External address request
    ExternalAddress = 0,
    /// UDP port mapping
    MapUdp = 1,
    /// TCP port mapping
    MapTcp = 2,
}

impl NatPmpOpcode {
    pub(crate) fn for_protocol(protocol: IpProtocol) -> Self {
        match protocol {
            IpProtocol::UDP => Self::MapUdp,
            IpProtocol::TCP => Self::MapTcp,
        }
    }

    pub(crate) fn response(self) -> u8 {
        NATPMP_RESPONSE_BIT + self as u8
    }
}

/// NAT-PMP result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum NatPmpResultCode {
    Success = 0,
    UnsupportedVersion = 1,
    NotAuthorized = 2,
    NetworkFailure = 3,
    OutOfResources = 4,
    UnsupportedOpcode = 5,
}

impl NatPmpResultCode {
    pub(crate) fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::NetworkFailure),
            4 => Some(Self::OutOfResources),
            5 => Some(Self::UnsupportedOpcode),
            _ => None,
        }
    }

    pub(crate) fn to_error_message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnsupportedVersion => "Unsupported NAT-PMP version",
            Self::NotAuthorized => "Not authorized/refused",
            Self::NetworkFailure => "Network failure",
            Self::OutOfResources => "Out of resources",
            Self::UnsupportedOpcode => "Unsupported opcode",
        }
    }
}

/// Mapping granted by a PMP-style gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmpMapping {
    /// External port the gateway actually assigned
    pub external_port: u16,
    /// Lifetime the gateway actually granted, in seconds
    pub lifetime_secs: u32,
}

/// Operations the port mapper needs from a NAT-PMP (or PCP) gateway
///
/// Unlike UPnP, TCP and UDP mappings are requested separately.
pub trait PmpClient: Send + Sync + 'static {
    /// Name of the protocol actually spoken, e.g. `"NAT-PMP"` or `"PCP"`
    fn protocol_name(&self) -> String;

    /// Public IPv4 address of the gateway
    fn external_address(&self) -> Result<Ipv4Addr, MappingError>;

    /// Map `external_port` on the gateway to `internal_port` on this host
    fn add_port_mapping(
        &self,
        protocol: IpProtocol,
        internal_port: u16,
        external_port: u16,
        description: &str,
        lifetime: Duration,
    ) -> Result<PmpMapping, MappingError>;

    /// Delete the mapping for `internal_port`
    fn delete_port_mapping(&self, protocol: IpProtocol, internal_port: u16)
    -> Result<(), MappingError>;
}

/// Parsed NAT-PMP MAP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NatPmpMapResponse {
    pub epoch_secs: u32,
    pub internal_port: u16,
    pub external_port: u16,
    pub lifetime_secs: u32,
}

/// NAT-PMP client bound to one gateway address
#[derive(Debug, Clone)]
pub struct NatPmpClient {
    server: SocketAddrV4,
    timeout: Duration,
}

impl NatPmpClient {
    /// Create a client for a known gateway without probing it
    pub fn new(gateway: Ipv4Addr, timeout: Duration) -> Self {
        Self::with_server(SocketAddrV4::new(gateway, NATPMP_SERVER_PORT), timeout)
    }

    /// Create a client for a NAT-PMP server listening on a non-standard port
    pub(crate) fn with_server(server: SocketAddrV4, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    /// Locate the default gateway and check that it answers NAT-PMP
    ///
    /// Blocks for at most `timeout` waiting for the external address probe.
    pub fn discover(timeout: Duration) -> Result<Self, MappingError> {
        let gateway = find_default_gateway()?;
        debug!("Probing NAT-PMP on default gateway {}", gateway);

        let client = Self::new(gateway, timeout);
        let external = client.external_address()?;
        info!("Found NAT-PMP gateway at {} (external address {})", gateway, external);

        Ok(client)
    }

    /// Gateway this client talks to
    pub fn gateway(&self) -> Ipv4Addr {
        *self.server.ip()
    }

    /// Send `request` and wait for the response carrying `expected_opcode`
    fn transact(&self, request: &[u8], expected_opcode: u8) -> Result<Vec<u8>, MappingError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        let server_addr = SocketAddr::V4(self.server);
        socket.connect(server_addr)?;

        let deadline = Instant::now() + self.timeout;
        let mut wait = NATPMP_INITIAL_RETRY;
        let mut buf = [0u8; NATPMP_MAX_RESPONSE];

        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!("NAT-PMP request to {} timed out", server_addr);
                return Err(MappingError::Timeout);
            }

            socket.send(request)?;
            trace!("Sent {} byte NAT-PMP request to {}", request.len(), server_addr);
            let resend_at = (now + wait).min(deadline);

            // Stray packets don't trigger a retransmission
            loop {
                let remaining = resend_at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                socket.set_read_timeout(Some(remaining))?;

                match socket.recv(&mut buf) {
                    Ok(n) if n >= 2 && buf[1] == expected_opcode => {
                        trace!("Received {} bytes from NAT-PMP server", n);
                        return Ok(buf[..n].to_vec());
                    }
                    Ok(n) => {
                        trace!("Ignoring unexpected {} byte packet from {}", n, server_addr);
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        break;
                    }
                    Err(e) => return Err(MappingError::Io(e)),
                }
            }
            wait *= 2;
        }
    }

    fn map(
        &self,
        protocol: IpProtocol,
        internal_port: u16,
        suggested_external_port: u16,
        lifetime_secs: u32,
    ) -> Result<NatPmpMapResponse, MappingError> {
        let request =
            build_natpmp_map_request(internal_port, suggested_external_port, lifetime_secs, protocol);
        let opcode = NatPmpOpcode::for_protocol(protocol);
        let response = self.transact(&request, opcode.response())?;
        parse_natpmp_map_response(&response, protocol, internal_port)
    }
}

impl PmpClient for NatPmpClient {
    fn protocol_name(&self) -> String {
        NATPMP_PROTOCOL_NAME.to_string()
    }

    fn external_address(&self) -> Result<Ipv4Addr, MappingError> {
        let request = build_natpmp_external_address_request();
        let response = self.transact(&request, NatPmpOpcode::ExternalAddress.response())?;
        parse_natpmp_external_address_response(&response)
    }

    fn add_port_mapping(
        &self,
        protocol: IpProtocol,
        internal_port: u16,
        external_port: u16,
        _description: &str,
        lifetime: Duration,
    ) -> Result<PmpMapping, MappingError> {
        // NAT-PMP has no field for a description
        let lifetime_secs = u32::try_from(lifetime.as_secs()).unwrap_or(u32::MAX);
        let response = self.map(protocol, internal_port, external_port, lifetime_secs)?;

        debug!(
            "NAT-PMP {} mapping {} -> {} (lifetime: {}s, gateway epoch: {}s)",
            protocol,
            response.external_port,
            response.internal_port,
            response.lifetime_secs,
            response.epoch_secs
        );

        Ok(PmpMapping {
            external_port: response.external_port,
            lifetime_secs: response.lifetime_secs,
        })
    }

    fn delete_port_mapping(
        &self,
        protocol: IpProtocol,
        internal_port: u16,
    ) -> Result<(), MappingError> {
        self.map(protocol, internal_port, 0, 0)?;
        debug!("NAT-PMP {} mapping for port {} deleted", protocol, internal_port);
        Ok(())
    }
}

/// Build a NAT-PMP external address request packet
pub(crate) fn build_natpmp_external_address_request() -> [u8; 2] {
    [NATPMP_VERSION, NatPmpOpcode::ExternalAddress as u8]
}

/// Build a NAT-PMP MAP request packet
///
/// A lifetime of zero together with an external port of zero deletes the
/// mapping for `internal_port`.
pub(crate) fn build_natpmp_map_request(
    internal_port: u16,
    suggested_external_port: u16,
    lifetime_secs: u32,
    protocol: IpProtocol,
) -> Vec<u8> {
    let mut request = Vec::with_capacity(12);

    request.push(NATPMP_VERSION);
    request.push(NatPmpOpcode::for_protocol(protocol) as u8);

    // Reserved, must be zero
    request.extend_from_slice(&[0u8; 2]);

    request.extend_from_slice(&internal_port.to_be_bytes());
    request.extend_from_slice(&suggested_external_port.to_be_bytes());
    request.extend_from_slice(&lifetime_secs.to_be_bytes());

    request
}

/// Validate the common response header and return the epoch field
fn check_natpmp_response_header(
    response: &[u8],
    expected_opcode: u8,
    expected_len: usize,
) -> Result<u32, MappingError> {
    if response.len() < expected_len {
        return Err(MappingError::InvalidResponse(format!(
            "Response too short: {} bytes (expected {})",
            response.len(),
            expected_len
        )));
    }

    let version = response[0];
    if version != NATPMP_VERSION {
        return Err(MappingError::InvalidResponse(format!(
            "Invalid version: {} (expected {})",
            version, NATPMP_VERSION
        )));
    }

    let opcode = response[1];
    if opcode < NATPMP_RESPONSE_BIT {
        return Err(MappingError::InvalidResponse(
            "Received request instead of response".to_string(),
        ));
    }
    if opcode != expected_opcode {
        return Err(MappingError::InvalidResponse(format!(
            "Wrong opcode: got {}, expected {}",
            opcode, expected_opcode
        )));
    }

    let result_code = u16::from_be_bytes([response[2], response[3]]);
    let result = NatPmpResultCode::from_u16(result_code).ok_or_else(|| {
        MappingError::InvalidResponse(format!("Unknown result code: {}", result_code))
    })?;

    if result != NatPmpResultCode::Success {
        return Err(MappingError::GatewayError(
            result.to_error_message().to_string(),
        ));
    }

    Ok(u32::from_be_bytes([response[4], response[5], response[6], response[7]]))
}

/// Parse a NAT-PMP external address response packet (12 bytes)
pub(crate) fn parse_natpmp_external_address_response(
    response: &[u8],
) -> Result<Ipv4Addr, MappingError> {
    check_natpmp_response_header(response, NatPmpOpcode::ExternalAddress.response(), 12)?;

    Ok(Ipv4Addr::new(
        response[8],
        response[9],
        response[10],
        response[11],
    ))
}

/// Parse a NAT-PMP MAP response packet (16 bytes)
///
/// The response must echo the internal port of the request.
pub(crate) fn parse_natpmp_map_response(
    response: &[u8],
    protocol: IpProtocol,
    internal_port: u16,
) -> Result<NatPmpMapResponse, MappingError> {
    let opcode = NatPmpOpcode::for_protocol(protocol).response();
    let epoch_secs = check_natpmp_response_header(response, opcode, 16)?;

    let echoed_port = u16::from_be_bytes([response[8], response[9]]);
    if echoed_port != internal_port {
        return Err(MappingError::InvalidResponse(format!(
            "Internal port mismatch: got {}, expected {}",
            echoed_port, internal_port
        )));
    }

    Ok(NatPmpMapResponse {
        epoch_secs,
        internal_port: echoed_port,
        external_port: u16::from_be_bytes([response[10], response[11]]),
        lifetime_secs: u32::from_be_bytes([response[12], response[13], response[14], response[15]]),
    })
}
