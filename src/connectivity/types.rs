//! Common types for connectivity module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Protocol name reported for UPnP IGD gateways
pub const UPNP_PROTOCOL_NAME: &str = "UPnP";

/// Lease requested for every NAT-PMP mapping (one year, never renewed)
pub const PMP_LEASE: Duration = Duration::from_secs(365 * 86_400);

/// IP protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpProtocol {
    /// TCP protocol
    TCP = 6,
    /// UDP protocol
    UDP = 17,
}

impl IpProtocol {
    /// Lowercase protocol name as used by gateway clients
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TCP => "tcp",
            Self::UDP => "udp",
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway protocol families a port mapper can end up talking to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GatewayKind {
    /// Universal Plug and Play Internet Gateway Device
    Upnp,
    /// NAT Port Mapping Protocol (RFC 6886)
    NatPmp,
    /// Port Control Protocol (RFC 6887), when exposed through a PMP-style client
    Pcp,
}

impl GatewayKind {
    /// Protocol name as reported by `PortMapper::protocol_name`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upnp => UPNP_PROTOCOL_NAME,
            Self::NatPmp => "NAT-PMP",
            Self::Pcp => "PCP",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upnp" => Ok(Self::Upnp),
            "nat-pmp" | "natpmp" => Ok(Self::NatPmp),
            "pcp" => Ok(Self::Pcp),
            _ => Err(MappingError::UnknownGatewayType(s.to_string())),
        }
    }
}

/// A mapping this process believes it created on the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingEntry {
    /// External (and internal) port of the mapping
    pub port: u16,
    /// Human-readable label supplied when the mapping was added
    pub label: String,
}

/// Errors that can occur during port mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// Network timeout waiting for response
    #[error("Mapping request timed out")]
    Timeout,

    /// Invalid response from gateway
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Gateway returned an error
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// UPnP IGD control request failed
    #[error("UPnP {action} failed: {source}")]
    Upnp {
        /// IGD action that failed
        action: &'static str,
        /// Error reported by the IGD client
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Neither UPnP nor NAT-PMP discovery produced a usable gateway
    #[error("No UPnP or NAT-PMP gateway found (UPnP: {upnp}; NAT-PMP: {pmp})")]
    NoGateway {
        /// Why UPnP discovery failed
        upnp: String,
        /// Why NAT-PMP discovery failed
        pmp: String,
    },

    /// Gateway type is not one of the known families
    #[error("Unknown gateway type: {0}")]
    UnknownGatewayType(String),

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Gateway family switched off in the discovery options
    #[error("Disabled by discovery options")]
    Disabled,

    /// Protocol not supported on this platform
    #[error("Protocol not supported")]
    NotSupported,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MappingError {
    /// Wrap an IGD client error, keeping it as the source
    pub(crate) fn upnp<E>(action: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upnp {
            action,
            source: Box::new(source),
        }
    }
}
