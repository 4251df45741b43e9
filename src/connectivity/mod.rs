//! Connectivity module for NAT port mapping
//!
//! This module asks the local gateway to forward ports to this host through
//! one of two protocol families:
//! - UPnP IGD (Universal Plug and Play Internet Gateway Device)
//! - NAT-PMP (NAT Port Mapping Protocol) - RFC 6886
//!
//! [`PortMapper`] picks exactly one gateway at discovery (UPnP first) and
//! keeps a registry of the mappings it created.

// Submodules
pub mod gateway;
pub mod mapper;
pub mod natpmp;
pub mod types;
pub mod upnp;

// Re-export commonly used types
pub use types::{GatewayKind, IpProtocol, MappingEntry, MappingError, PMP_LEASE, UPNP_PROTOCOL_NAME};

// Re-export main entry points
pub use gateway::find_default_gateway;
pub use mapper::{Gateway, PortMapper};
pub use natpmp::{NatPmpClient, PmpClient, PmpMapping};
pub use upnp::{IgdClient, UpnpClient};
