//! Portmapper - ask the local NAT gateway to forward ports to this host
//!
//! This library discovers a single UPnP IGD or NAT-PMP gateway on the local
//! network and exposes one uniform surface on top of it: add/delete TCP+UDP
//! forwards, query the public IPv4 address, and tear down every mapping this
//! process created.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectivity;

pub use config::DiscoveryOptions;
pub use connectivity::{Gateway, MappingError, PortMapper};

/// Result type alias for portmapper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for portmapper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or saving error
    #[error("Config error: {0}")]
    Config(String),

    /// Port mapping error
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize logging for binaries and tests embedding the library
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
