//! Gateway discovery options

use crate::connectivity::natpmp::NATPMP_TIMEOUT;
use crate::connectivity::upnp::UPNP_TIMEOUT;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options controlling gateway discovery
///
/// The port mapper never reads these on its own; callers that want them
/// persisted load and save them explicitly. Missing fields fall back to the
/// defaults.
///
/// # Example
/// ```rust,no_run
/// use portmapper::{DiscoveryOptions, PortMapper};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Load options (returns default if file doesn't exist)
/// let mut options = DiscoveryOptions::load("portmapper.json")?;
/// options.upnp_enabled = false;
/// options.save("portmapper.json")?;
///
/// let mapper = PortMapper::discover_with_options(&options).await?;
/// println!("Using {}", mapper.protocol_name());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Try UPnP IGD discovery
    pub upnp_enabled: bool,
    /// Try NAT-PMP discovery if UPnP fails or is disabled
    pub nat_pmp_enabled: bool,
    /// Upper bound on the SSDP search, in milliseconds
    pub upnp_timeout_ms: u64,
    /// Upper bound on each NAT-PMP request including retransmissions, in milliseconds
    pub nat_pmp_timeout_ms: u64,
}

impl DiscoveryOptions {
    /// Load options from a JSON file
    ///
    /// Returns the defaults when the file doesn't exist or is empty.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse options: {}", e)))
    }

    /// Save options to a JSON file, creating parent directories as needed
    ///
    /// Filesystem failures surface as [`Error::Io`].
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        std::fs::write(path, json)?;

        Ok(())
    }

    /// SSDP search timeout
    pub fn upnp_timeout(&self) -> Duration {
        Duration::from_millis(self.upnp_timeout_ms)
    }

    /// NAT-PMP request timeout
    pub fn nat_pmp_timeout(&self) -> Duration {
        Duration::from_millis(self.nat_pmp_timeout_ms)
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            upnp_enabled: true,
            nat_pmp_enabled: true,
            upnp_timeout_ms: UPNP_TIMEOUT.as_millis() as u64,
            nat_pmp_timeout_ms: NATPMP_TIMEOUT.as_millis() as u64,
        }
    }
}
