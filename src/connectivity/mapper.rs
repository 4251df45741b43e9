//! Port mapper facade over a single discovered gateway
//!
//! Discovery tries UPnP IGD first and falls back to NAT-PMP. The selected
//! gateway never changes afterwards. Every mapping added through the mapper
//! is recorded in a local registry so it can be enumerated and revoked with
//! [`PortMapper::delete_all`] on shutdown.
//!
//! The registry is a local belief: the router may drop a mapping on its own
//! (reboot, lease expiry, admin action) and the mapper will not notice.
//!
//! # Example
//!
//! ```no_run
//! use portmapper::PortMapper;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mapper = PortMapper::discover().await?;
//! println!("Gateway: {} ({})", mapper.protocol_name(), mapper.external_ip().await?);
//!
//! mapper.add(8333, "node").await?;
//! assert!(mapper.is_port_mapped(8333));
//!
//! mapper.delete_all().await?;
//! # Ok(())
//! # }
//! ```

use super::natpmp::{NatPmpClient, PmpClient};
use super::types::{GatewayKind, IpProtocol, MappingEntry, MappingError, PMP_LEASE, UPNP_PROTOCOL_NAME};
use super::upnp::{IgdClient, UpnpClient};
use crate::config::DiscoveryOptions;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The gateway a port mapper talks to
///
/// The two families expose different operations (UPnP bundles TCP and UDP
/// behind one forward, NAT-PMP maps them separately), so the mapper keeps a
/// tag and dispatches on it rather than hiding both behind one trait.
#[derive(Debug)]
pub enum Gateway<U, P> {
    /// UPnP Internet Gateway Device
    Upnp(U),
    /// NAT-PMP (or PCP) gateway
    Pmp(P),
}

impl<U: UpnpClient, P: PmpClient> Gateway<U, P> {
    /// Protocol name reported for this gateway
    pub fn protocol_name(&self) -> String {
        match self {
            Self::Upnp(_) => UPNP_PROTOCOL_NAME.to_string(),
            Self::Pmp(client) => client.protocol_name(),
        }
    }

    /// Query the public IPv4 address, blocking on the gateway
    pub fn external_ip(&self) -> Result<String, MappingError> {
        match self {
            Self::Upnp(client) => client.external_ip(),
            Self::Pmp(client) => client.external_address().map(|addr| addr.to_string()),
        }
    }

    /// Forward `port` (TCP and UDP) to this host, blocking on the gateway
    ///
    /// For NAT-PMP the TCP mapping is requested first. If it succeeds and the
    /// UDP request then fails, the TCP mapping is left on the gateway and the
    /// UDP error is returned.
    pub fn add(&self, port: u16, description: &str) -> Result<(), MappingError> {
        match self {
            Self::Upnp(client) => client.forward(port, description),
            Self::Pmp(client) => {
                for protocol in [IpProtocol::TCP, IpProtocol::UDP] {
                    let granted =
                        client.add_port_mapping(protocol, port, port, description, PMP_LEASE)?;
                    if granted.external_port != port {
                        debug!(
                            "Gateway assigned external {} port {} for requested port {}",
                            protocol, granted.external_port, port
                        );
                    }
                }
                Ok(())
            }
        }
    }

    /// Remove the TCP and UDP mappings for `port`, blocking on the gateway
    pub fn delete(&self, port: u16) -> Result<(), MappingError> {
        match self {
            Self::Upnp(client) => client.clear(port),
            Self::Pmp(client) => {
                client.delete_port_mapping(IpProtocol::TCP, port)?;
                client.delete_port_mapping(IpProtocol::UDP, port)
            }
        }
    }
}

/// Uniform port mapping facade over one UPnP or NAT-PMP gateway
///
/// All gateway round-trips run on tokio's blocking pool, so the mapper can be
/// shared (e.g. behind an `Arc`) and driven from many tasks at once.
#[derive(Debug)]
pub struct PortMapper<U = IgdClient, P = NatPmpClient> {
    gateway: Arc<Gateway<U, P>>,
    protocol_name: String,
    registry: Arc<DashMap<u16, String>>,
}

impl PortMapper {
    /// Discover a gateway with default options
    pub async fn discover() -> Result<Self, MappingError> {
        Self::discover_with_options(&DiscoveryOptions::default()).await
    }

    /// Discover a gateway, honouring the enabled families and timeouts
    pub async fn discover_with_options(options: &DiscoveryOptions) -> Result<Self, MappingError> {
        let upnp_enabled = options.upnp_enabled;
        let upnp_timeout = options.upnp_timeout();
        let pmp_enabled = options.nat_pmp_enabled;
        let pmp_timeout = options.nat_pmp_timeout();

        Self::discover_with(
            move || {
                if !upnp_enabled {
                    return Err(MappingError::Disabled);
                }
                IgdClient::discover(upnp_timeout)
            },
            move || {
                if !pmp_enabled {
                    return Err(MappingError::Disabled);
                }
                NatPmpClient::discover(pmp_timeout)
            },
        )
        .await
    }

    /// Load [`DiscoveryOptions`] from a JSON file and discover with them
    ///
    /// A missing file means default options.
    pub async fn discover_from_file<Q: AsRef<Path>>(path: Q) -> crate::Result<Self> {
        let options = DiscoveryOptions::load(path)?;
        Ok(Self::discover_with_options(&options).await?)
    }
}

impl<U: UpnpClient, P: PmpClient> PortMapper<U, P> {
    /// Discover a gateway using the given probes
    ///
    /// `upnp_probe` runs first; `pmp_probe` only runs if it fails. If both
    /// fail the result is [`MappingError::NoGateway`] carrying both reasons.
    /// Discovery is one-shot: there is no retry or later failover.
    pub async fn discover_with<FU, FP>(upnp_probe: FU, pmp_probe: FP) -> Result<Self, MappingError>
    where
        FU: FnOnce() -> Result<U, MappingError> + Send + 'static,
        FP: FnOnce() -> Result<P, MappingError> + Send + 'static,
    {
        let upnp_error = match run_blocking(upnp_probe).await {
            Ok(client) => return Ok(Self::from_gateway(Gateway::Upnp(client))),
            Err(e) => e,
        };
        debug!("UPnP discovery failed: {}", upnp_error);

        let pmp_error = match run_blocking(pmp_probe).await {
            Ok(client) => return Ok(Self::from_gateway(Gateway::Pmp(client))),
            Err(e) => e,
        };
        debug!("NAT-PMP discovery failed: {}", pmp_error);

        Err(MappingError::NoGateway {
            upnp: upnp_error.to_string(),
            pmp: pmp_error.to_string(),
        })
    }

    /// Build a mapper around an already discovered gateway
    pub fn from_gateway(gateway: Gateway<U, P>) -> Self {
        let protocol_name = gateway.protocol_name();
        info!("Using {} gateway for port mapping", protocol_name);

        Self {
            gateway: Arc::new(gateway),
            protocol_name,
            registry: Arc::new(DashMap::new()),
        }
    }

    /// Name of the protocol spoken with the gateway (`"UPnP"`, `"NAT-PMP"`, ...)
    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    /// Protocol family of the gateway
    ///
    /// Fails with [`MappingError::UnknownGatewayType`] when a PMP client
    /// reports a protocol name outside the known families.
    pub fn kind(&self) -> Result<GatewayKind, MappingError> {
        self.protocol_name.parse()
    }

    /// The gateway handle selected at discovery
    pub fn gateway(&self) -> &Gateway<U, P> {
        &self.gateway
    }

    /// Public IPv4 address of the gateway in dotted-quad form
    pub async fn external_ip(&self) -> Result<String, MappingError> {
        let gateway = Arc::clone(&self.gateway);
        run_blocking(move || gateway.external_ip()).await
    }

    /// Forward inbound TCP and UDP traffic on `port` to this host
    ///
    /// Port numbers are passed through untouched; the gateway decides whether
    /// to accept privileged or zero ports. On success `port` is recorded with
    /// `label`, replacing any previous label. On failure the registry is left
    /// as it was. See [`Gateway::add`] for the NAT-PMP partial failure case.
    ///
    /// The registry is updated on the blocking pool as soon as the gateway
    /// accepts, even if this future is dropped before then.
    pub async fn add(&self, port: u16, label: &str) -> Result<(), MappingError> {
        let gateway = Arc::clone(&self.gateway);
        let registry = Arc::clone(&self.registry);
        let label = label.to_string();
        let protocol_name = self.protocol_name.clone();

        run_blocking(move || {
            gateway.add(port, &label)?;
            debug!("Mapped port {} via {} ({})", port, protocol_name, label);
            registry.insert(port, label);
            Ok(())
        })
        .await
    }

    /// Remove the mapping for `port`
    ///
    /// The request is sent to the gateway even if `port` is not registered.
    /// The registry entry is only dropped once the gateway confirms.
    pub async fn delete(&self, port: u16) -> Result<(), MappingError> {
        let gateway = Arc::clone(&self.gateway);
        let registry = Arc::clone(&self.registry);
        let protocol_name = self.protocol_name.clone();

        run_blocking(move || {
            gateway.delete(port)?;
            registry.remove(&port);
            debug!("Unmapped port {} via {}", port, protocol_name);
            Ok(())
        })
        .await
    }

    /// Delete every registered mapping
    ///
    /// Stops at the first failure and returns it. Ports deleted before that
    /// are unregistered; the failed port and any not yet attempted stay
    /// registered, so calling this again continues where it stopped.
    pub async fn delete_all(&self) -> Result<(), MappingError> {
        let mut ports: Vec<u16> = self.registry.iter().map(|entry| *entry.key()).collect();
        ports.sort_unstable();

        for port in ports {
            self.delete(port).await?;
        }
        Ok(())
    }

    /// Whether `port` is currently registered as mapped by this mapper
    pub fn is_port_mapped(&self, port: u16) -> bool {
        self.registry.contains_key(&port)
    }

    /// Label recorded for `port`, if it is registered
    pub fn label(&self, port: u16) -> Option<String> {
        self.registry.get(&port).map(|entry| entry.value().clone())
    }

    /// Snapshot of all registered mappings, ordered by port
    pub fn mappings(&self) -> Vec<MappingEntry> {
        let mut entries: Vec<MappingEntry> = self
            .registry
            .iter()
            .map(|entry| MappingEntry {
                port: *entry.key(),
                label: entry.value().clone(),
            })
            .collect();
        entries.sort_unstable_by_key(|entry| entry.port);
        entries
    }

    /// Number of registered mappings
    pub fn mapped_count(&self) -> usize {
        self.registry.len()
    }
}

/// Run a blocking gateway call on tokio's blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T, MappingError>
where
    F: FnOnce() -> Result<T, MappingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
}
