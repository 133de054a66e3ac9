//! Mapping controller - protocol agnostic list/add/remove
//!
//! The controller is the only layer that knows about command intents. It
//! validates caller input before touching the network, acquires a fresh
//! transport for each command, and folds every outcome into an
//! [`OperationResult`].
//!
//! # Example
//!
//! ```no_run
//! use gatewayctl::config::Config;
//! use gatewayctl::connectivity::{
//!     AddRequest, MappingController, MappingProtocol, SystemTransports, TransportProtocol,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let controller = MappingController::new(SystemTransports::new(config.clone()), config);
//!
//! let result = controller
//!     .add(AddRequest {
//!         internal_ip: Some("192.168.1.50".to_string()),
//!         ..AddRequest::new(MappingProtocol::UPnP, TransportProtocol::TCP, 8080, 8080)
//!     })
//!     .await?;
//! println!("{}", result);
//! # Ok(())
//! # }
//! ```

use super::gateway::find_default_gateway;
use super::natpmp::{NatPmpTransport, UdpNatPmpTransport};
use super::session::{NatPmpSession, UpnpSession};
use super::types::{
    Detail, MappingError, MappingProtocol, OperationResult, PortMapping, TransportProtocol,
    ValidationError,
};
use super::upnp::{IgdNextTransport, IgdTransport};
use crate::config::Config;
use chrono::Utc;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Notice attached to every NAT-PMP listing
pub const NATPMP_LIST_NOTICE: &str =
    "NAT-PMP does not support full port listing; you must manually manage mappings.";

/// Source of per-command transports
///
/// Each controller operation asks for a new transport and drops it when the
/// operation returns, so sockets never outlive a command.
pub trait Transports {
    /// UPnP transport
    type Igd: IgdTransport;
    /// NAT-PMP transport
    type NatPmp: NatPmpTransport;

    /// Create a UPnP transport; performs no I/O
    fn igd(&self) -> Self::Igd;

    /// Create a NAT-PMP transport for the gateway; performs no network I/O
    fn natpmp(&self) -> Result<Self::NatPmp, MappingError>;
}

/// Transports that talk to the real network
#[derive(Debug, Clone)]
pub struct SystemTransports {
    config: Config,
}

impl SystemTransports {
    /// Build transports from configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Transports for SystemTransports {
    type Igd = IgdNextTransport;
    type NatPmp = UdpNatPmpTransport;

    fn igd(&self) -> Self::Igd {
        IgdNextTransport::new(self.config.discovery_window(), self.config.control_timeout())
    }

    fn natpmp(&self) -> Result<Self::NatPmp, MappingError> {
        let gateway = match self.config.natpmp_gateway {
            Some(gateway) => gateway,
            None => find_default_gateway()?,
        };
        debug!("Using NAT-PMP gateway {}", gateway);
        Ok(UdpNatPmpTransport::new(gateway, self.config.retry_policy()))
    }
}

/// Parameters of an add intent, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// Control protocol
    pub method: MappingProtocol,
    /// Forwarded protocol
    pub protocol: TransportProtocol,
    /// Port to open on the gateway
    pub external_port: Option<u32>,
    /// Port on the internal host
    pub internal_port: Option<u32>,
    /// Internal host literal (UPnP only)
    pub internal_ip: Option<String>,
    /// Description stored on the gateway
    pub description: Option<String>,
    /// Lease in seconds
    pub lease_duration: Option<u32>,
}

impl AddRequest {
    /// Request with both ports set and everything else defaulted
    pub fn new(
        method: MappingProtocol,
        protocol: TransportProtocol,
        external_port: u32,
        internal_port: u32,
    ) -> Self {
        Self {
            method,
            protocol,
            external_port: Some(external_port),
            internal_port: Some(internal_port),
            internal_ip: None,
            description: None,
            lease_duration: None,
        }
    }
}

/// Parameters of a remove intent, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    /// Control protocol
    pub method: MappingProtocol,
    /// Forwarded protocol
    pub protocol: TransportProtocol,
    /// Port to release on the gateway
    pub external_port: Option<u32>,
    /// Internal port the mapping was created with (NAT-PMP only)
    pub internal_port: Option<u32>,
}

/// Orchestrates discovery and gateway calls for one intent at a time
pub struct MappingController<P: Transports> {
    transports: P,
    config: Config,
}

impl<P: Transports> MappingController<P> {
    /// Create a controller
    pub fn new(transports: P, config: Config) -> Self {
        Self { transports, config }
    }

    /// Transports used by this controller
    pub fn transports(&self) -> &P {
        &self.transports
    }

    /// Report the external address and, where the protocol allows, every mapping
    pub async fn list(&self, method: MappingProtocol) -> OperationResult {
        info!("Listing port mappings via {}", method);

        let result = match method {
            MappingProtocol::UPnP => self.list_upnp().await,
            MappingProtocol::NATPMP => self.list_natpmp().await,
        };
        finish("list", result)
    }

    /// Create a mapping
    ///
    /// Missing or malformed parameters are rejected before any transport is
    /// created.
    pub async fn add(&self, request: AddRequest) -> Result<OperationResult, ValidationError> {
        let method = request.method;
        let external_port = require_port(method, "add", "--external-port", request.external_port)?;
        let internal_port = require_port(method, "add", "--internal-port", request.internal_port)?;
        let description = request
            .description
            .unwrap_or_else(|| self.config.default_description.clone());

        let result = match method {
            MappingProtocol::UPnP => {
                let raw_ip = request
                    .internal_ip
                    .ok_or(ValidationError::MissingParameter {
                        method,
                        intent: "add",
                        parameter: "--internal-ip",
                    })?;
                let internal_ip: IpAddr = raw_ip
                    .trim()
                    .parse()
                    .map_err(|_| ValidationError::InvalidAddress(raw_ip.clone()))?;

                let mapping = PortMapping {
                    protocol: request.protocol,
                    external_port,
                    internal_port,
                    internal_ip: Some(internal_ip),
                    description: Some(description),
                    lease_duration: Some(request.lease_duration.unwrap_or(0)),
                };
                self.add_upnp(mapping).await
            }
            MappingProtocol::NATPMP => {
                if let Some(raw_ip) = request.internal_ip {
                    return Ok(OperationResult::Unsupported(format!(
                        "NAT-PMP maps the requesting host only; --internal-ip {} cannot be honored",
                        raw_ip
                    )));
                }

                let lifetime_secs = request
                    .lease_duration
                    .unwrap_or(self.config.default_lifetime_secs);
                if lifetime_secs == 0 {
                    return Err(ValidationError::ZeroLifetime);
                }

                let mapping = PortMapping {
                    protocol: request.protocol,
                    external_port,
                    internal_port,
                    internal_ip: None,
                    description: Some(description),
                    lease_duration: Some(lifetime_secs),
                };
                self.add_natpmp(mapping).await
            }
        };

        Ok(finish("add", result))
    }

    /// Delete a mapping
    ///
    /// NAT-PMP removal is a zero-lifetime map request and therefore needs
    /// the internal port the mapping was created with.
    pub async fn remove(&self, request: RemoveRequest) -> Result<OperationResult, ValidationError> {
        let method = request.method;
        let protocol = request.protocol;
        let external_port =
            require_port(method, "remove", "--external-port", request.external_port)?;

        let result = match method {
            MappingProtocol::UPnP => self.remove_upnp(protocol, external_port).await,
            MappingProtocol::NATPMP => {
                let internal_port =
                    require_port(method, "remove", "--internal-port", request.internal_port)?;
                self.remove_natpmp(protocol, external_port, internal_port)
                    .await
            }
        };

        Ok(finish("remove", result))
    }

    async fn list_upnp(&self) -> Result<Detail, MappingError> {
        let mut session = UpnpSession::new(self.transports.igd());
        session.discover().await?;
        let external_ip = session.external_address().await?;

        let mut mappings = Vec::new();
        let mut index = 0;
        while let Some(mapping) = session.enumerate_mapping(index).await? {
            debug!("Mapping {}: {}", index, mapping);
            mappings.push(mapping);
            index += 1;

            if index >= self.config.max_list_entries {
                warn!(
                    "Stopped listing after {} entries; gateway table may be longer",
                    index
                );
                break;
            }
        }

        Ok(Detail::Listing {
            external_ip,
            mappings,
        })
    }

    async fn list_natpmp(&self) -> Result<Detail, MappingError> {
        let mut session = NatPmpSession::new(self.transports.natpmp()?);
        let gateway = session.discover().await?;

        Ok(Detail::ExternalAddressOnly {
            external_ip: gateway.device,
            notice: NATPMP_LIST_NOTICE.to_string(),
        })
    }

    async fn add_upnp(&self, mapping: PortMapping) -> Result<Detail, MappingError> {
        let mut session = UpnpSession::new(self.transports.igd());
        session.discover().await?;
        let external_ip = session.external_address().await?;
        info!("External IP: {}", external_ip);

        session.add_mapping(&mapping).await?;

        let expires_at = mapping
            .lease_duration
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + chrono::Duration::seconds(i64::from(secs)));

        Ok(Detail::Added {
            external_ip,
            mapping,
            expires_at,
        })
    }

    async fn add_natpmp(&self, mapping: PortMapping) -> Result<Detail, MappingError> {
        let mut session = NatPmpSession::new(self.transports.natpmp()?);
        let external_ip = session.discover().await?.device;

        let granted = session.add_mapping(&mapping).await?;
        let expires_at = granted
            .lease_duration
            .map(|secs| Utc::now() + chrono::Duration::seconds(i64::from(secs)));

        Ok(Detail::Added {
            external_ip,
            mapping: granted,
            expires_at,
        })
    }

    async fn remove_upnp(
        &self,
        protocol: TransportProtocol,
        external_port: u16,
    ) -> Result<Detail, MappingError> {
        let mut session = UpnpSession::new(self.transports.igd());
        session.discover().await?;
        session.remove_mapping(protocol, external_port).await?;

        Ok(Detail::Removed {
            protocol,
            external_port,
        })
    }

    async fn remove_natpmp(
        &self,
        protocol: TransportProtocol,
        external_port: u16,
        internal_port: u16,
    ) -> Result<Detail, MappingError> {
        let mut session = NatPmpSession::new(self.transports.natpmp()?);
        session.discover().await?;
        session
            .remove_by_zero_lease(protocol, external_port, internal_port)
            .await?;

        Ok(Detail::Removed {
            protocol,
            external_port,
        })
    }
}

fn finish(intent: &str, result: Result<Detail, MappingError>) -> OperationResult {
    match result {
        Ok(detail) => {
            info!("{} succeeded", intent);
            OperationResult::Success(detail)
        }
        Err(e) => {
            warn!("{} failed: {}", intent, e);
            e.into()
        }
    }
}

/// Check a caller supplied port against 1-65535
pub(crate) fn require_port(
    method: MappingProtocol,
    intent: &'static str,
    parameter: &'static str,
    value: Option<u32>,
) -> Result<u16, ValidationError> {
    let value = value.ok_or(ValidationError::MissingParameter {
        method,
        intent,
        parameter,
    })?;

    u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(ValidationError::PortOutOfRange { parameter, value })
}
