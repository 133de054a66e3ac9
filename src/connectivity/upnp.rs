//! UPnP IGD (Internet Gateway Device) transport
//!
//! Discovery uses SSDP (Simple Service Discovery Protocol) to find IGD
//! devices on the local network; control actions are SOAP requests against
//! the device's WAN connection service. Both are provided by `igd-next`,
//! whose blocking API is driven from `spawn_blocking`.
//!
//! The rest of the crate never sees igd-next types: actions go in as
//! [`ControlAction`] and come back as [`ControlResponse`] or a
//! [`ControlError`] carrying the UPnP error code.

use super::types::{GatewayHandle, MappingError, PortMapping, TransportError, TransportProtocol};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// UPnP error codes used by the session layer
pub mod fault {
    /// Generic action failure
    pub const ACTION_FAILED: u16 = 501;
    /// Caller is not allowed to perform the action
    pub const ACTION_NOT_AUTHORIZED: u16 = 606;
    /// GetGenericPortMappingEntry index past the end of the table
    pub const SPECIFIED_ARRAY_INDEX_INVALID: u16 = 713;
    /// No mapping matches the given key
    pub const NO_SUCH_ENTRY_IN_ARRAY: u16 = 714;
    /// Mapping already assigned to another client
    pub const CONFLICT_IN_MAPPING_ENTRY: u16 = 718;
    /// Gateway refuses finite leases
    pub const ONLY_PERMANENT_LEASES_SUPPORTED: u16 = 725;
}

/// SOAP actions of the WANIPConnection service used by this crate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// GetExternalIPAddress
    GetExternalIpAddress,
    /// GetGenericPortMappingEntry
    GetGenericPortMappingEntry {
        /// Position in the gateway's mapping table
        index: u32,
    },
    /// AddPortMapping
    AddPortMapping {
        /// Forwarded protocol
        protocol: TransportProtocol,
        /// Port opened on the gateway
        external_port: u16,
        /// Internal host and port
        internal_client: SocketAddr,
        /// NewPortMappingDescription
        description: String,
        /// Lease in seconds, 0 = permanent
        lease_duration: u32,
    },
    /// DeletePortMapping
    DeletePortMapping {
        /// Forwarded protocol
        protocol: TransportProtocol,
        /// Port to release
        external_port: u16,
    },
}

impl ControlAction {
    /// SOAP action name
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetExternalIpAddress => "GetExternalIPAddress",
            Self::GetGenericPortMappingEntry { .. } => "GetGenericPortMappingEntry",
            Self::AddPortMapping { .. } => "AddPortMapping",
            Self::DeletePortMapping { .. } => "DeletePortMapping",
        }
    }
}

/// Decoded SOAP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    /// Answer to GetExternalIPAddress
    ExternalIpAddress(IpAddr),
    /// Answer to GetGenericPortMappingEntry
    PortMappingEntry(PortMapping),
    /// Action completed with an empty response
    Done,
}

/// Failure of a control action
#[derive(Debug)]
pub enum ControlError {
    /// SOAP fault returned by the gateway
    Fault {
        /// UPnP error code
        code: u16,
        /// UPnP error description
        description: String,
    },
    /// The request never produced a usable answer
    Transport(TransportError),
}

impl ControlError {
    /// Build a SOAP fault
    pub fn fault(code: u16, description: impl Into<String>) -> Self {
        Self::Fault {
            code,
            description: description.into(),
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault { code, description } => write!(f, "UPnP error {}: {}", code, description),
            Self::Transport(e) => e.fmt(f),
        }
    }
}

impl From<ControlError> for MappingError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Fault { code, description } => MappingError::GatewayError {
                code,
                message: description,
            },
            ControlError::Transport(e) => MappingError::Transport(e),
        }
    }
}

impl From<TransportError> for ControlError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// SSDP discovery plus SOAP control of one IGD
#[allow(async_fn_in_trait)]
pub trait IgdTransport {
    /// Whatever the transport needs to address the selected device again
    type Device;

    /// Search the local network; `None` when no IGD answered in time
    async fn discover(&mut self) -> Result<Option<GatewayHandle<Self::Device>>, TransportError>;

    /// Perform one SOAP action against a discovered gateway
    async fn send_control_action(
        &mut self,
        gateway: &GatewayHandle<Self::Device>,
        action: ControlAction,
    ) -> Result<ControlResponse, ControlError>;
}

/// IGD transport backed by `igd-next`
#[derive(Debug, Clone)]
pub struct IgdNextTransport {
    discovery_window: Duration,
    control_timeout: Duration,
}

impl IgdNextTransport {
    /// Create a transport with the given discovery window and per-action timeout
    pub fn new(discovery_window: Duration, control_timeout: Duration) -> Self {
        Self {
            discovery_window,
            control_timeout,
        }
    }
}

impl IgdTransport for IgdNextTransport {
    type Device = Arc<igd_next::Gateway>;

    async fn discover(&mut self) -> Result<Option<GatewayHandle<Self::Device>>, TransportError> {
        debug!(
            "Searching for UPnP IGD gateway ({:?} window)...",
            self.discovery_window
        );

        let options = igd_next::SearchOptions {
            timeout: Some(self.discovery_window),
            ..Default::default()
        };

        // Spawn blocking task for UPnP operations (uses blocking I/O)
        let result = tokio::task::spawn_blocking(move || igd_next::search_gateway(options))
            .await
            .map_err(|e| TransportError::Io(io::Error::other(e)))?;

        match result {
            Ok(gateway) => {
                info!(
                    "Found UPnP gateway at {} (control URL {})",
                    gateway.addr, gateway.control_url
                );
                Ok(Some(GatewayHandle {
                    addr: gateway.addr,
                    control_url: Some(gateway.control_url.clone()),
                    device: Arc::new(gateway),
                }))
            }
            Err(igd_next::SearchError::IoError(e))
                if !matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Err(TransportError::Io(e))
            }
            Err(e) => {
                debug!("UPnP gateway search found nothing: {}", e);
                Ok(None)
            }
        }
    }

    async fn send_control_action(
        &mut self,
        gateway: &GatewayHandle<Self::Device>,
        action: ControlAction,
    ) -> Result<ControlResponse, ControlError> {
        let device = Arc::clone(&gateway.device);
        let name = action.name();
        debug!("Sending {} to {}", name, gateway.addr);

        let call = tokio::task::spawn_blocking(move || run_action(&device, action));
        match tokio::time::timeout(self.control_timeout, call).await {
            Err(_) => {
                debug!("{} timed out after {:?}", name, self.control_timeout);
                Err(TransportError::Timeout { attempts: 1 }.into())
            }
            Ok(Err(e)) => Err(TransportError::Io(io::Error::other(e)).into()),
            Ok(Ok(result)) => result,
        }
    }
}

fn run_action(
    gateway: &igd_next::Gateway,
    action: ControlAction,
) -> Result<ControlResponse, ControlError> {
    use igd_next::{
        AddPortError, GetExternalIpError, GetGenericPortMappingEntryError, RemovePortError,
    };

    match action {
        ControlAction::GetExternalIpAddress => gateway
            .get_external_ip()
            .map(ControlResponse::ExternalIpAddress)
            .map_err(|e| match e {
                GetExternalIpError::ActionNotAuthorized => {
                    ControlError::fault(fault::ACTION_NOT_AUTHORIZED, "Action not authorized")
                }
                GetExternalIpError::RequestError(e) => request_error(e),
                #[allow(unreachable_patterns)]
                other => ControlError::fault(fault::ACTION_FAILED, other.to_string()),
            }),

        ControlAction::GetGenericPortMappingEntry { index } => gateway
            .get_generic_port_mapping_entry(index)
            .map(|entry| {
                ControlResponse::PortMappingEntry(PortMapping {
                    protocol: from_igd_protocol(entry.protocol),
                    external_port: entry.external_port,
                    internal_port: entry.internal_port,
                    internal_ip: entry.internal_client.parse().ok(),
                    description: Some(entry.port_mapping_description)
                        .filter(|d| !d.is_empty()),
                    lease_duration: Some(entry.lease_duration),
                })
            })
            .map_err(|e| match e {
                GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid => ControlError::fault(
                    fault::SPECIFIED_ARRAY_INDEX_INVALID,
                    "SpecifiedArrayIndexInvalid",
                ),
                GetGenericPortMappingEntryError::ActionNotAuthorized => {
                    ControlError::fault(fault::ACTION_NOT_AUTHORIZED, "Action not authorized")
                }
                GetGenericPortMappingEntryError::RequestError(e) => request_error(e),
                #[allow(unreachable_patterns)]
                other => ControlError::fault(fault::ACTION_FAILED, other.to_string()),
            }),

        ControlAction::AddPortMapping {
            protocol,
            external_port,
            internal_client,
            description,
            lease_duration,
        } => gateway
            .add_port(
                to_igd_protocol(protocol),
                external_port,
                internal_client,
                lease_duration,
                &description,
            )
            .map(|()| ControlResponse::Done)
            .map_err(|e| match e {
                AddPortError::ActionNotAuthorized => {
                    ControlError::fault(fault::ACTION_NOT_AUTHORIZED, "Action not authorized")
                }
                AddPortError::PortInUse => ControlError::fault(
                    fault::CONFLICT_IN_MAPPING_ENTRY,
                    "External port already mapped to another client",
                ),
                AddPortError::OnlyPermanentLeasesSupported => ControlError::fault(
                    fault::ONLY_PERMANENT_LEASES_SUPPORTED,
                    "Gateway only supports permanent leases",
                ),
                AddPortError::RequestError(e) => request_error(e),
                other => ControlError::fault(fault::ACTION_FAILED, other.to_string()),
            }),

        ControlAction::DeletePortMapping {
            protocol,
            external_port,
        } => gateway
            .remove_port(to_igd_protocol(protocol), external_port)
            .map(|()| ControlResponse::Done)
            .map_err(|e| match e {
                RemovePortError::NoSuchPortMapping => {
                    ControlError::fault(fault::NO_SUCH_ENTRY_IN_ARRAY, "NoSuchEntryInArray")
                }
                RemovePortError::ActionNotAuthorized => {
                    ControlError::fault(fault::ACTION_NOT_AUTHORIZED, "Action not authorized")
                }
                RemovePortError::RequestError(e) => request_error(e),
                #[allow(unreachable_patterns)]
                other => ControlError::fault(fault::ACTION_FAILED, other.to_string()),
            }),
    }
}

fn request_error(err: igd_next::RequestError) -> ControlError {
    match err {
        igd_next::RequestError::ErrorCode(code, description) => ControlError::Fault { code, description },
        igd_next::RequestError::InvalidResponse(text) => TransportError::Malformed(text).into(),
        igd_next::RequestError::IoError(e) => TransportError::Io(e).into(),
        other => TransportError::Io(io::Error::other(other.to_string())).into(),
    }
}

fn to_igd_protocol(protocol: TransportProtocol) -> igd_next::PortMappingProtocol {
    match protocol {
        TransportProtocol::TCP => igd_next::PortMappingProtocol::TCP,
        TransportProtocol::UDP => igd_next::PortMappingProtocol::UDP,
    }
}

fn from_igd_protocol(protocol: igd_next::PortMappingProtocol) -> TransportProtocol {
    match protocol {
        igd_next::PortMappingProtocol::TCP => TransportProtocol::TCP,
        igd_next::PortMappingProtocol::UDP => TransportProtocol::UDP,
    }
}
