//! Common types for connectivity module

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Control protocols available for managing a gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MappingProtocol {
    /// Universal Plug and Play Internet Gateway Device
    #[value(name = "upnp")]
    UPnP,
    /// NAT Port Mapping Protocol (RFC 6886)
    #[value(name = "natpmp")]
    NATPMP,
}

impl fmt::Display for MappingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UPnP => f.write_str("UPnP"),
            Self::NATPMP => f.write_str("NAT-PMP"),
        }
    }
}

/// Layer 4 protocol being forwarded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TransportProtocol {
    /// TCP protocol
    #[value(name = "TCP", alias = "tcp")]
    TCP,
    /// UDP protocol
    #[value(name = "UDP", alias = "udp")]
    UDP,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TCP => f.write_str("TCP"),
            Self::UDP => f.write_str("UDP"),
        }
    }
}

/// Command intents understood by the mapping controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Intent {
    /// Show the gateway's external address and mapping table
    List,
    /// Create a port mapping
    Add,
    /// Delete a port mapping
    Remove,
}

/// A discovered, addressable gateway
///
/// Owned by the session that discovered it. `device` carries whatever the
/// transport needs to reach the gateway again (for UPnP, the selected IGD).
#[derive(Debug, Clone)]
pub struct GatewayHandle<D = ()> {
    /// Gateway's control address
    pub addr: SocketAddr,
    /// SOAP control endpoint (UPnP only)
    pub control_url: Option<String>,
    /// Transport specific device reference
    pub device: D,
}

/// One forwarding rule as known to, or requested from, a gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    /// Forwarded protocol
    pub protocol: TransportProtocol,
    /// Port opened on the gateway's external interface
    pub external_port: u16,
    /// Port on the internal host
    pub internal_port: u16,
    /// Internal host (absent for NAT-PMP, which maps the sender's address)
    pub internal_ip: Option<IpAddr>,
    /// Free-form description stored on the gateway
    pub description: Option<String>,
    /// Lease in seconds; 0 or absent means indefinite on UPnP
    pub lease_duration: Option<u32>,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.internal_ip {
            Some(ip) => write!(
                f,
                "{} {} -> {}",
                self.protocol,
                self.external_port,
                SocketAddr::new(ip, self.internal_port)
            )?,
            None => write!(
                f,
                "{} {} -> {}",
                self.protocol, self.external_port, self.internal_port
            )?,
        }

        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            write!(f, " {:?}", description)?;
        }

        match self.lease_duration {
            None | Some(0) => write!(f, " (lease: permanent)"),
            Some(secs) => write!(f, " (lease: {}s)", secs),
        }
    }
}

/// Successful outcome of a controller operation
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    /// Full mapping table (UPnP)
    Listing {
        /// Gateway's external address
        external_ip: IpAddr,
        /// Mappings in gateway index order
        mappings: Vec<PortMapping>,
    },
    /// External address only, for protocols without enumeration
    ExternalAddressOnly {
        /// Gateway's external address
        external_ip: IpAddr,
        /// Why no mapping table is shown
        notice: String,
    },
    /// A mapping was created
    Added {
        /// Gateway's external address
        external_ip: IpAddr,
        /// Mapping as granted by the gateway
        mapping: PortMapping,
        /// When a finite lease runs out
        expires_at: Option<DateTime<Utc>>,
    },
    /// A mapping was deleted
    Removed {
        /// Forwarded protocol
        protocol: TransportProtocol,
        /// External port that was released
        external_port: u16,
    },
}

/// Uniform result of every mapping controller operation
#[derive(Debug)]
pub enum OperationResult {
    /// Operation completed
    Success(Detail),
    /// No gateway, or no such mapping
    NotFound(NotFound),
    /// Operation has no meaning for the chosen protocol
    Unsupported(String),
    /// Timeout or malformed response on the wire
    TransportFailure(TransportError),
    /// Gateway answered with an error code
    ProtocolError {
        /// Protocol specific error code
        code: u16,
        /// Human readable explanation
        message: String,
    },
}

/// What a `NotFound` result refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// Discovery produced no usable gateway
    Gateway(String),
    /// The gateway holds no mapping for this port
    Mapping {
        /// Forwarded protocol
        protocol: TransportProtocol,
        /// External port looked up
        external_port: u16,
    },
}

impl OperationResult {
    /// Check if the operation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Payload of a successful operation
    pub fn detail(&self) -> Option<&Detail> {
        match self {
            Self::Success(detail) => Some(detail),
            _ => None,
        }
    }

    /// Short machine readable status name
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound(_) => "not_found",
            Self::Unsupported(_) => "unsupported",
            Self::TransportFailure(_) => "transport_failure",
            Self::ProtocolError { .. } => "protocol_error",
        }
    }

    /// Process exit status for this result under the given intent
    ///
    /// A missing mapping on removal is the desired end state, and an empty
    /// search on listing is a valid answer, so both exit 0.
    pub fn exit_code(&self, intent: Intent) -> u8 {
        match self {
            Self::Success(_) => 0,
            Self::NotFound(NotFound::Mapping { .. }) => 0,
            Self::NotFound(NotFound::Gateway(_)) if intent == Intent::List => 0,
            Self::NotFound(NotFound::Gateway(_)) => 2,
            Self::Unsupported(_) => 1,
            Self::TransportFailure(_) | Self::ProtocolError { .. } => 2,
        }
    }
}

impl From<MappingError> for OperationResult {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::NoGateway(reason) => Self::NotFound(NotFound::Gateway(reason)),
            MappingError::NoSuchMapping {
                protocol,
                external_port,
            } => Self::NotFound(NotFound::Mapping {
                protocol,
                external_port,
            }),
            MappingError::NotSupported(reason) => Self::Unsupported(reason),
            MappingError::Transport(cause) => Self::TransportFailure(cause),
            MappingError::GatewayError { code, message } => Self::ProtocolError { code, message },
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(Detail::Listing {
                external_ip,
                mappings,
            }) => {
                write!(f, "Discovered UPnP device. External IP: {}", external_ip)?;
                if mappings.is_empty() {
                    write!(f, "\nNo port mappings found.")?;
                }
                for (i, mapping) in mappings.iter().enumerate() {
                    write!(f, "\nMapping {}: {}", i, mapping)?;
                }
                Ok(())
            }
            Self::Success(Detail::ExternalAddressOnly {
                external_ip,
                notice,
            }) => write!(f, "NAT-PMP Gateway Public IP: {}\n{}", external_ip, notice),
            Self::Success(Detail::Added {
                external_ip,
                mapping,
                expires_at,
            }) => {
                write!(f, "External IP: {}\nPort mapping added: {}", external_ip, mapping)?;
                if let Some(at) = expires_at {
                    write!(f, "\nExpires at {}", at.to_rfc3339())?;
                }
                Ok(())
            }
            Self::Success(Detail::Removed {
                protocol,
                external_port,
            }) => write!(f, "Port mapping removed: {} {}", protocol, external_port),
            Self::NotFound(NotFound::Gateway(reason)) => write!(f, "No gateway found: {}", reason),
            Self::NotFound(NotFound::Mapping {
                protocol,
                external_port,
            }) => write!(f, "No port mapping for {} {}; nothing to remove", protocol, external_port),
            Self::Unsupported(reason) => write!(f, "Unsupported: {}", reason),
            Self::TransportFailure(cause) => write!(f, "Transport failure: {}", cause),
            Self::ProtocolError { code, message } => {
                write!(f, "Gateway error {}: {}", code, message)
            }
        }
    }
}

/// Wire level failures, surfaced only after the adapter's retry budget
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response within the retry budget
    #[error("no response from gateway after {attempts} attempt(s)")]
    Timeout {
        /// Requests sent before giving up
        attempts: u32,
    },

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Operation attempted before discovery
    #[error("no gateway session; discovery has not run")]
    NoSession,

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during gateway operations
#[derive(Debug, Error)]
pub enum MappingError {
    /// No gateway found on network
    #[error("No gateway found: {0}")]
    NoGateway(String),

    /// Operation has no counterpart in the protocol
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Gateway has no such mapping
    #[error("No such port mapping: {protocol} {external_port}")]
    NoSuchMapping {
        /// Forwarded protocol
        protocol: TransportProtocol,
        /// External port looked up
        external_port: u16,
    },

    /// Gateway returned an error
    #[error("Gateway error {code}: {message}")]
    GatewayError {
        /// Protocol specific error code
        code: u16,
        /// Human readable explanation
        message: String,
    },

    /// Transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<std::io::Error> for MappingError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(TransportError::Io(err))
    }
}

/// Caller supplied parameters that fail before any network I/O
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Required parameter absent
    #[error("Missing {parameter} for {method} {intent}")]
    MissingParameter {
        /// Method the parameter is required for
        method: MappingProtocol,
        /// Intent the parameter is required for
        intent: &'static str,
        /// Command line flag name
        parameter: &'static str,
    },

    /// Port outside 1-65535
    #[error("{parameter} must be between 1 and 65535, got {value}")]
    PortOutOfRange {
        /// Command line flag name
        parameter: &'static str,
        /// Rejected value
        value: u32,
    },

    /// A zero lifetime would delete rather than create the mapping
    #[error("--lifetime must be at least 1 second for a NAT-PMP add; use --action remove to delete")]
    ZeroLifetime,

    /// Not an IPv4 or IPv6 literal
    #[error("Invalid internal IP address: {0:?}")]
    InvalidAddress(String),
}
