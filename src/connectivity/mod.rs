//! Connectivity module for gateway port mapping
//!
//! This module manages port mappings on a gateway router through two
//! unrelated protocols:
//! - UPnP IGD (Universal Plug and Play Internet Gateway Device)
//! - NAT-PMP (NAT Port Mapping Protocol) - RFC 6886
//!
//! Layers, leaf first: transports ([`upnp`], [`natpmp`]) move bytes,
//! sessions ([`session`]) turn responses into typed gateway operations, and
//! the [`controller`] maps list/add/remove intents onto sessions.

// Submodules
pub mod controller;
pub mod gateway;
pub mod natpmp;
pub mod session;
pub mod types;
pub mod upnp;

// Re-export commonly used types
pub use types::{
    Detail, GatewayHandle, Intent, MappingError, MappingProtocol, NotFound, OperationResult,
    PortMapping, TransportError, TransportProtocol, ValidationError,
};

// Re-export main entry points
pub use controller::{AddRequest, MappingController, RemoveRequest, SystemTransports, Transports};
pub use gateway::find_default_gateway;
pub use natpmp::{NatPmpResponse, NatPmpTransport, RetryPolicy, UdpNatPmpTransport};
pub use session::{NatPmpSession, SessionState, UpnpSession};
pub use upnp::{ControlAction, ControlError, ControlResponse, IgdNextTransport, IgdTransport};
