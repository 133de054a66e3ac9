//! Gateway sessions
//!
//! A session wraps one transport and the gateway it discovered. Sessions
//! start `Unconnected`; every operation other than `discover` fails with
//! [`TransportError::NoSession`] until discovery succeeds.
//!
//! The two protocols expose the same raw operations where they overlap and
//! report [`MappingError::NotSupported`] where they do not. NAT-PMP in
//! particular cannot enumerate its table and has no delete request.

use super::natpmp::{
    map_payload, parse_external_address_body, parse_map_body, MapResponse, NatPmpOpcode,
    NatPmpResultCode, NatPmpTransport,
};
use super::types::{GatewayHandle, MappingError, PortMapping, TransportError, TransportProtocol};
use super::upnp::{fault, ControlAction, ControlError, ControlResponse, IgdTransport};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info, warn};

/// Lifecycle of a gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No gateway discovered yet
    Unconnected,
    /// Gateway discovered; operations allowed
    Discovered,
}

/// Session against a UPnP Internet Gateway Device
pub struct UpnpSession<T: IgdTransport> {
    transport: T,
    gateway: Option<GatewayHandle<T::Device>>,
}

impl<T: IgdTransport> UpnpSession<T> {
    /// Create an unconnected session
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            gateway: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match self.gateway {
            Some(_) => SessionState::Discovered,
            None => SessionState::Unconnected,
        }
    }

    /// Run SSDP discovery and keep the first IGD that answered
    pub async fn discover(&mut self) -> Result<&GatewayHandle<T::Device>, MappingError> {
        match self.transport.discover().await? {
            Some(gateway) => {
                debug!("UPnP session bound to {}", gateway.addr);
                Ok(self.gateway.insert(gateway))
            }
            None => Err(MappingError::NoGateway(
                "no UPnP devices found. Ensure your router supports UPnP and it is enabled"
                    .to_string(),
            )),
        }
    }

    async fn control(&mut self, action: ControlAction) -> Result<ControlResponse, ControlError> {
        let gateway = self.gateway.as_ref().ok_or(TransportError::NoSession)?;
        self.transport.send_control_action(gateway, action).await
    }

    /// GetExternalIPAddress
    pub async fn external_address(&mut self) -> Result<IpAddr, MappingError> {
        match self.control(ControlAction::GetExternalIpAddress).await? {
            ControlResponse::ExternalIpAddress(ip) => Ok(ip),
            other => Err(unexpected("GetExternalIPAddress", &other)),
        }
    }

    /// Fetch the mapping at `index`; `None` marks the end of the table
    pub async fn enumerate_mapping(&mut self, index: u32) -> Result<Option<PortMapping>, MappingError> {
        match self
            .control(ControlAction::GetGenericPortMappingEntry { index })
            .await
        {
            Ok(ControlResponse::PortMappingEntry(mapping)) => Ok(Some(mapping)),
            Ok(other) => Err(unexpected("GetGenericPortMappingEntry", &other)),
            Err(ControlError::Fault { code, .. })
                if code == fault::SPECIFIED_ARRAY_INDEX_INVALID
                    || code == fault::NO_SUCH_ENTRY_IN_ARRAY =>
            {
                debug!("End of UPnP mapping table at index {}", index);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// AddPortMapping; `lease_duration` of 0 or `None` requests a permanent lease
    pub async fn add_mapping(&mut self, mapping: &PortMapping) -> Result<(), MappingError> {
        let internal_ip = mapping.internal_ip.ok_or_else(|| {
            MappingError::NotSupported("UPnP mappings need an internal IP address".to_string())
        })?;

        info!(
            "Adding port forwarding: {} {} -> {}:{}",
            mapping.protocol, mapping.external_port, internal_ip, mapping.internal_port
        );

        let action = ControlAction::AddPortMapping {
            protocol: mapping.protocol,
            external_port: mapping.external_port,
            internal_client: SocketAddr::new(internal_ip, mapping.internal_port),
            description: mapping.description.clone().unwrap_or_default(),
            lease_duration: mapping.lease_duration.unwrap_or(0),
        };

        match self.control(action).await? {
            ControlResponse::Done => Ok(()),
            other => Err(unexpected("AddPortMapping", &other)),
        }
    }

    /// DeletePortMapping, keyed by external port and protocol
    pub async fn remove_mapping(
        &mut self,
        protocol: TransportProtocol,
        external_port: u16,
    ) -> Result<(), MappingError> {
        info!("Removing port mapping: {} {}", protocol, external_port);

        let action = ControlAction::DeletePortMapping {
            protocol,
            external_port,
        };

        match self.control(action).await {
            Ok(ControlResponse::Done) => Ok(()),
            Ok(other) => Err(unexpected("DeletePortMapping", &other)),
            Err(ControlError::Fault { code, .. }) if code == fault::NO_SUCH_ENTRY_IN_ARRAY => {
                Err(MappingError::NoSuchMapping {
                    protocol,
                    external_port,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn unexpected(action: &str, response: &ControlResponse) -> MappingError {
    TransportError::Malformed(format!("unexpected answer to {}: {:?}", action, response)).into()
}

/// Session against a NAT-PMP gateway
///
/// NAT-PMP has no discovery; the transport already points at the gateway.
/// `discover` proves the gateway speaks NAT-PMP by asking for its external
/// address, which is kept in the handle.
pub struct NatPmpSession<T: NatPmpTransport> {
    transport: T,
    gateway: Option<GatewayHandle<IpAddr>>,
}

impl<T: NatPmpTransport> NatPmpSession<T> {
    /// Create an unconnected session
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            gateway: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match self.gateway {
            Some(_) => SessionState::Discovered,
            None => SessionState::Unconnected,
        }
    }

    /// Validate the gateway with an external address request
    ///
    /// The handle's `device` is the external address reported during
    /// validation.
    pub async fn discover(&mut self) -> Result<&GatewayHandle<IpAddr>, MappingError> {
        let addr = self.transport.gateway();
        debug!("Validating NAT-PMP gateway {}", addr);

        let external_ip = self.query_external_address().await?;
        info!("NAT-PMP gateway {} reports external IP {}", addr, external_ip);

        Ok(self.gateway.insert(GatewayHandle {
            addr,
            control_url: None,
            device: external_ip,
        }))
    }

    /// Issue a fresh external address request
    pub async fn external_address(&mut self) -> Result<IpAddr, MappingError> {
        self.require_session()?;
        self.query_external_address().await
    }

    /// Always `NotSupported`: NAT-PMP has no enumeration request
    pub async fn enumerate_mapping(&mut self, index: u32) -> Result<Option<PortMapping>, MappingError> {
        debug!("Refusing NAT-PMP enumeration at index {}", index);
        Err(MappingError::NotSupported(
            "NAT-PMP cannot enumerate port mappings".to_string(),
        ))
    }

    /// Request a mapping; returns the mapping the gateway actually granted
    ///
    /// The gateway may assign a different external port or a shorter
    /// lifetime than requested. `internal_ip` must be absent: NAT-PMP always
    /// maps to the host that sent the request.
    pub async fn add_mapping(&mut self, mapping: &PortMapping) -> Result<PortMapping, MappingError> {
        if let Some(ip) = mapping.internal_ip {
            return Err(MappingError::NotSupported(format!(
                "NAT-PMP maps the requesting host only; internal IP {} cannot be set",
                ip
            )));
        }

        let lifetime_secs = mapping
            .lease_duration
            .unwrap_or(crate::config::DEFAULT_LIFETIME_SECS);
        if lifetime_secs == 0 {
            return Err(MappingError::NotSupported(
                "a zero lifetime deletes the mapping; use remove_by_zero_lease".to_string(),
            ));
        }

        info!(
            "Attempting NAT-PMP mapping {} {} -> {} (lifetime: {}s)",
            mapping.protocol, mapping.external_port, mapping.internal_port, lifetime_secs
        );

        let granted = self
            .map(
                mapping.protocol,
                mapping.internal_port,
                mapping.external_port,
                lifetime_secs,
            )
            .await?;

        if granted.external_port != mapping.external_port {
            warn!(
                "NAT-PMP gateway assigned external port {} instead of {}",
                granted.external_port, mapping.external_port
            );
        }

        Ok(PortMapping {
            protocol: mapping.protocol,
            external_port: granted.external_port,
            internal_port: granted.internal_port,
            internal_ip: None,
            description: mapping.description.clone(),
            lease_duration: Some(granted.lifetime_secs),
        })
    }

    /// Always `NotSupported`: NAT-PMP cannot delete by external port alone
    ///
    /// Use [`remove_by_zero_lease`](Self::remove_by_zero_lease), which needs
    /// the internal port the mapping was created with.
    pub async fn remove_mapping(
        &mut self,
        protocol: TransportProtocol,
        external_port: u16,
    ) -> Result<(), MappingError> {
        Err(MappingError::NotSupported(format!(
            "NAT-PMP has no delete request; removing {} {} needs the internal port",
            protocol, external_port
        )))
    }

    /// Destroy a mapping by re-requesting it with a lifetime of zero
    ///
    /// NAT-PMP defines a zero-lifetime map request as "delete". Gateways key
    /// mappings on the internal port, so `internal_port` must be the one
    /// used when the mapping was created; nothing in the protocol can look
    /// it up. The suggested external port is sent as 0 (RFC 6886 section
    /// 3.4); `external_port` only identifies the mapping in logs and reports.
    pub async fn remove_by_zero_lease(
        &mut self,
        protocol: TransportProtocol,
        external_port: u16,
        internal_port: u16,
    ) -> Result<(), MappingError> {
        info!(
            "Removing NAT-PMP mapping {} {} -> {} with a zero lifetime",
            protocol, external_port, internal_port
        );

        let granted = self.map(protocol, internal_port, 0, 0).await?;
        if granted.lifetime_secs != 0 {
            warn!(
                "NAT-PMP gateway answered delete with lifetime {}s",
                granted.lifetime_secs
            );
        }
        Ok(())
    }

    fn require_session(&self) -> Result<(), MappingError> {
        match self.gateway {
            Some(_) => Ok(()),
            None => Err(TransportError::NoSession.into()),
        }
    }

    async fn query_external_address(&mut self) -> Result<IpAddr, MappingError> {
        let response = self
            .transport
            .send_request(NatPmpOpcode::ExternalAddress as u8, &[])
            .await?;
        check_result_code(response.result_code)?;

        let (epoch_secs, ip) = parse_external_address_body(&response.body)?;
        debug!("NAT-PMP epoch {}s, external IP {}", epoch_secs, ip);
        Ok(IpAddr::V4(ip))
    }

    async fn map(
        &mut self,
        protocol: TransportProtocol,
        internal_port: u16,
        external_port: u16,
        lifetime_secs: u32,
    ) -> Result<MapResponse, MappingError> {
        self.require_session()?;

        let opcode = NatPmpOpcode::map_for(protocol) as u8;
        let payload = map_payload(internal_port, external_port, lifetime_secs);
        let response = self.transport.send_request(opcode, &payload).await?;
        check_result_code(response.result_code)?;

        let granted = parse_map_body(&response.body)?;
        debug!(
            "NAT-PMP map response: epoch {}s, {} -> {} for {}s",
            granted.epoch_secs, granted.external_port, granted.internal_port, granted.lifetime_secs
        );
        Ok(granted)
    }
}

fn check_result_code(code: u16) -> Result<(), MappingError> {
    match NatPmpResultCode::from_u16(code) {
        Some(NatPmpResultCode::Success) => Ok(()),
        Some(result) => Err(MappingError::GatewayError {
            code,
            message: result.to_error_message().to_string(),
        }),
        None => Err(MappingError::GatewayError {
            code,
            message: format!("Unknown result code: {}", code),
        }),
    }
}
