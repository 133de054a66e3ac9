//! NAT-PMP (NAT Port Mapping Protocol) transport - RFC 6886
//!
//! NAT-PMP is a request/response protocol over UDP port 5351 on the default
//! gateway. Every request starts with a version byte (always 0) and an
//! opcode; every response echoes the opcode with the high bit set, followed
//! by a 16-bit result code.
//!
//! | opcode | request                 |
//! |--------|-------------------------|
//! | 0      | external address        |
//! | 1      | map UDP                 |
//! | 2      | map TCP                 |
//!
//! There is no enumeration opcode and no delete opcode. A map request with a
//! requested lifetime of zero destroys the mapping.
//!
//! This module only frames datagrams and handles retransmission. Result
//! codes and response bodies are interpreted by
//! [`NatPmpSession`](super::session::NatPmpSession).

use super::types::{TransportError, TransportProtocol};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

/// NAT-PMP server port (IANA assigned)
pub const NATPMP_SERVER_PORT: u16 = 5351;

/// NAT-PMP protocol version
pub(crate) const NATPMP_VERSION: u8 = 0;

/// Set on the opcode of every response
pub(crate) const RESPONSE_FLAG: u8 = 0x80;

/// Largest datagram a gateway sends back (map response)
const MAX_RESPONSE_LEN: usize = 16;

/// NAT-PMP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum NatPmpOpcode {
    /// External address request
    ExternalAddress = 0,
    /// UDP port mapping
    MapUdp = 1,
    /// TCP port mapping
    MapTcp = 2,
}

impl NatPmpOpcode {
    pub(crate) fn map_for(protocol: TransportProtocol) -> Self {
        match protocol {
            TransportProtocol::UDP => Self::MapUdp,
            TransportProtocol::TCP => Self::MapTcp,
        }
    }
}

/// NAT-PMP result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum NatPmpResultCode {
    Success = 0,
    UnsupportedVersion = 1,
    NotAuthorized = 2,
    NetworkFailure = 3,
    OutOfResources = 4,
    UnsupportedOpcode = 5,
}

impl NatPmpResultCode {
    pub(crate) fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::NetworkFailure),
            4 => Some(Self::OutOfResources),
            5 => Some(Self::UnsupportedOpcode),
            _ => None,
        }
    }

    pub(crate) fn to_error_message(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnsupportedVersion => "Unsupported NAT-PMP version",
            Self::NotAuthorized => "Not authorized/refused",
            Self::NetworkFailure => "Network failure",
            Self::OutOfResources => "Out of resources",
            Self::UnsupportedOpcode => "Unsupported opcode",
        }
    }
}

/// A decoded response header plus the opcode specific body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatPmpResponse {
    /// Result code from bytes 2-3
    pub result_code: u16,
    /// Everything after the 4-byte header
    pub body: Vec<u8>,
}

/// Body of a successful map response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MapResponse {
    pub epoch_secs: u32,
    pub internal_port: u16,
    pub external_port: u16,
    pub lifetime_secs: u32,
}

/// Single request/response exchange with a NAT-PMP gateway
///
/// Implementations own their socket for as long as they live; dropping the
/// transport releases it.
#[allow(async_fn_in_trait)]
pub trait NatPmpTransport {
    /// Address requests are sent to
    fn gateway(&self) -> SocketAddr;

    /// Send `[version, opcode, payload..]` and wait for the matching response
    async fn send_request(
        &mut self,
        opcode: u8,
        payload: &[u8],
    ) -> Result<NatPmpResponse, TransportError>;
}

/// Retransmission schedule for unanswered requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first retransmission; doubles on every attempt
    pub initial_timeout: Duration,
    /// Total requests sent before giving up
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_millis(250),
            max_attempts: 4,
        }
    }
}

/// NAT-PMP over a real UDP socket
#[derive(Debug)]
pub struct UdpNatPmpTransport {
    server: SocketAddr,
    retry: RetryPolicy,
    socket: Option<UdpSocket>,
}

impl UdpNatPmpTransport {
    /// Talk to `gateway` on the standard NAT-PMP port
    pub fn new(gateway: IpAddr, retry: RetryPolicy) -> Self {
        Self::with_server_addr(SocketAddr::new(gateway, NATPMP_SERVER_PORT), retry)
    }

    /// Talk to an explicit server address
    pub fn with_server_addr(server: SocketAddr, retry: RetryPolicy) -> Self {
        Self {
            server,
            retry,
            socket: None,
        }
    }

    /// Bind lazily so that validation failures never open a socket
    async fn socket(&mut self) -> std::io::Result<&UdpSocket> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                let bind_addr = match self.server {
                    SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
                    SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
                };
                let socket = UdpSocket::bind(bind_addr).await?;
                debug!("Bound NAT-PMP socket on {}", socket.local_addr()?);
                socket
            }
        };
        Ok(self.socket.insert(socket))
    }
}

impl NatPmpTransport for UdpNatPmpTransport {
    fn gateway(&self) -> SocketAddr {
        self.server
    }

    async fn send_request(
        &mut self,
        opcode: u8,
        payload: &[u8],
    ) -> Result<NatPmpResponse, TransportError> {
        let server = self.server;
        let RetryPolicy {
            initial_timeout,
            max_attempts,
        } = self.retry;
        let request = encode_request(opcode, payload);
        let socket = self.socket().await?;

        let mut wait = initial_timeout;
        let mut buf = [0u8; MAX_RESPONSE_LEN];

        for attempt in 1..=max_attempts {
            socket.send_to(&request, server).await?;
            debug!(
                "Sent NAT-PMP opcode {} to {} (attempt {}/{}, waiting {:?})",
                opcode, server, attempt, max_attempts, wait
            );

            let deadline = Instant::now() + wait;
            loop {
                match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                    Err(_) => break,
                    Ok(Err(e)) => return Err(TransportError::Io(e)),
                    Ok(Ok((len, from))) if from.ip() != server.ip() => {
                        trace!("Ignoring {} byte datagram from {}", len, from);
                    }
                    Ok(Ok((len, _))) if is_stale_answer(opcode, &buf[..len]) => {
                        trace!(
                            "Ignoring stale NAT-PMP answer with opcode {} (waiting for {})",
                            buf[1],
                            opcode | RESPONSE_FLAG
                        );
                    }
                    Ok(Ok((len, _))) => {
                        debug!("Received {} bytes from NAT-PMP server", len);
                        return decode_response(opcode, &buf[..len]);
                    }
                }
            }

            wait = wait.saturating_mul(2);
        }

        warn!(
            "NAT-PMP gateway {} did not answer {} request(s)",
            server, max_attempts
        );
        Err(TransportError::Timeout {
            attempts: max_attempts,
        })
    }
}

/// Frame a request datagram
pub(crate) fn encode_request(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut request = Vec::with_capacity(2 + payload.len());
    request.push(NATPMP_VERSION);
    request.push(opcode);
    request.extend_from_slice(payload);
    request
}

/// Well-formed header answering some other opcode, such as a late reply to
/// a retransmitted earlier request
pub(crate) fn is_stale_answer(opcode: u8, datagram: &[u8]) -> bool {
    datagram.len() >= 4 && datagram[0] == NATPMP_VERSION && datagram[1] != opcode | RESPONSE_FLAG
}

/// Check a response header against the request opcode and split off the body
pub(crate) fn decode_response(opcode: u8, datagram: &[u8]) -> Result<NatPmpResponse, TransportError> {
    if datagram.len() < 4 {
        return Err(TransportError::Malformed(format!(
            "NAT-PMP response too short: {} bytes",
            datagram.len()
        )));
    }

    if datagram[0] != NATPMP_VERSION {
        return Err(TransportError::Malformed(format!(
            "Invalid version: {} (expected {})",
            datagram[0], NATPMP_VERSION
        )));
    }

    if datagram[1] != opcode | RESPONSE_FLAG {
        return Err(TransportError::Malformed(format!(
            "Invalid opcode in response: {} (expected {})",
            datagram[1],
            opcode | RESPONSE_FLAG
        )));
    }

    Ok(NatPmpResponse {
        result_code: u16::from_be_bytes([datagram[2], datagram[3]]),
        body: datagram[4..].to_vec(),
    })
}

/// Payload of a map request: reserved(2) | internal port | suggested external port | lifetime
pub(crate) fn map_payload(
    internal_port: u16,
    suggested_external_port: u16,
    lifetime_secs: u32,
) -> [u8; 10] {
    let mut payload = [0u8; 10];
    payload[2..4].copy_from_slice(&internal_port.to_be_bytes());
    payload[4..6].copy_from_slice(&suggested_external_port.to_be_bytes());
    payload[6..10].copy_from_slice(&lifetime_secs.to_be_bytes());
    payload
}

/// Parse an external address body: epoch(4) | address(4)
pub(crate) fn parse_external_address_body(body: &[u8]) -> Result<(u32, Ipv4Addr), TransportError> {
    if body.len() < 8 {
        return Err(TransportError::Malformed(format!(
            "External address response too short: {} bytes",
            body.len() + 4
        )));
    }

    let epoch_secs = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let ip = Ipv4Addr::new(body[4], body[5], body[6], body[7]);
    Ok((epoch_secs, ip))
}

/// Parse a map body: epoch(4) | internal port(2) | external port(2) | lifetime(4)
pub(crate) fn parse_map_body(body: &[u8]) -> Result<MapResponse, TransportError> {
    if body.len() < 12 {
        return Err(TransportError::Malformed(format!(
            "Map response too short: {} bytes (expected 16)",
            body.len() + 4
        )));
    }

    Ok(MapResponse {
        epoch_secs: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
        internal_port: u16::from_be_bytes([body[4], body[5]]),
        external_port: u16::from_be_bytes([body[6], body[7]]),
        lifetime_secs: u32::from_be_bytes([body[8], body[9], body[10], body[11]]),
    })
}
