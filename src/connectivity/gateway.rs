//! Default gateway lookup for NAT-PMP

use crate::connectivity::types::MappingError;
use std::net::{IpAddr, Ipv4Addr};

/// Find the default gateway IP address
///
/// On Linux it reads the kernel routing table, on macOS and Windows it asks
/// the platform's routing command.
pub fn find_default_gateway() -> Result<IpAddr, MappingError> {
    #[cfg(target_os = "linux")]
    {
        find_gateway_linux()
    }

    #[cfg(target_os = "macos")]
    {
        find_gateway_macos()
    }

    #[cfg(target_os = "windows")]
    {
        find_gateway_windows()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Err(MappingError::NotSupported(
            "default gateway lookup on this platform; pass --gateway".to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
fn find_gateway_linux() -> Result<IpAddr, MappingError> {
    let route_table = std::fs::read_to_string("/proc/net/route")?;

    parse_proc_net_route(&route_table)
        .map(IpAddr::V4)
        .ok_or_else(|| MappingError::NoGateway("no default route".to_string()))
}

#[cfg(target_os = "macos")]
fn find_gateway_macos() -> Result<IpAddr, MappingError> {
    use std::process::Command;

    let output = Command::new("netstat").args(["-rn", "-f", "inet"]).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    parse_netstat(&stdout)
        .map(IpAddr::V4)
        .ok_or_else(|| MappingError::NoGateway("no default route".to_string()))
}

#[cfg(target_os = "windows")]
fn find_gateway_windows() -> Result<IpAddr, MappingError> {
    use std::process::Command;

    let output = Command::new("route").args(["print", "0.0.0.0"]).output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    parse_route_print(&stdout)
        .map(IpAddr::V4)
        .ok_or_else(|| MappingError::NoGateway("no default route".to_string()))
}

/// Extract the default gateway from the contents of `/proc/net/route`
///
/// Addresses are printed as the in-memory representation of the address in
/// host byte order, so `0101A8C0` is `192.168.1.1` on little-endian hosts.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_net_route(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        let ip = Ipv4Addr::from(raw.to_ne_bytes());
        (!ip.is_unspecified()).then_some(ip)
    })
}

/// Extract the default gateway from `netstat -rn -f inet` output
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn parse_netstat(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|line| line.starts_with("default"))
        .find_map(|line| line.split_whitespace().nth(1)?.parse().ok())
}

/// Extract the default gateway from `route print 0.0.0.0` output
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn parse_route_print(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("0.0.0.0"))
        .find_map(|line| line.split_whitespace().nth(2)?.parse().ok())
}
