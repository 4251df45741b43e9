//! Default gateway lookup for different platforms
//!
//! NAT-PMP has no discovery protocol of its own: the client simply talks to
//! the next hop of the IPv4 default route.

use crate::connectivity::types::MappingError;
use std::net::Ipv4Addr;

/// Find the default IPv4 gateway address
///
/// On Linux this reads the kernel routing table, on macOS and Windows it
/// parses the output of the platform routing tool.
pub fn find_default_gateway() -> Result<Ipv4Addr, MappingError> {
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
        Err(MappingError::NotSupported)
    }
}

fn no_default_route() -> MappingError {
    MappingError::Internal("No default IPv4 route found".to_string())
}

/// Extract the default route's gateway from `/proc/net/route` contents
///
/// Addresses in that file are the raw network-order bytes printed as a
/// native-endian hex word.
pub fn parse_linux_route_table(route_table: &str) -> Option<Ipv4Addr> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            return None;
        }

        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        if gateway == 0 {
            // On-link default route, no next hop to talk to
            return None;
        }
        Some(Ipv4Addr::from(gateway.to_ne_bytes()))
    })
}

#[cfg(target_os = "linux")]
fn find_gateway_linux() -> Result<Ipv4Addr, MappingError> {
    let route_table = std::fs::read_to_string("/proc/net/route")
        .map_err(|e| MappingError::Internal(format!("Failed to read route table: {}", e)))?;

    parse_linux_route_table(&route_table).ok_or_else(no_default_route)
}

#[cfg(target_os = "macos")]
fn find_gateway_macos() -> Result<Ipv4Addr, MappingError> {
    use std::process::Command;

    let output = Command::new("netstat")
        .args(["-rn", "-f", "inet"])
        .output()
        .map_err(|e| MappingError::Internal(format!("Failed to run netstat: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    stdout
        .lines()
        .filter(|line| line.starts_with("default"))
        .find_map(|line| line.split_whitespace().nth(1)?.parse::<Ipv4Addr>().ok())
        .ok_or_else(no_default_route)
}

#[cfg(target_os = "windows")]
fn find_gateway_windows() -> Result<Ipv4Addr, MappingError> {
    use std::process::Command;

    let output = Command::new("route")
        .args(["print", "0.0.0.0"])
        .output()
        .map_err(|e| MappingError::Internal(format!("Failed to run route: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("0.0.0.0"))
        .find_map(|line| line.split_whitespace().nth(2)?.parse::<Ipv4Addr>().ok())
        .ok_or_else(no_default_route)
}
