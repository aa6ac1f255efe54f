//! Canonical flow keys.

use std::fmt;
use std::net::IpAddr;

use super::Direction;

/// One endpoint of a flow: an (IP, port) pair.
pub type Endpoint = (IpAddr, u16);

/// Normalized flow key (lower IP/port first for consistent lookup).
///
/// Packets from either direction of a conversation map to the same key.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct FlowKey {
    ip_a: IpAddr,
    port_a: u16,
    ip_b: IpAddr,
    port_b: u16,
}

impl FlowKey {
    /// Create a normalized flow key.
    /// Ensures (ip_a, port_a) <= (ip_b, port_b) lexicographically.
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        if (src_ip, src_port) <= (dst_ip, dst_port) {
            Self {
                ip_a: src_ip,
                port_a: src_port,
                ip_b: dst_ip,
                port_b: dst_port,
            }
        } else {
            Self {
                ip_a: dst_ip,
                port_a: dst_port,
                ip_b: src_ip,
                port_b: src_port,
            }
        }
    }

    /// The lexicographically lower endpoint.
    pub fn endpoint_a(&self) -> Endpoint {
        (self.ip_a, self.port_a)
    }

    /// The lexicographically higher endpoint.
    pub fn endpoint_b(&self) -> Endpoint {
        (self.ip_b, self.port_b)
    }

    /// Which canonical direction a packet from the given sender travels.
    pub fn direction_of(&self, src_ip: IpAddr, src_port: u16) -> Direction {
        if src_ip == self.ip_a && src_port == self.port_a {
            Direction::AToB
        } else {
            Direction::BToA
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} <-> {}:{}",
            self.ip_a, self.port_a, self.ip_b, self.port_b
        )
    }
}
