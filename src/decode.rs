//! Frame decoding: raw captured bytes to typed transport-layer packets.
//!
//! [`decode_frame`] walks the link, network and transport headers of a
//! captured frame and produces a [`DecodedPacket`] for IPv4/IPv6-carried TCP
//! and UDP. Anything else well-formed classifies as [`DecodeOutcome::Other`]
//! and is excluded from reconstruction; truncated or malformed headers are a
//! [`DecodeError`], which the pipeline recovers from by dropping the frame.

use std::net::IpAddr;

use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice,
};

use crate::error::DecodeError;
use crate::stream::FlowKey;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u16 = 1;

/// Link type constant for raw IP (no link-layer header).
pub const LINKTYPE_RAW: u16 = 101;

/// Well-known EtherType values.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86DD;
}

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// IP protocol number for UDP.
pub const IP_PROTO_UDP: u8 = 17;

/// Transport protocol tag for notifications and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
        }
    }
}

/// TCP header flags relevant to session tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
}

/// Transport-specific header fields of a decoded packet.
#[derive(Debug, Clone)]
pub enum Transport {
    Tcp {
        /// Sequence number
        seq: u32,
        /// Acknowledgment number
        ack: u32,
        flags: TcpFlags,
    },
    Udp,
}

/// A decoded transport-layer packet. Immutable once produced.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub transport: Transport,
    /// Transport payload (possibly empty)
    pub payload: Vec<u8>,
}

impl DecodedPacket {
    /// Transport protocol tag of this packet.
    pub fn protocol(&self) -> TransportProtocol {
        match self.transport {
            Transport::Tcp { .. } => TransportProtocol::Tcp,
            Transport::Udp => TransportProtocol::Udp,
        }
    }

    /// Canonical flow key for this packet's conversation.
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

/// Outcome of decoding a well-formed frame.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// IPv4/IPv6-carried TCP or UDP, usable for reconstruction
    Transport(DecodedPacket),
    /// Anything else (ARP, ICMP, unknown link types, IP fragments, ...);
    /// excluded from reconstruction but still counted toward progress
    Other,
}

/// Decode a raw captured frame into zero or one transport packet.
///
/// Returns `Err` only for truncated/malformed headers on the IPv4/IPv6
/// TCP/UDP path; such frames are dropped from reconstruction but must not
/// abort the batch.
pub fn decode_frame(link_type: u16, data: &[u8]) -> Result<DecodeOutcome, DecodeError> {
    match link_type {
        LINKTYPE_ETHERNET => {
            let eth = Ethernet2HeaderSlice::from_slice(data)
                .map_err(|e| DecodeError::malformed("ethernet", e))?;
            let rest = &data[eth.slice().len()..];
            match eth.ether_type().0 {
                ethertype::IPV4 => decode_ipv4(rest),
                ethertype::IPV6 => decode_ipv6(rest),
                _ => Ok(DecodeOutcome::Other),
            }
        }
        LINKTYPE_RAW => match data.first().map(|b| b >> 4) {
            Some(4) => decode_ipv4(data),
            Some(6) => decode_ipv6(data),
            _ => Ok(DecodeOutcome::Other),
        },
        _ => Ok(DecodeOutcome::Other),
    }
}

fn decode_ipv4(data: &[u8]) -> Result<DecodeOutcome, DecodeError> {
    let ipv4 = Ipv4HeaderSlice::from_slice(data).map_err(|e| DecodeError::malformed("ipv4", e))?;

    // Non-first fragments carry no transport header.
    if ipv4.fragments_offset().value() != 0 {
        return Ok(DecodeOutcome::Other);
    }

    let header_len = ipv4.slice().len();
    // Trim to the IP datagram length so Ethernet padding never leaks into
    // transport payloads.
    let declared = (ipv4.total_len() as usize).saturating_sub(header_len);
    let rest = &data[header_len..];
    let ip_payload = &rest[..declared.min(rest.len())];

    decode_transport(
        IpAddr::V4(ipv4.source_addr()),
        IpAddr::V4(ipv4.destination_addr()),
        ipv4.protocol().0,
        ip_payload,
    )
}

fn decode_ipv6(data: &[u8]) -> Result<DecodeOutcome, DecodeError> {
    let ipv6 = Ipv6HeaderSlice::from_slice(data).map_err(|e| DecodeError::malformed("ipv6", e))?;

    let header_len = ipv6.slice().len();
    let declared = ipv6.payload_length() as usize;
    let rest = &data[header_len..];
    let ip_payload = &rest[..declared.min(rest.len())];

    // Extension header chains are out of scope; only a directly-carried
    // transport header is decoded.
    decode_transport(
        IpAddr::V6(ipv6.source_addr()),
        IpAddr::V6(ipv6.destination_addr()),
        ipv6.next_header().0,
        ip_payload,
    )
}

fn decode_transport(
    src_ip: IpAddr,
    dst_ip: IpAddr,
    ip_protocol: u8,
    data: &[u8],
) -> Result<DecodeOutcome, DecodeError> {
    match ip_protocol {
        IP_PROTO_TCP => {
            let tcp =
                TcpHeaderSlice::from_slice(data).map_err(|e| DecodeError::malformed("tcp", e))?;
            let flags = TcpFlags {
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
                psh: tcp.psh(),
            };
            let payload = data[tcp.slice().len()..].to_vec();
            Ok(DecodeOutcome::Transport(DecodedPacket {
                src_ip,
                dst_ip,
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                transport: Transport::Tcp {
                    seq: tcp.sequence_number(),
                    ack: tcp.acknowledgment_number(),
                    flags,
                },
                payload,
            }))
        }
        IP_PROTO_UDP => {
            let udp =
                UdpHeaderSlice::from_slice(data).map_err(|e| DecodeError::malformed("udp", e))?;
            // UDP header is always 8 bytes; trim to the UDP length field.
            let declared = (udp.length() as usize).saturating_sub(8);
            let rest = &data[8..];
            let payload = rest[..declared.min(rest.len())].to_vec();
            Ok(DecodeOutcome::Transport(DecodedPacket {
                src_ip,
                dst_ip,
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
                transport: Transport::Udp,
                payload,
            }))
        }
        _ => Ok(DecodeOutcome::Other),
    }
}
