//! UDP stream grouping.
//!
//! UDP has no sequence numbers or termination signal in this model, so the
//! grouper is a plain accumulator: every packet sharing a [`FlowKey`] is
//! appended to that flow's [`UdpStream`] in arrival order, duplicates
//! included, and streams are emitted only at end-of-file flush.

use std::collections::HashMap;

use crate::decode::{DecodedPacket, Transport};

use super::flow::FlowKey;

/// All packets of one UDP flow, in arrival order.
#[derive(Debug, Clone)]
pub struct UdpStream {
    pub key: FlowKey,
    pub packets: Vec<DecodedPacket>,
    /// Arrival index of the first packet (emission ordering).
    pub first_frame: u64,
    /// Last-activity marker.
    pub last_frame: u64,
}

impl UdpStream {
    /// Total payload bytes across all packets, duplicates included.
    pub fn payload_bytes(&self) -> usize {
        self.packets.iter().map(|p| p.payload.len()).sum()
    }
}

/// Keyed set of per-flow UDP accumulators.
#[derive(Default)]
pub struct UdpStreamBuilder {
    streams: HashMap<FlowKey, UdpStream>,
}

impl UdpStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decoded UDP packet to its flow's stream.
    pub fn handle_packet(&mut self, packet: &DecodedPacket, frame: u64) {
        if !matches!(packet.transport, Transport::Udp) {
            return;
        }
        let key = packet.flow_key();
        let stream = self.streams.entry(key).or_insert_with(|| UdpStream {
            key,
            packets: Vec::new(),
            first_frame: frame,
            last_frame: frame,
        });
        stream.packets.push(packet.clone());
        stream.last_frame = frame;
    }

    /// Hand back every accumulated stream, in first-seen order.
    pub fn flush(&mut self) -> Vec<UdpStream> {
        let mut streams: Vec<UdpStream> = self.streams.drain().map(|(_, s)| s).collect();
        streams.sort_by_key(|s| s.first_frame);
        streams
    }

    /// Drop all accumulated state without emitting anything.
    pub fn clear(&mut self) {
        self.streams.clear();
    }

    /// Number of live (un-emitted) streams.
    pub fn live_streams(&self) -> usize {
        self.streams.len()
    }
}
