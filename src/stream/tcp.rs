//! TCP session reconstruction.
//!
//! [`TcpSessionBuilder`] owns a keyed store of per-flow state machines. Each
//! [`TcpSession`] orders payload bytes per direction at the offset implied by
//! the sequence number, resolves retransmissions first-writer-wins, keeps
//! reassembly gaps visible, and tracks an open/closing/closed lifecycle.
//! Sessions are emitted exactly once: the moment they terminate (both FINs
//! acknowledged, or RST), or force-closed at end-of-capture flush.

use std::collections::HashMap;

use tracing::trace;

use crate::decode::{DecodedPacket, TcpFlags, Transport};

use super::flow::{Endpoint, FlowKey};
use super::reassembly::ByteAssembly;
use super::Direction;

/// Lifecycle state of a tracked TCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Data seen but no SYN; the capture started mid-stream.
    Pending,
    /// Conversation in progress.
    Open,
    /// FIN observed from at least one side.
    Closing,
    /// Terminal.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Both directions FIN'd and each FIN was acknowledged.
    Normal,
    /// RST observed.
    Reset,
    /// The capture ended before the session terminated.
    EndOfCapture,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Normal => "normal",
            CloseReason::Reset => "reset",
            CloseReason::EndOfCapture => "end_of_capture",
        }
    }
}

/// One direction of a session's reconstructed byte stream.
#[derive(Debug, Clone, Default)]
pub struct DirectionStream {
    /// Reassembled payload bytes, with explicit gaps.
    pub data: ByteAssembly,
    /// Packets observed in this direction.
    pub packets: u32,
    /// Last sequence number seen in this direction.
    pub last_seq: u32,
    /// Stream offset 0 maps to this sequence number.
    base_seq: Option<u32>,
    /// Sequence number occupied by this direction's FIN, if seen.
    fin_seq: Option<u32>,
    /// Whether the peer acknowledged the FIN.
    fin_acked: bool,
}

/// A reconstructed bidirectional TCP session.
#[derive(Debug, Clone)]
pub struct TcpSession {
    pub key: FlowKey,
    /// Endpoint that initiated the session (SYN sender, or first-seen
    /// sender for mid-stream captures).
    pub client: Endpoint,
    pub server: Endpoint,
    pub state: SessionState,
    pub close_reason: Option<CloseReason>,
    /// Arrival index of the first packet (emission ordering).
    pub first_frame: u64,
    /// Last-activity marker.
    pub last_frame: u64,
    streams: [DirectionStream; 2],
}

impl TcpSession {
    fn new(key: FlowKey, src: Endpoint, dst: Endpoint, flags: TcpFlags, frame: u64) -> Self {
        // A SYN-ACK as the first observed packet means the responder is the
        // sender; everything else makes the first sender the client.
        let (client, server, state) = if flags.syn && flags.ack {
            (dst, src, SessionState::Open)
        } else if flags.syn {
            (src, dst, SessionState::Open)
        } else {
            (src, dst, SessionState::Pending)
        };
        TcpSession {
            key,
            client,
            server,
            state,
            close_reason: None,
            first_frame: frame,
            last_frame: frame,
            streams: [DirectionStream::default(), DirectionStream::default()],
        }
    }

    /// The stream for a canonical direction.
    pub fn stream(&self, direction: Direction) -> &DirectionStream {
        &self.streams[direction.index()]
    }

    /// Bytes sent by the client (request side).
    pub fn to_server(&self) -> &DirectionStream {
        self.stream(self.key.direction_of(self.client.0, self.client.1))
    }

    /// Bytes sent by the server (response side).
    pub fn to_client(&self) -> &DirectionStream {
        self.stream(self.key.direction_of(self.server.0, self.server.1))
    }

    fn close(&mut self, reason: CloseReason) {
        self.state = SessionState::Closed;
        self.close_reason = Some(reason);
    }
}

/// Keyed set of per-flow TCP state machines.
///
/// Owned exclusively by the pipeline; a `FlowKey` maps to at most one live
/// session at a time.
#[derive(Default)]
pub struct TcpSessionBuilder {
    sessions: HashMap<FlowKey, TcpSession>,
}

impl TcpSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one decoded TCP packet into its session.
    ///
    /// Returns the finished session when this packet terminated it (both
    /// FINs acknowledged, or RST); the session is removed from the store at
    /// that point and will not be emitted again.
    pub fn handle_packet(&mut self, packet: &DecodedPacket, frame: u64) -> Option<TcpSession> {
        let (seq, ack, flags) = match packet.transport {
            Transport::Tcp { seq, ack, flags } => (seq, ack, flags),
            Transport::Udp => return None,
        };

        let key = packet.flow_key();
        let session = self.sessions.entry(key).or_insert_with(|| {
            TcpSession::new(
                key,
                (packet.src_ip, packet.src_port),
                (packet.dst_ip, packet.dst_port),
                flags,
                frame,
            )
        });
        session.last_frame = frame;

        let direction = key.direction_of(packet.src_ip, packet.src_port);
        let stream = &mut session.streams[direction.index()];
        stream.packets += 1;
        stream.last_seq = seq;

        if flags.syn {
            // The SYN consumes one sequence number; payload starts after it.
            if stream.base_seq.is_none() {
                stream.base_seq = Some(seq.wrapping_add(1));
            }
            if session.state == SessionState::Pending {
                session.state = SessionState::Open;
            }
        }

        // Payload carried on the SYN itself (fast open) starts one past it.
        let data_seq = if flags.syn { seq.wrapping_add(1) } else { seq };

        if !packet.payload.is_empty() {
            let base = *stream.base_seq.get_or_insert(data_seq);
            let rel = data_seq.wrapping_sub(base);
            if (rel as i32) >= 0 {
                stream.data.insert(rel as u64, &packet.payload);
            } else {
                // Sequenced before the first observed byte (late
                // retransmission into a mid-stream capture): clamp instead
                // of mis-filing it at a huge offset.
                let skip = rel.wrapping_neg() as usize;
                if skip < packet.payload.len() {
                    stream.data.insert(0, &packet.payload[skip..]);
                }
            }
        }

        if flags.fin && stream.fin_seq.is_none() {
            stream.fin_seq = Some(data_seq.wrapping_add(packet.payload.len() as u32));
        }

        // An ACK may acknowledge the opposite direction's FIN.
        if flags.ack {
            let other = &mut session.streams[direction.reverse().index()];
            if let Some(fin_seq) = other.fin_seq {
                if seq_lt(fin_seq, ack) {
                    other.fin_acked = true;
                }
            }
        }

        // Both directions have been observed: a mid-stream session is a
        // real conversation, not a stray packet.
        if session.state == SessionState::Pending
            && session.streams[0].packets > 0
            && session.streams[1].packets > 0
        {
            session.state = SessionState::Open;
        }

        let close = if flags.rst {
            Some(CloseReason::Reset)
        } else if session.streams[0].fin_acked && session.streams[1].fin_acked {
            Some(CloseReason::Normal)
        } else {
            if (flags.fin || session.streams[0].fin_seq.is_some()
                || session.streams[1].fin_seq.is_some())
                && session.state != SessionState::Closed
            {
                session.state = SessionState::Closing;
            }
            None
        };

        if let Some(reason) = close {
            let mut finished = self.sessions.remove(&key)?;
            finished.close(reason);
            trace!(key = %finished.key, reason = reason.as_str(), "tcp session closed");
            return Some(finished);
        }
        None
    }

    /// Force-close and hand back every live session, in first-seen order.
    ///
    /// Used at end-of-file so no data is lost; partial sessions are
    /// explicitly `Closed` with the given reason.
    pub fn flush(&mut self, reason: CloseReason) -> Vec<TcpSession> {
        let mut sessions: Vec<TcpSession> = self
            .sessions
            .drain()
            .map(|(_, mut session)| {
                session.close(reason);
                session
            })
            .collect();
        sessions.sort_by_key(|s| s.first_frame);
        sessions
    }

    /// Drop all live state without emitting anything.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Number of live (un-emitted) sessions.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Wrapping sequence-number comparison: is `a` before `b`?
fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}
