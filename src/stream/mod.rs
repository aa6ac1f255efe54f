//! Flow identification and session/stream reconstruction.

mod flow;
mod reassembly;
mod tcp;
mod udp;

pub use flow::{Endpoint, FlowKey};
pub use reassembly::{ByteAssembly, ByteRange};
pub use tcp::{CloseReason, DirectionStream, SessionState, TcpSession, TcpSessionBuilder};
pub use udp::{UdpStream, UdpStreamBuilder};

/// Canonical direction of travel within a flow, relative to the
/// [`FlowKey`]'s normalized endpoint ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the lower endpoint to the higher one.
    AToB,
    /// From the higher endpoint to the lower one.
    BToA,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::AToB => 0,
            Direction::BToA => 1,
        }
    }
}
