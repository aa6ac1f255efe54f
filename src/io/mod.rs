//! Capture source abstractions.
//!
//! A [`FrameRead`] yields raw captured frames one at a time until the source
//! is exhausted. [`FilePacketSource`] reads PCAP/PCAPNG files (optionally
//! gzip-compressed); a live capture device would implement the same trait
//! outside this crate. The pipeline drives any `FrameRead` with the same
//! blocking pull loop, so file and live sources can be mixed in one batch.

mod reader;

pub use reader::FilePacketSource;

use bytes::Bytes;

use crate::error::SourceError;

/// A raw captured frame, as it came off the wire or out of a file.
///
/// Ephemeral: produced by a source, consumed once by the decoder.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame number within the source (1-indexed, matching Wireshark)
    pub frame_number: u64,
    /// Timestamp in microseconds since the Unix epoch
    pub timestamp_us: i64,
    /// Link-layer type (e.g. 1 = Ethernet)
    pub link_type: u16,
    /// Captured bytes (may be shorter than the original packet)
    pub data: Bytes,
    /// Original packet length on the wire
    pub original_len: u32,
}

/// Sequential reader of frames from a capture source.
///
/// Reading is a blocking, synchronous pull; the caller does not move on
/// until `next_frame` returns `Ok(None)`.
pub trait FrameRead {
    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;

    /// Link-layer type of frames from this source.
    fn link_type(&self) -> u16;
}
