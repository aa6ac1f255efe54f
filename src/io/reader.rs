//! PCAP/PCAPNG file reading with automatic gzip handling.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapNGReader};

use flate2::read::GzDecoder;

use super::{FrameRead, RawFrame};
use crate::error::SourceError;

/// Buffer size for pcap_parser readers (64KB).
const BUFFER_SIZE: usize = 65536;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reader for PCAP and PCAPNG capture files, with optional gzip
/// decompression.
///
/// # Example
///
/// ```no_run
/// use pcapflow::io::{FilePacketSource, FrameRead};
///
/// let mut source = FilePacketSource::open("capture.pcap").unwrap();
/// while let Some(frame) = source.next_frame().unwrap() {
///     println!("frame {}: {} bytes", frame.frame_number, frame.data.len());
/// }
/// ```
pub struct FilePacketSource {
    inner: ReaderInner,
    frame_number: u64,
    link_type: u16,
}

enum ReaderInner {
    Legacy(LegacyPcapReader<BufReader<Box<dyn Read + Send>>>),
    Ng(PcapNGReader<BufReader<Box<dyn Read + Send>>>),
}

impl FilePacketSource {
    /// Open a capture file for reading.
    ///
    /// Detects gzip compression and PCAP vs PCAPNG framing from magic bytes.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();

        // Peek at the first bytes to detect compression and format.
        let mut file = File::open(path).map_err(|_| SourceError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut head = [0u8; 4];
        let n = file.read(&mut head).map_err(|e| SourceError::InvalidFormat {
            reason: format!("cannot read file header: {e}"),
        })?;
        if n < 2 {
            return Err(SourceError::InvalidFormat {
                reason: "file too short".to_string(),
            });
        }

        let is_gzip = head[..2] == GZIP_MAGIC;

        // Re-open so the parser sees the stream from the start.
        let file = File::open(path).map_err(|_| SourceError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut raw: Box<dyn Read + Send> = if is_gzip {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let magic = if is_gzip {
            // The capture magic sits behind the compression layer.
            let mut magic = [0u8; 4];
            raw.read_exact(&mut magic)
                .map_err(|e| SourceError::InvalidFormat {
                    reason: format!("cannot read capture magic: {e}"),
                })?;
            // Re-open once more; the decoder consumed the magic.
            let file = File::open(path).map_err(|_| SourceError::FileNotFound {
                path: path.display().to_string(),
            })?;
            raw = Box::new(GzDecoder::new(file));
            magic
        } else {
            if n < 4 {
                return Err(SourceError::InvalidFormat {
                    reason: "file too short for capture magic".to_string(),
                });
            }
            head
        };

        let buf = BufReader::with_capacity(BUFFER_SIZE, raw);

        let inner = match magic {
            // Legacy PCAP, all four magic variants (endianness x time resolution)
            [0xd4, 0xc3, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0xc3, 0xd4]
            | [0x4d, 0x3c, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0x3c, 0x4d] => {
                let reader = LegacyPcapReader::new(BUFFER_SIZE, buf).map_err(|e| {
                    SourceError::InvalidFormat {
                        reason: format!("failed to parse PCAP header: {e}"),
                    }
                })?;
                ReaderInner::Legacy(reader)
            }
            [0x0a, 0x0d, 0x0d, 0x0a] => {
                let reader = PcapNGReader::new(BUFFER_SIZE, buf).map_err(|e| {
                    SourceError::InvalidFormat {
                        reason: format!("failed to parse PCAPNG header: {e}"),
                    }
                })?;
                ReaderInner::Ng(reader)
            }
            _ => {
                return Err(SourceError::InvalidFormat {
                    reason: format!("unknown capture magic: {magic:02x?}"),
                })
            }
        };

        Ok(Self {
            inner,
            frame_number: 0,
            // Default to Ethernet, updated from the section/interface header.
            link_type: 1,
        })
    }

    /// Number of frames read so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }
}

impl FrameRead for FilePacketSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        match &mut self.inner {
            ReaderInner::Legacy(reader) => {
                read_legacy_frame(reader, &mut self.frame_number, &mut self.link_type)
            }
            ReaderInner::Ng(reader) => {
                read_pcapng_frame(reader, &mut self.frame_number, &mut self.link_type)
            }
        }
    }

    fn link_type(&self) -> u16 {
        self.link_type
    }
}

/// Read the next frame from a legacy PCAP reader.
fn read_legacy_frame<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawFrame>, SourceError> {
    use pcap_parser::PcapError as PcapParserError;

    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;
                    let timestamp_us =
                        (packet.ts_sec as i64) * 1_000_000 + (packet.ts_usec as i64);
                    let frame = RawFrame {
                        frame_number: *frame_number,
                        timestamp_us,
                        link_type: *link_type,
                        data: Bytes::copy_from_slice(packet.data),
                        original_len: packet.origlen,
                    };
                    reader.consume(offset);
                    return Ok(Some(frame));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = header.network.0 as u16;
                    reader.consume(offset);
                    continue;
                }
                _ => {
                    reader.consume(offset);
                    continue;
                }
            },
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| SourceError::ReadFailed {
                    frame: *frame_number,
                    reason: format!("PCAP refill error: {e}"),
                })?;
                continue;
            }
            Err(e) => {
                return Err(SourceError::ReadFailed {
                    frame: *frame_number,
                    reason: format!("PCAP parse error: {e}"),
                })
            }
        }
    }
}

/// Read the next frame from a PCAPNG reader.
fn read_pcapng_frame<S: Read>(
    reader: &mut PcapNGReader<S>,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawFrame>, SourceError> {
    use pcap_parser::pcapng::Block;
    use pcap_parser::PcapError as PcapParserError;

    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                    *link_type = idb.linktype.0 as u16;
                    reader.consume(offset);
                    continue;
                }
                PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                    *frame_number += 1;
                    let timestamp_us = ((epb.ts_high as i64) << 32) | (epb.ts_low as i64);
                    let frame = RawFrame {
                        frame_number: *frame_number,
                        timestamp_us,
                        link_type: *link_type,
                        data: Bytes::copy_from_slice(epb.data),
                        original_len: epb.origlen,
                    };
                    reader.consume(offset);
                    return Ok(Some(frame));
                }
                PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                    *frame_number += 1;
                    // Simple Packet Blocks carry no timestamp, and their
                    // data is padded; the captured length is bounded by the
                    // original length.
                    let caplen = (spb.origlen as usize).min(spb.data.len());
                    let frame = RawFrame {
                        frame_number: *frame_number,
                        timestamp_us: 0,
                        link_type: *link_type,
                        data: Bytes::copy_from_slice(&spb.data[..caplen]),
                        original_len: spb.origlen,
                    };
                    reader.consume(offset);
                    return Ok(Some(frame));
                }
                _ => {
                    reader.consume(offset);
                    continue;
                }
            },
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| SourceError::ReadFailed {
                    frame: *frame_number,
                    reason: format!("PCAPNG refill error: {e}"),
                })?;
                continue;
            }
            Err(e) => {
                return Err(SourceError::ReadFailed {
                    frame: *frame_number,
                    reason: format!("PCAPNG parse error: {e}"),
                })
            }
        }
    }
}
