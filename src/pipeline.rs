//! Capture pipeline orchestration.
//!
//! [`CapturePipeline`] drives a batch of capture sources through the
//! decoder, the reconstructors and the progress tracker, and fans every
//! observation out to subscribers as [`PipelineEvent`]s. Delivery is
//! synchronous and in-order on the driving thread; a subscriber that needs
//! isolation must buffer into its own worker.
//!
//! Failure containment mirrors the error taxonomy: a malformed frame is
//! dropped (counted, logged at debug), a failing file is reported `Failed`
//! and skipped, and the batch always runs to completion over all supplied
//! files.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::decode::{decode_frame, DecodeOutcome, DecodedPacket, TransportProtocol};
use crate::io::{FilePacketSource, FrameRead};
use crate::progress::ProgressTracker;
use crate::stream::{CloseReason, TcpSession, TcpSessionBuilder, UdpStream, UdpStreamBuilder};

/// Per-file processing status, reported once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Started,
    Finished,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Started => "started",
            FileStatus::Finished => "finished",
            FileStatus::Failed => "failed",
        }
    }
}

/// A reconstructed session or stream handed to subscribers exactly once.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    Tcp(&'a TcpSession),
    Udp(&'a UdpStream),
}

impl SessionEvent<'_> {
    pub fn protocol(&self) -> TransportProtocol {
        match self {
            SessionEvent::Tcp(_) => TransportProtocol::Tcp,
            SessionEvent::Udp(_) => TransportProtocol::Udp,
        }
    }
}

/// Notifications delivered synchronously to pipeline subscribers.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// A file moved to a new processing status.
    FileStatus {
        path: &'a Path,
        status: FileStatus,
    },
    /// A frame decoded into a transport packet.
    PacketArrived {
        protocol: TransportProtocol,
        packet: &'a DecodedPacket,
    },
    /// A session or stream finished reconstruction.
    SessionArrived(SessionEvent<'a>),
    /// The rounded batch percentage changed.
    ProgressChanged { percent: u8 },
    /// All files of the batch have been processed.
    BatchFinished,
}

/// Feature toggles for the reconstructors. Both default off; a disabled
/// reconstructor is bypassed entirely and only per-packet events fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub build_tcp_sessions: bool,
    pub build_udp_streams: bool,
}

type Subscriber = Box<dyn FnMut(&PipelineEvent<'_>)>;

/// Orchestrates one batch at a time: sources in, events out.
pub struct CapturePipeline {
    config: PipelineConfig,
    tcp: TcpSessionBuilder,
    udp: UdpStreamBuilder,
    progress: ProgressTracker,
    subscribers: Vec<Subscriber>,
    /// Frames dropped by the decoder across the current batch.
    dropped_frames: u64,
    /// Monotonic arrival index across the whole batch.
    arrival_index: u64,
}

impl CapturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            tcp: TcpSessionBuilder::new(),
            udp: UdpStreamBuilder::new(),
            progress: ProgressTracker::new(),
            subscribers: Vec::new(),
            dropped_frames: 0,
            arrival_index: 0,
        }
    }

    /// Register a synchronous event subscriber.
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&PipelineEvent<'_>) + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Frames the decoder rejected during the current batch.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Process a batch of capture files in the order given.
    ///
    /// Never aborts: per-file failures are reported via
    /// [`FileStatus::Failed`] and the remaining files still run. Emits
    /// [`PipelineEvent::BatchFinished`] after the last file.
    pub fn process_files(&mut self, paths: &[PathBuf]) {
        self.begin_batch(paths);

        for path in paths {
            self.process_file(path);
        }

        self.emit(PipelineEvent::BatchFinished);
    }

    /// Reset per-batch state and register the files' declared sizes.
    fn begin_batch(&mut self, paths: &[PathBuf]) {
        self.tcp.clear();
        self.udp.clear();
        self.progress.clear();
        self.dropped_frames = 0;
        self.arrival_index = 0;

        let sizes: Vec<(PathBuf, u64)> = paths
            .iter()
            .map(|p| {
                let size = std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
                (p.clone(), size)
            })
            .collect();
        self.progress.register(&sizes);
        info!(
            files = paths.len(),
            total_bytes = self.progress.total_bytes(),
            "batch started"
        );
    }

    fn process_file(&mut self, path: &Path) {
        self.emit(PipelineEvent::FileStatus {
            path,
            status: FileStatus::Started,
        });

        let mut source = match FilePacketSource::open(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open capture");
                self.fail_file(path);
                return;
            }
        };

        match self.drain_source(&mut source) {
            Ok(()) => {
                self.flush_file(path);
                self.emit(PipelineEvent::FileStatus {
                    path,
                    status: FileStatus::Finished,
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "capture read failed");
                self.fail_file(path);
            }
        }
    }

    /// Drive one already-open source through the per-file path.
    ///
    /// This is the live-capture hook: any [`FrameRead`] can be mixed into a
    /// batch under a label that stands in for the file path in events.
    pub fn process_source(&mut self, label: &Path, source: &mut dyn FrameRead) {
        self.emit(PipelineEvent::FileStatus {
            path: label,
            status: FileStatus::Started,
        });
        match self.drain_source(source) {
            Ok(()) => {
                self.flush_file(label);
                self.emit(PipelineEvent::FileStatus {
                    path: label,
                    status: FileStatus::Finished,
                });
            }
            Err(e) => {
                warn!(label = %label.display(), error = %e, "source read failed");
                self.fail_file(label);
            }
        }
    }

    /// Pull frames until the source is exhausted.
    fn drain_source(&mut self, source: &mut dyn FrameRead) -> Result<(), crate::error::SourceError> {
        while let Some(frame) = source.next_frame()? {
            self.arrival_index += 1;
            let arrival = self.arrival_index;

            match decode_frame(frame.link_type, &frame.data) {
                Ok(DecodeOutcome::Transport(packet)) => {
                    self.emit(PipelineEvent::PacketArrived {
                        protocol: packet.protocol(),
                        packet: &packet,
                    });
                    match packet.protocol() {
                        TransportProtocol::Tcp if self.config.build_tcp_sessions => {
                            if let Some(session) = self.tcp.handle_packet(&packet, arrival) {
                                self.emit(PipelineEvent::SessionArrived(SessionEvent::Tcp(
                                    &session,
                                )));
                            }
                        }
                        TransportProtocol::Udp if self.config.build_udp_streams => {
                            self.udp.handle_packet(&packet, arrival);
                        }
                        _ => {}
                    }
                }
                Ok(DecodeOutcome::Other) => {}
                Err(e) => {
                    self.dropped_frames += 1;
                    debug!(
                        frame = frame.frame_number,
                        error = %e,
                        "dropped undecodable frame"
                    );
                }
            }

            // Every frame counts toward progress, decodable or not.
            if let Some(percent) = self.progress.notify_consumed(frame.data.len() as u64) {
                self.emit(PipelineEvent::ProgressChanged { percent });
            }
        }
        Ok(())
    }

    /// Emit everything the reconstructors accumulated for a finished file.
    fn flush_file(&mut self, path: &Path) {
        let sessions = self.tcp.flush(CloseReason::EndOfCapture);
        for session in &sessions {
            self.emit(PipelineEvent::SessionArrived(SessionEvent::Tcp(session)));
        }
        let streams = self.udp.flush();
        for stream in &streams {
            self.emit(PipelineEvent::SessionArrived(SessionEvent::Udp(stream)));
        }
        debug!(
            path = %path.display(),
            tcp_sessions = sessions.len(),
            udp_streams = streams.len(),
            "file flushed"
        );
        if let Some(percent) = self.progress.notify_file_complete(path) {
            self.emit(PipelineEvent::ProgressChanged { percent });
        }
    }

    /// A failed file emits nothing partial: its un-emitted sessions are
    /// discarded, its bytes are still accounted, and the batch moves on.
    fn fail_file(&mut self, path: &Path) {
        self.tcp.clear();
        self.udp.clear();
        if let Some(percent) = self.progress.notify_file_complete(path) {
            self.emit(PipelineEvent::ProgressChanged { percent });
        }
        self.emit(PipelineEvent::FileStatus {
            path,
            status: FileStatus::Failed,
        });
    }

    fn emit(&mut self, event: PipelineEvent<'_>) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }
}
