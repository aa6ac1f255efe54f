//! Forensic capture ingestion and transport reconstruction.
//!
//! `pcapflow` reads packet capture files (pcap, pcapng, either optionally
//! gzip-compressed), decodes each frame down to its TCP or UDP transport
//! layer, and rebuilds application-level conversations: TCP sessions with
//! per-direction byte reassembly and explicit gap tracking, and UDP flows
//! grouped in arrival order. A [`pipeline::CapturePipeline`] drives whole
//! batches of files and reports everything it observes to subscribers.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use pcapflow::pipeline::{CapturePipeline, PipelineConfig, PipelineEvent};
//!
//! let mut pipeline = CapturePipeline::new(PipelineConfig {
//!     build_tcp_sessions: true,
//!     build_udp_streams: true,
//! });
//! pipeline.subscribe(|event| {
//!     if let PipelineEvent::ProgressChanged { percent } = event {
//!         println!("{percent}%");
//!     }
//! });
//! pipeline.process_files(&[PathBuf::from("capture.pcap")]);
//! ```

pub mod decode;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod stream;

pub use error::{Error, Result};
