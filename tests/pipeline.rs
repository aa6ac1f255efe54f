//! End-to-end pipeline tests over real capture files on disk.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use etherparse::PacketBuilder;
use tempfile::NamedTempFile;

use pcapflow::pipeline::{
    CapturePipeline, FileStatus, PipelineConfig, PipelineEvent, SessionEvent,
};

const CLIENT_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
const SERVER_MAC: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];
const CLIENT_IP: [u8; 4] = [10, 0, 0, 1];
const SERVER_IP: [u8; 4] = [10, 0, 0, 2];

struct TcpFrame {
    to_server: bool,
    seq: u32,
    ack: Option<u32>,
    syn: bool,
    fin: bool,
    rst: bool,
    payload: &'static [u8],
}

impl TcpFrame {
    fn new(to_server: bool, seq: u32) -> Self {
        TcpFrame {
            to_server,
            seq,
            ack: None,
            syn: false,
            fin: false,
            rst: false,
            payload: b"",
        }
    }

    fn syn(mut self) -> Self {
        self.syn = true;
        self
    }

    fn ack(mut self, ack: u32) -> Self {
        self.ack = Some(ack);
        self
    }

    fn fin(mut self) -> Self {
        self.fin = true;
        self
    }

    fn rst(mut self) -> Self {
        self.rst = true;
        self
    }

    fn payload(mut self, payload: &'static [u8]) -> Self {
        self.payload = payload;
        self
    }

    fn build(&self) -> Vec<u8> {
        let (src_mac, dst_mac, src_ip, dst_ip, src_port, dst_port) = if self.to_server {
            (CLIENT_MAC, SERVER_MAC, CLIENT_IP, SERVER_IP, 40000u16, 80u16)
        } else {
            (SERVER_MAC, CLIENT_MAC, SERVER_IP, CLIENT_IP, 80, 40000)
        };
        let mut tcp = PacketBuilder::ethernet2(src_mac, dst_mac)
            .ipv4(src_ip, dst_ip, 64)
            .tcp(src_port, dst_port, self.seq, 8192);
        if self.syn {
            tcp = tcp.syn();
        }
        if self.fin {
            tcp = tcp.fin();
        }
        if self.rst {
            tcp = tcp.rst();
        }
        if let Some(ack) = self.ack {
            tcp = tcp.ack(ack);
        }
        let mut frame = Vec::new();
        tcp.write(&mut frame, self.payload).unwrap();
        frame
    }
}

fn udp_frame(to_server: bool, payload: &[u8]) -> Vec<u8> {
    let (src_mac, dst_mac, src_ip, dst_ip, src_port, dst_port) = if to_server {
        (CLIENT_MAC, SERVER_MAC, CLIENT_IP, SERVER_IP, 5000u16, 53u16)
    } else {
        (SERVER_MAC, CLIENT_MAC, SERVER_IP, CLIENT_IP, 53, 5000)
    };
    let builder = PacketBuilder::ethernet2(src_mac, dst_mac)
        .ipv4(src_ip, dst_ip, 64)
        .udp(src_port, dst_port);
    let mut frame = Vec::new();
    builder.write(&mut frame, payload).unwrap();
    frame
}

/// Wrap raw Ethernet frames in a legacy PCAP file.
fn write_pcap(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // magic, little endian
    data.extend_from_slice(&[0x02, 0x00, 0x04, 0x00]); // version 2.4
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // thiszone
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // sigfigs
    data.extend_from_slice(&[0xff, 0xff, 0x00, 0x00]); // snaplen
    data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // network: Ethernet

    for (i, frame) in frames.iter().enumerate() {
        data.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(frame);
    }
    data
}

fn pcap_file(frames: &[Vec<u8>]) -> NamedTempFile {
    let temp = NamedTempFile::with_suffix(".pcap").unwrap();
    std::fs::write(temp.path(), write_pcap(frames)).unwrap();
    temp
}

/// A full handshake, one request, one response, and an orderly close.
fn clean_session_frames() -> Vec<Vec<u8>> {
    vec![
        TcpFrame::new(true, 999).syn().build(),
        TcpFrame::new(false, 1999).syn().ack(1000).build(),
        TcpFrame::new(true, 1000).ack(2000).build(),
        TcpFrame::new(true, 1000).ack(2000).payload(b"GET / HTTP").build(),
        TcpFrame::new(false, 2000).ack(1010).payload(b"200 OK").build(),
        TcpFrame::new(true, 1010).ack(2006).fin().build(),
        TcpFrame::new(false, 2006).ack(1011).build(),
        TcpFrame::new(false, 2006).ack(1011).fin().build(),
        TcpFrame::new(true, 1011).ack(2007).build(),
    ]
}

/// Owned copies of everything a subscriber saw, for assertions after the run.
#[derive(Default)]
struct Observed {
    statuses: Vec<(PathBuf, FileStatus)>,
    tcp_packets: usize,
    udp_packets: usize,
    tcp_sessions: Vec<(Vec<u8>, Vec<u8>, &'static str)>,
    udp_streams: Vec<Vec<Vec<u8>>>,
    percents: Vec<u8>,
    batch_finished: bool,
}

fn observing(pipeline: &mut CapturePipeline) -> Rc<RefCell<Observed>> {
    let observed = Rc::new(RefCell::new(Observed::default()));
    let sink = Rc::clone(&observed);
    pipeline.subscribe(move |event| {
        let mut o = sink.borrow_mut();
        match event {
            PipelineEvent::FileStatus { path, status } => {
                o.statuses.push((path.to_path_buf(), *status));
            }
            PipelineEvent::PacketArrived { protocol, .. } => {
                match protocol {
                    pcapflow::decode::TransportProtocol::Tcp => o.tcp_packets += 1,
                    pcapflow::decode::TransportProtocol::Udp => o.udp_packets += 1,
                }
            }
            PipelineEvent::SessionArrived(SessionEvent::Tcp(session)) => {
                o.tcp_sessions.push((
                    session.to_server().data.contiguous_prefix().to_vec(),
                    session.to_client().data.contiguous_prefix().to_vec(),
                    session.close_reason.map(|r| r.as_str()).unwrap_or(""),
                ));
            }
            PipelineEvent::SessionArrived(SessionEvent::Udp(stream)) => {
                o.udp_streams
                    .push(stream.packets.iter().map(|p| p.payload.clone()).collect());
            }
            PipelineEvent::ProgressChanged { percent } => o.percents.push(*percent),
            PipelineEvent::BatchFinished => o.batch_finished = true,
        }
    });
    observed
}

fn both_on() -> PipelineConfig {
    PipelineConfig {
        build_tcp_sessions: true,
        build_udp_streams: true,
    }
}

// Test 1: A clean TCP session on disk comes back reassembled, emitted once,
// with a normal close
#[test]
fn test_clean_tcp_session_from_file() {
    let capture = pcap_file(&clean_session_frames());
    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[capture.path().to_path_buf()]);

    let o = observed.borrow();
    assert_eq!(o.tcp_packets, 9);
    assert_eq!(o.tcp_sessions.len(), 1);
    let (to_server, to_client, reason) = &o.tcp_sessions[0];
    assert_eq!(to_server, b"GET / HTTP");
    assert_eq!(to_client, b"200 OK");
    assert_eq!(*reason, "normal");
    assert!(o.batch_finished);
    assert_eq!(
        o.statuses,
        vec![
            (capture.path().to_path_buf(), FileStatus::Started),
            (capture.path().to_path_buf(), FileStatus::Finished),
        ]
    );
    assert_eq!(pipeline.dropped_frames(), 0);
}

// Test 2: An unterminated session is force-closed and emitted at end of file
#[test]
fn test_end_of_capture_flush() {
    let frames = vec![
        TcpFrame::new(true, 999).syn().build(),
        TcpFrame::new(false, 1999).syn().ack(1000).build(),
        TcpFrame::new(true, 1000).ack(2000).payload(b"partial").build(),
    ];
    let capture = pcap_file(&frames);
    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[capture.path().to_path_buf()]);

    let o = observed.borrow();
    assert_eq!(o.tcp_sessions.len(), 1);
    let (to_server, _, reason) = &o.tcp_sessions[0];
    assert_eq!(to_server, b"partial");
    assert_eq!(*reason, "end_of_capture");
}

// Test 3: UDP streams group both directions and keep duplicates
#[test]
fn test_udp_stream_from_file() {
    let frames = vec![
        udp_frame(true, b"query"),
        udp_frame(true, b"query"), // retransmitted duplicate
        udp_frame(false, b"answer"),
    ];
    let capture = pcap_file(&frames);
    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[capture.path().to_path_buf()]);

    let o = observed.borrow();
    assert_eq!(o.udp_packets, 3);
    assert_eq!(o.udp_streams.len(), 1);
    assert_eq!(
        o.udp_streams[0],
        vec![b"query".to_vec(), b"query".to_vec(), b"answer".to_vec()]
    );
}

// Test 4: A failing file is reported Failed and does not stop the batch
#[test]
fn test_failed_file_isolation() {
    let garbage = NamedTempFile::new().unwrap();
    std::fs::write(garbage.path(), b"not a capture at all").unwrap();
    let good = pcap_file(&clean_session_frames());

    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[garbage.path().to_path_buf(), good.path().to_path_buf()]);

    let o = observed.borrow();
    assert_eq!(
        o.statuses,
        vec![
            (garbage.path().to_path_buf(), FileStatus::Started),
            (garbage.path().to_path_buf(), FileStatus::Failed),
            (good.path().to_path_buf(), FileStatus::Started),
            (good.path().to_path_buf(), FileStatus::Finished),
        ]
    );
    // The good file's session still came through.
    assert_eq!(o.tcp_sessions.len(), 1);
    assert!(o.batch_finished);
}

// Test 5: Progress notifications are monotonic, deduplicated, and reach 100
#[test]
fn test_progress_reaches_completion() {
    let a = pcap_file(&clean_session_frames());
    let b = pcap_file(&[udp_frame(true, b"ping")]);

    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[a.path().to_path_buf(), b.path().to_path_buf()]);

    let o = observed.borrow();
    assert!(!o.percents.is_empty());
    assert!(o.percents.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*o.percents.last().unwrap(), 100);
}

// Test 6: An undecodable frame is dropped and counted, not fatal
#[test]
fn test_dropped_frame_counted() {
    // Ethernet header claiming IPv4, then a truncated IP header.
    let mut malformed = Vec::new();
    malformed.extend_from_slice(&SERVER_MAC);
    malformed.extend_from_slice(&CLIENT_MAC);
    malformed.extend_from_slice(&[0x08, 0x00]);
    malformed.extend_from_slice(&[0x45, 0x00, 0x00]);

    let frames = vec![malformed, udp_frame(true, b"still fine")];
    let capture = pcap_file(&frames);
    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[capture.path().to_path_buf()]);

    let o = observed.borrow();
    assert_eq!(pipeline.dropped_frames(), 1);
    assert_eq!(o.udp_packets, 1);
    assert_eq!(o.udp_streams.len(), 1);
    assert_eq!(
        o.statuses.last(),
        Some(&(capture.path().to_path_buf(), FileStatus::Finished))
    );
}

// Test 7: Disabled reconstructors are bypassed but packet events still fire
#[test]
fn test_reconstruction_toggles_off() {
    let mut frames = clean_session_frames();
    frames.push(udp_frame(true, b"ping"));
    let capture = pcap_file(&frames);

    let mut pipeline = CapturePipeline::new(PipelineConfig::default());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[capture.path().to_path_buf()]);

    let o = observed.borrow();
    assert_eq!(o.tcp_packets, 9);
    assert_eq!(o.udp_packets, 1);
    assert!(o.tcp_sessions.is_empty());
    assert!(o.udp_streams.is_empty());
    assert!(o.batch_finished);
}

// Test 8: Reusing the pipeline for a second batch starts from a clean slate
#[test]
fn test_batch_reuse() {
    let capture = pcap_file(&clean_session_frames());
    let mut pipeline = CapturePipeline::new(both_on());
    let observed = observing(&mut pipeline);

    pipeline.process_files(&[capture.path().to_path_buf()]);
    pipeline.process_files(&[capture.path().to_path_buf()]);

    let o = observed.borrow();
    // One session per run, and the second run's progress starts over.
    assert_eq!(o.tcp_sessions.len(), 2);
    assert_eq!(*o.percents.last().unwrap(), 100);
    assert_eq!(pipeline.dropped_frames(), 0);
}
