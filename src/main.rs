use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pcapflow::pipeline::{
    CapturePipeline, FileStatus, PipelineConfig, PipelineEvent, SessionEvent,
};

/// Reconstruct TCP sessions and UDP streams from packet capture files.
#[derive(Parser, Debug)]
#[command(name = "pcapflow", version, about)]
struct Args {
    /// Capture files to process (pcap, pcapng, optionally gzipped)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Reconstruct TCP sessions
    #[arg(long)]
    tcp: bool,

    /// Group UDP streams
    #[arg(long)]
    udp: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !args.tcp && !args.udp {
        bail!("nothing to do: pass --tcp and/or --udp");
    }

    let mut pipeline = CapturePipeline::new(PipelineConfig {
        build_tcp_sessions: args.tcp,
        build_udp_streams: args.udp,
    });

    pipeline.subscribe(|event| match event {
        PipelineEvent::FileStatus { path, status } => {
            if *status == FileStatus::Failed {
                eprintln!("{}: failed", path.display());
            } else {
                println!("{}: {}", path.display(), status.as_str());
            }
        }
        PipelineEvent::SessionArrived(SessionEvent::Tcp(session)) => {
            let reason = session
                .close_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown");
            println!(
                "tcp  {}  {} -> {} bytes, {} <- {} bytes ({})",
                session.key,
                session.to_server().packets,
                session.to_server().data.bytes_filled(),
                session.to_client().packets,
                session.to_client().data.bytes_filled(),
                reason,
            );
        }
        PipelineEvent::SessionArrived(SessionEvent::Udp(stream)) => {
            println!(
                "udp  {}  {} packets, {} bytes",
                stream.key,
                stream.packets.len(),
                stream.payload_bytes(),
            );
        }
        PipelineEvent::ProgressChanged { percent } => {
            eprint!("\r{percent:>3}%");
            if *percent == 100 {
                eprintln!();
            }
        }
        _ => {}
    });

    pipeline.process_files(&args.files);

    if pipeline.dropped_frames() > 0 {
        eprintln!("dropped {} undecodable frames", pipeline.dropped_frames());
    }
    Ok(())
}
