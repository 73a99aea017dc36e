//! railcan Simulator Binary
//!
//! Runs a simulated track-format processor behind a CAN-over-TCP
//! gateway, so the CLI can be used without hardware.

use clap::Parser;
use railcan::network::Server;
use railcan::sim::TrackBox;
use tracing_subscriber::{fmt, EnvFilter};

/// railcan simulator gateway
#[derive(Parser, Debug)]
#[command(name = "railcan-sim")]
#[command(about = "Simulated track-format processor behind a CAN-over-TCP gateway")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:15731")]
    listen: String,

    /// Hash carried by simulator replies (hex)
    #[arg(long, default_value = "4711", value_parser = parse_hex_u16)]
    hash: u16,

    /// Device uid (hex)
    #[arg(long, default_value = "47475346", value_parser = parse_hex_u32)]
    uid: u32,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,railcan=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("railcan simulator v{}", railcan::VERSION);
    tracing::info!("Reply hash: 0x{:04x}, uid: 0x{:08x}", args.hash, args.uid);

    let mut server = match Server::bind(&args.listen, TrackBox::new(args.hash, args.uid)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", args.listen, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}
