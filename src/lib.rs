//! # railcan
//!
//! Command/control protocol for model-railway track-format processors
//! on a CAN bus:
//! - Message model with a text form and a 29-bit CAN frame form
//! - Blocking request/reply exchange with deadline and opcode matching
//! - Catalog of locomotive, accessory, power and configuration commands
//! - Simulator and CAN-over-TCP gateway for running without hardware
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TrackController                           │
//! │          (builds requests, extracts reply fields)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Message
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Exchanger                               │
//! │        (stamps hash, polls for opcode + response)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Frame (29-bit id + data)
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   TcpBus    │          │   MockBus   │
//!   │  (gateway)  │          │ (in-memory) │
//!   └──────┬──────┘          └──────┬──────┘
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Server    │─────────▶│  TrackBox   │
//!   │  (13-byte)  │          │ (simulator) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use railcan::{Config, TrackController};
//! use railcan::sim::TrackBox;
//! use railcan::transport::MockBus;
//!
//! let mut track_box = TrackBox::default();
//! let bus = MockBus::with_responder(move |frame| track_box.handle_frame(frame));
//! let mut controller = TrackController::new(bus, Config::default());
//!
//! controller.set_loco_speed(0x4001, 512).unwrap();
//! assert_eq!(controller.get_loco_speed(0x4001).unwrap(), 512);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod transport;
pub mod exchange;
pub mod controller;
pub mod sim;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ParseError, RailError, Result};
pub use config::{Config, PollStrategy};
pub use protocol::{Frame, Message};
pub use exchange::Exchanger;
pub use controller::{Direction, TrackController};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of railcan
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
