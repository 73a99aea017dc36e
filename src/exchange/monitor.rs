//! Bus traffic monitors
//!
//! The exchanger reports every frame it sends or receives to the
//! [`BusMonitor`] it was built with. Nothing is logged through global
//! state.

use std::time::Duration;

use crate::error::{ParseError, RailError};
use crate::protocol::{encode_text, opcode, Frame, Message};

/// Sink for bus traffic and exchange outcomes
///
/// All methods default to doing nothing.
pub trait BusMonitor {
    /// A message was placed on the bus
    fn sent(&mut self, _message: &Message) {}

    /// The transport refused a message
    fn send_failed(&mut self, _message: &Message, _error: &RailError) {}

    /// A message was taken off the bus
    fn received(&mut self, _message: &Message) {}

    /// An inbound frame could not be decoded and was dropped
    fn discarded(&mut self, _frame: &Frame, _error: &ParseError) {}

    /// No matching reply arrived in time
    fn timed_out(&mut self, _opcode: u8, _timeout: Duration) {}
}

/// Monitor that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentMonitor;

impl BusMonitor for SilentMonitor {}

/// Monitor that dumps traffic in text form through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl BusMonitor for TracingMonitor {
    fn sent(&mut self, message: &Message) {
        tracing::debug!(target: "railcan::bus", "==> {}", encode_text(message));
    }

    fn send_failed(&mut self, message: &Message, error: &RailError) {
        tracing::warn!(
            target: "railcan::bus",
            "!!! Send error ({}): {}",
            encode_text(message),
            error
        );
    }

    fn received(&mut self, message: &Message) {
        tracing::debug!(target: "railcan::bus", "<== {}", encode_text(message));
    }

    fn discarded(&mut self, frame: &Frame, error: &ParseError) {
        tracing::warn!(
            target: "railcan::bus",
            "!!! Dropped frame id=0x{:08x} dlc={}: {}",
            frame.id,
            frame.dlc,
            error
        );
    }

    fn timed_out(&mut self, opcode: u8, timeout: Duration) {
        tracing::debug!(
            target: "railcan::bus",
            "!!! Receive timeout for {} (0x{:02x}) after {:?}",
            opcode::name(opcode),
            opcode,
            timeout
        );
    }
}
