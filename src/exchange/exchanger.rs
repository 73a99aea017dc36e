//! Exchanger
//!
//! Turns a non-blocking transport into request/reply calls with a
//! deadline.

use std::time::Duration;

use super::clock::{Clock, SystemClock};
use super::monitor::{BusMonitor, SilentMonitor};
use crate::config::{Config, PollStrategy};
use crate::error::{RailError, Result};
use crate::protocol::{decode_frame, encode_frame, Message};
use crate::transport::BusTransport;

/// Outcome of taking one frame off the bus
enum Polled {
    Empty,
    Discarded,
    Message(Message),
}

/// Request/reply engine for one controller session
///
/// ## Correlation
/// Every outgoing message carries the session hash. A reply is the
/// first inbound message with the request's opcode and the response
/// flag set; the hash is not compared, because it identifies the
/// controller rather than an individual request. Only one request
/// may be outstanding at a time.
///
/// ## Polling
/// Waiting is a polling loop bounded by a deadline on the injected
/// [`Clock`]. Between empty polls the exchanger spins, yields, or
/// sleeps according to its [`PollStrategy`]; sleeps never extend
/// past the deadline. Every pass takes at most one frame, so a flood of
/// traffic (malformed or not) cannot hold the loop past the deadline.
pub struct Exchanger<T: BusTransport, C: Clock = SystemClock> {
    /// The bus channel (exclusively owned)
    transport: T,

    /// Time source for deadlines and pauses
    clock: C,

    /// Traffic sink
    monitor: Box<dyn BusMonitor + Send>,

    /// Correlation tag stamped on every outgoing message
    hash: u16,

    /// Idle behaviour between empty polls
    poll: PollStrategy,
}

impl<T: BusTransport> Exchanger<T, SystemClock> {
    /// Create an exchanger on the wall clock
    pub fn new(transport: T, config: &Config) -> Self {
        Self::with_clock(transport, SystemClock, config)
    }
}

impl<T: BusTransport, C: Clock> Exchanger<T, C> {
    /// Create an exchanger on the given clock
    pub fn with_clock(transport: T, clock: C, config: &Config) -> Self {
        Self {
            transport,
            clock,
            monitor: Box::new(SilentMonitor),
            hash: config.hash,
            poll: config.poll,
        }
    }

    /// Replace the traffic monitor
    pub fn with_monitor(mut self, monitor: impl BusMonitor + Send + 'static) -> Self {
        self.monitor = Box::new(monitor);
        self
    }

    /// The session's correlation tag
    pub fn hash(&self) -> u16 {
        self.hash
    }

    /// The time source
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give up the exchanger and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    // =========================================================================
    // Send / Receive
    // =========================================================================

    /// Stamp the session hash onto `message` and put it on the bus
    ///
    /// Any hash the caller set is overwritten. A refused send comes
    /// back as [`RailError::SendFailed`]; nothing else happens.
    pub fn send(&mut self, message: &mut Message) -> Result<()> {
        message.hash = self.hash;
        let frame = encode_frame(message);

        match self.transport.try_send(&frame) {
            Ok(()) => {
                self.monitor.sent(message);
                Ok(())
            }
            Err(e) => {
                self.monitor.send_failed(message, &e);
                Err(RailError::SendFailed {
                    opcode: message.opcode,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Take the next decodable message off the bus without waiting
    ///
    /// Frames that fail to decode are reported to the monitor and
    /// skipped.
    pub fn receive(&mut self) -> Result<Option<Message>> {
        loop {
            match self.poll_once()? {
                Polled::Message(message) => return Ok(Some(message)),
                Polled::Discarded => continue,
                Polled::Empty => return Ok(None),
            }
        }
    }

    /// Take at most one frame off the bus
    fn poll_once(&mut self) -> Result<Polled> {
        let frame = match self.transport.try_receive()? {
            Some(frame) => frame,
            None => return Ok(Polled::Empty),
        };

        match decode_frame(&frame) {
            Ok(message) => {
                self.monitor.received(&message);
                Ok(Polled::Message(message))
            }
            Err(e) => {
                tracing::warn!("Discarding malformed frame id=0x{:08x}: {}", frame.id, e);
                self.monitor.discarded(&frame, &e);
                Ok(Polled::Discarded)
            }
        }
    }

    // =========================================================================
    // Exchange
    // =========================================================================

    /// Send `request` and wait up to `timeout` for its reply
    ///
    /// Returns the first inbound message with the same opcode and the
    /// response flag set. Unrelated traffic seen meanwhile is dropped.
    pub fn exchange(&mut self, request: &Message, timeout: Duration) -> Result<Message> {
        let mut out = *request;
        self.send(&mut out)?;

        let opcode = out.opcode;
        self.await_reply(opcode, timeout, |candidate| {
            candidate.opcode == opcode && candidate.response
        })
    }

    /// Poll until a message satisfies `accept` or `timeout` elapses
    ///
    /// `opcode` only labels the timeout error. On timeout nothing is
    /// returned; rejected candidates are never handed back.
    pub fn await_reply<F>(&mut self, opcode: u8, timeout: Duration, mut accept: F) -> Result<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        let deadline = self.clock.now() + timeout;

        loop {
            let now = self.clock.now();
            if now >= deadline {
                break;
            }

            // One frame per pass so the deadline is checked between frames
            match self.poll_once()? {
                Polled::Message(candidate) if accept(&candidate) => return Ok(candidate),
                Polled::Message(candidate) => {
                    tracing::trace!(
                        "Skipping unrelated message opcode=0x{:02x} response={} while awaiting 0x{:02x}",
                        candidate.opcode,
                        candidate.response,
                        opcode
                    );
                }
                Polled::Discarded => {}
                Polled::Empty => self.idle(deadline - now),
            }
        }

        self.monitor.timed_out(opcode, timeout);
        Err(RailError::Timeout {
            opcode,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Pause between empty polls, never beyond `remaining`
    fn idle(&self, remaining: Duration) {
        match self.poll {
            PollStrategy::Spin => std::hint::spin_loop(),
            PollStrategy::Yield => std::thread::yield_now(),
            PollStrategy::Sleep { micros } => {
                self.clock.sleep(Duration::from_micros(micros).min(remaining));
            }
        }
    }

    /// Wait for `duration` on the exchanger's clock
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.clock.sleep(duration);
        }
    }
}
