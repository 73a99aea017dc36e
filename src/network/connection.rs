//! Connection Handler
//!
//! Handles individual gateway client connections.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use crossbeam::channel::Receiver;

use super::hub::{ClientId, Hub};
use crate::error::{RailError, Result};
use crate::protocol::{decode_wire, encode_wire, Frame, WIRE_SIZE};

/// How long a read may block before outbound frames are flushed
const READ_SLICE: Duration = Duration::from_millis(5);

/// Handles a single gateway client
pub struct Connection {
    /// TCP stream (blocking with a short read timeout)
    stream: TcpStream,

    /// Bytes received but not yet forming a whole frame
    inbound: BytesMut,

    /// Frames the hub wants delivered to this client
    outbox: Receiver<Frame>,

    /// Shared bus
    hub: Arc<Hub>,

    /// Hub registration
    id: ClientId,

    /// Server-wide shutdown flag
    shutdown: Arc<AtomicBool>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler and register it with the hub
    pub fn new(stream: TcpStream, hub: Arc<Hub>, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_SLICE))?;

        let (id, outbox) = hub.register();

        Ok(Self {
            stream,
            inbound: BytesMut::with_capacity(16 * WIRE_SIZE),
            outbox,
            hub,
            id,
            shutdown,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Alternates between delivering queued frames and reading client
    /// frames. Returns when the client disconnects or the server shuts
    /// down.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Gateway client connected from {}", self.peer_addr);

        let result = self.serve();
        self.hub.unregister(self.id);

        match result {
            Ok(()) => {
                tracing::debug!("Gateway client {} disconnected", self.peer_addr);
                Ok(())
            }
            // Client went away while frames were being delivered
            Err(RailError::Io(ref e))
                if matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                ) =>
            {
                tracing::debug!("Gateway client {} disconnected during write: {}", self.peer_addr, e);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Gateway client {} failed: {}", self.peer_addr, e);
                Err(e)
            }
        }
    }

    fn serve(&mut self) -> Result<()> {
        let mut chunk = [0u8; 32 * WIRE_SIZE];

        while !self.shutdown.load(Ordering::Relaxed) {
            self.deliver()?;

            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    self.process_inbound();
                }
                Err(ref e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                    ) =>
                {
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Submit every complete frame received so far
    fn process_inbound(&mut self) {
        while self.inbound.len() >= WIRE_SIZE {
            match decode_wire(&self.inbound[..WIRE_SIZE]) {
                Ok(frame) => {
                    tracing::trace!(
                        "Frame from {}: id=0x{:08x} dlc={}",
                        self.peer_addr,
                        frame.id,
                        frame.dlc
                    );
                    self.hub.submit(self.id, &frame);
                }
                Err(e) => tracing::warn!("Bad frame from {}: {}", self.peer_addr, e),
            }
            self.inbound.advance(WIRE_SIZE);
        }
    }

    /// Write every queued frame to the client
    fn deliver(&mut self) -> Result<()> {
        let mut wrote = false;
        while let Ok(frame) = self.outbox.try_recv() {
            self.stream.write_all(&encode_wire(&frame))?;
            wrote = true;
        }
        if wrote {
            self.stream.flush()?;
        }
        Ok(())
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
