//! TCP gateway transport
//!
//! Talks to a CAN-over-TCP gateway that forwards every bus frame as a
//! fixed 13-byte record in both directions.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Buf, BytesMut};

use super::BusTransport;
use crate::error::{RailError, Result};
use crate::protocol::{decode_wire, encode_wire, Frame, WIRE_SIZE};

/// Outbound bytes allowed to queue up before sends are refused
const MAX_PENDING_OUT: usize = 64 * WIRE_SIZE;

/// Non-blocking connection to a CAN-over-TCP gateway
pub struct TcpBus {
    /// Socket in non-blocking mode
    stream: TcpStream,

    /// Bytes received but not yet forming a whole frame
    inbound: BytesMut,

    /// Bytes accepted for sending but not yet written
    outbound: BytesMut,

    /// Set once the gateway closed its end
    closed: bool,

    /// Peer address for logging
    peer_addr: String,
}

impl TcpBus {
    /// Connect to a gateway
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let socket_addr = resolve(addr)?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
        Self::from_stream(stream)
    }

    /// Wrap an already connected stream
    ///
    /// Disables Nagle's algorithm and switches the socket to
    /// non-blocking mode.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        tracing::debug!("Connected to gateway {}", peer_addr);

        Ok(Self {
            stream,
            inbound: BytesMut::with_capacity(16 * WIRE_SIZE),
            outbound: BytesMut::with_capacity(4 * WIRE_SIZE),
            closed: false,
            peer_addr,
        })
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Write as much queued output as the socket accepts
    fn flush_outbound(&mut self) -> Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.closed = true;
                    return Err(RailError::Transport(format!(
                        "gateway {} closed the connection",
                        self.peer_addr
                    )));
                }
                Ok(n) => self.outbound.advance(n),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Drain whatever the socket has buffered
    fn fill_inbound(&mut self) -> Result<()> {
        let mut chunk = [0u8; 32 * WIRE_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    return Ok(());
                }
                Ok(n) => self.inbound.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl BusTransport for TcpBus {
    fn try_send(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(RailError::Transport(format!(
                "gateway {} closed the connection",
                self.peer_addr
            )));
        }

        self.flush_outbound()?;
        if self.outbound.len() + WIRE_SIZE > MAX_PENDING_OUT {
            return Err(RailError::Transport(format!(
                "send queue to {} is full",
                self.peer_addr
            )));
        }

        self.outbound.extend_from_slice(&encode_wire(frame));
        self.flush_outbound()
    }

    fn try_receive(&mut self) -> Result<Option<Frame>> {
        if !self.closed {
            self.flush_outbound()?;
            self.fill_inbound()?;
        }

        if self.inbound.len() >= WIRE_SIZE {
            let record = self.inbound.split_to(WIRE_SIZE);
            return Ok(Some(decode_wire(&record)?));
        }

        if self.closed {
            return Err(RailError::Transport(format!(
                "gateway {} closed the connection",
                self.peer_addr
            )));
        }

        Ok(None)
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| RailError::Config(format!("cannot resolve gateway address {}", addr)))
}
