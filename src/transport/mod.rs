//! Transport Module
//!
//! Non-blocking access to one physical CAN channel.
//!
//! ## Implementations
//! - [`TcpBus`]: CAN-over-TCP gateway (13-byte frames)
//! - [`MockBus`]: scripted in-memory bus for tests and demos

mod tcp;
mod mock;

pub use tcp::TcpBus;
pub use mock::MockBus;

use crate::error::Result;
use crate::protocol::Frame;

/// A single, exclusively owned CAN channel
///
/// Neither call may block. A refused send is reported as an error;
/// an empty receive queue is `Ok(None)`.
pub trait BusTransport {
    /// Place a frame on the bus
    fn try_send(&mut self, frame: &Frame) -> Result<()>;

    /// Take the next inbound frame, if one is available
    fn try_receive(&mut self) -> Result<Option<Frame>>;
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn try_send(&mut self, frame: &Frame) -> Result<()> {
        (**self).try_send(frame)
    }

    fn try_receive(&mut self) -> Result<Option<Frame>> {
        (**self).try_receive()
    }
}
