//! In-memory transport
//!
//! Records sent frames and serves inbound frames from a queue. An
//! optional responder closure turns each sent frame into replies,
//! which lets a [`TrackBox`](crate::sim::TrackBox) stand in for the
//! hardware.

use std::collections::VecDeque;

use super::BusTransport;
use crate::error::{RailError, Result};
use crate::protocol::Frame;

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

/// Scripted bus for tests and demos
#[derive(Default)]
pub struct MockBus {
    /// Frames waiting to be received
    inbound: VecDeque<Frame>,

    /// Every frame accepted by `try_send`, in order
    sent: Vec<Frame>,

    /// Produces replies for each sent frame
    responder: Option<Responder>,

    /// When set, every send is refused
    fail_sends: bool,
}

impl MockBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus whose replies come from `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&Frame) -> Vec<Frame> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queue a frame for reception
    pub fn push_inbound(&mut self, frame: Frame) {
        self.inbound.push_back(frame);
    }

    /// Queue several frames for reception
    pub fn extend_inbound(&mut self, frames: impl IntoIterator<Item = Frame>) {
        self.inbound.extend(frames);
    }

    /// Number of frames not yet received
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Frames sent so far
    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }

    /// Forget recorded sends
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Make every subsequent send fail (or succeed again)
    pub fn set_fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }
}

impl BusTransport for MockBus {
    fn try_send(&mut self, frame: &Frame) -> Result<()> {
        if self.fail_sends {
            return Err(RailError::Transport("mock bus refuses sends".to_string()));
        }

        self.sent.push(*frame);
        if let Some(responder) = self.responder.as_mut() {
            let replies = responder(frame);
            self.inbound.extend(replies);
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Frame>> {
        Ok(self.inbound.pop_front())
    }
}
