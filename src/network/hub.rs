//! Gateway hub
//!
//! Shared state of the gateway: the simulated hardware and the set of
//! connected clients. Every frame that reaches the bus is fanned out
//! to all clients, the way a CAN gateway mirrors bus traffic.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::protocol::Frame;
use crate::sim::TrackBox;

/// Identifies a registered client
pub type ClientId = u64;

/// Simulated bus shared by all gateway connections
pub struct Hub {
    /// The hardware answering requests
    track_box: Mutex<TrackBox>,

    /// Outbound queues of connected clients
    clients: Mutex<Vec<(ClientId, Sender<Frame>)>>,

    next_id: AtomicU64,
}

impl Hub {
    pub fn new(track_box: TrackBox) -> Self {
        Self {
            track_box: Mutex::new(track_box),
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a client; frames for it arrive on the returned receiver
    pub fn register(&self) -> (ClientId, Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::unbounded();
        self.clients.lock().push((id, tx));
        (id, rx)
    }

    /// Remove a client
    pub fn unregister(&self, id: ClientId) {
        self.clients.lock().retain(|(client, _)| *client != id);
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Put a frame from `origin` on the bus
    ///
    /// Other clients see the frame itself; everyone sees the replies.
    pub fn submit(&self, origin: ClientId, frame: &Frame) {
        self.broadcast(Some(origin), frame);

        let replies = self.track_box.lock().handle_frame(frame);
        for reply in &replies {
            self.broadcast(None, reply);
        }
    }

    /// Inspect or modify the simulated hardware
    pub fn with_track_box<R>(&self, f: impl FnOnce(&mut TrackBox) -> R) -> R {
        f(&mut self.track_box.lock())
    }

    fn broadcast(&self, skip: Option<ClientId>, frame: &Frame) {
        // Dropped receivers mean the connection is gone
        self.clients.lock().retain(|(id, tx)| {
            if Some(*id) == skip {
                return true;
            }
            tx.send(*frame).is_ok()
        });
    }
}
