//! Network Module
//!
//! CAN-over-TCP gateway serving the simulator.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One handler thread per client
//! - Every frame is mirrored to all clients through the [`Hub`]

mod server;
mod connection;
mod hub;

pub use server::Server;
pub use connection::Connection;
pub use hub::{ClientId, Hub};
