//! TCP Gateway Server
//!
//! Accepts gateway clients and gives each its own handler thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::connection::Connection;
use super::hub::Hub;
use crate::error::Result;
use crate::sim::TrackBox;

/// Pause of the accept loop when no client is waiting
const ACCEPT_IDLE: Duration = Duration::from_millis(10);

/// CAN-over-TCP gateway in front of a simulated track box
pub struct Server {
    listener: TcpListener,
    hub: Arc<Hub>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind the listening socket
    ///
    /// Use port 0 to let the OS pick a free port.
    pub fn bind(addr: &str, track_box: TrackBox) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            hub: Arc::new(Hub::new(track_box)),
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        })
    }

    /// Address the server listens on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The shared bus (for inspecting simulator state)
    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    /// Flag that stops [`run`](Self::run) when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&mut self) -> Result<()> {
        tracing::info!("Gateway listening on {}", self.listener.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let hub = Arc::clone(&self.hub);
                    let shutdown = Arc::clone(&self.shutdown);
                    let mut connection = match Connection::new(stream, hub, shutdown) {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!("Rejecting client {}: {}", peer, e);
                            continue;
                        }
                    };

                    let worker = thread::Builder::new()
                        .name(format!("gateway-{}", peer))
                        .spawn(move || {
                            let _ = connection.handle();
                        })?;
                    self.workers.push(worker);
                    self.workers.retain(|w| !w.is_finished());
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_IDLE),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        tracing::info!("Gateway stopped");
        Ok(())
    }
}
