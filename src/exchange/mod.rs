//! Exchange Module
//!
//! Send-then-await-reply over a shared, non-blocking bus.
//!
//! ## States (per call)
//! ```text
//!   Idle ──send──▶ Awaiting ──match──▶ Matched (Ok(reply))
//!                     │
//!                     └──deadline──▶ TimedOut (Err(Timeout))
//! ```

mod clock;
mod exchanger;
mod monitor;

pub use clock::{Clock, ManualClock, SystemClock};
pub use exchanger::Exchanger;
pub use monitor::{BusMonitor, SilentMonitor, TracingMonitor};
