//! Deterministic simulation harness for accessory session testing.
//!
//! [`SimTransport`] implements the transport traits in memory: accessories
//! attach and detach on command, stream readiness is queued as events, and
//! reads and writes can be fragmented by a seeded RNG or failed on demand.
//! [`ModelSession`] is the reference model used by property tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_transport;

pub use model::{ModelSession, Operation, OperationResult};
pub use sim_transport::{SimInputStream, SimOutputStream, SimTransport};

use accessory_core::Notification;
use tokio::sync::broadcast::{Receiver, error::TryRecvError};
use tracing::warn;

/// Collect every notification currently queued on `rx` without waiting.
///
/// Notifications lost to a lagging receiver are skipped with a warning.
pub fn drain_notifications(rx: &mut Receiver<Notification>) -> Vec<Notification> {
    let mut drained = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notification) => drained.push(notification),
            Err(TryRecvError::Lagged(missed)) => warn!(missed, "notification receiver lagged"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
        }
    }
}
