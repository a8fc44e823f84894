//! Notifications emitted to callers.
//!
//! Controller and monitor share one broadcast channel. Sending never blocks:
//! a subscriber that falls behind loses the oldest notifications, and a
//! notification sent with no subscribers is dropped.

use bytes::Bytes;

use crate::accessory::{Accessory, ConnectionId};

/// Why a session or binding ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The monitor observed the bound accessory detach
    AccessoryRemoved,
    /// A stream reported end-of-stream
    StreamEnded,
    /// A stream reported an error, or a stream read/write failed
    StreamError(String),
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A matching accessory was bound to the controller
    Connected(Accessory),

    /// The bound accessory went away or its session was torn down by a
    /// stream event
    Disconnected {
        /// Accessory that was bound
        accessory: Accessory,
        /// What caused the disconnect
        reason: DisconnectReason,
    },

    /// Inbound bytes were appended to the read buffer
    ///
    /// `data` is a copy of the bytes appended by this readiness event. The read
    /// buffer is not drained; callers still consume it with
    /// [`crate::SessionController::read`], which may already hold more bytes.
    DataReceived {
        /// Accessory the bytes came from
        connection_id: ConnectionId,
        /// Newly appended bytes
        data: Bytes,
    },
}
