//! Error types for accessory sessions.

use thiserror::Error;

use crate::accessory::ConnectionId;

/// Errors returned synchronously by controller and monitor operations.
///
/// Failures that originate from stream events never surface here; they close
/// the session and are reported as a disconnect notification instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Accessory does not advertise the requested protocol identifier
    #[error("accessory does not support protocol {protocol:?}")]
    InvalidProtocol {
        /// The rejected identifier
        protocol: String,
    },

    /// Transport refused or could not establish the session
    #[error("session unavailable: {reason}")]
    SessionUnavailable {
        /// Why the session could not be opened
        reason: String,
    },

    /// A session is already open for a different accessory or protocol
    #[error("session already open for accessory {connection_id}")]
    AlreadyOpen {
        /// Accessory owning the open session
        connection_id: ConnectionId,
    },

    /// I/O attempted without an open session
    #[error("no session is open")]
    NotOpen,

    /// Facade call made while no matching accessory is present
    #[error("no accessory bound")]
    NoDeviceBound,
}

/// Invalid [`crate::SessionConfig`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Inbound reads need a buffer of at least one byte
    #[error("read chunk size must be non-zero")]
    ZeroReadChunk,

    /// The notification channel needs room for at least one message
    #[error("notification capacity must be non-zero")]
    ZeroNotificationCapacity,
}
