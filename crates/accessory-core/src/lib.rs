//! Accessory session core
//!
//! Manages one communication session with a locally attached peripheral over
//! a negotiated application-layer protocol, using a pair of byte streams as
//! the transport.
//!
//! # Architecture
//!
//! The transport (device discovery, session establishment, stream readiness)
//! is an external collaborator reached through the traits in [`transport`].
//! It pushes [`TransportEvent`]s which a runtime feeds into
//! [`AccessoryMonitor::process_event`]. The monitor tracks device presence and
//! binds the single [`SessionController`], which owns the streams, buffers all
//! partially read and written data, and translates stream readiness into
//! [`Notification`]s.
//!
//! All buffer and state mutations for a controller happen inside one critical
//! section, so stream events and caller operations may arrive from different
//! threads without breaking FIFO ordering.
//!
//! # Components
//!
//! - [`accessory`]: Device handle
//! - [`transport`]: Transport abstraction (discovery, sessions, streams)
//! - [`session`]: Session controller state machine and buffers
//! - [`monitor`]: Device presence tracking and simplified facade
//! - [`notification`]: Connect, disconnect and data-received notifications
//! - [`config`]: Controller configuration
//! - [`error`]: Session and configuration error types

pub mod accessory;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notification;
pub mod session;
pub mod transport;

pub use accessory::{Accessory, ConnectionId};
pub use config::SessionConfig;
pub use error::{ConfigError, SessionError};
pub use monitor::AccessoryMonitor;
pub use notification::{DisconnectReason, Notification};
pub use session::{SessionController, SessionState};
pub use transport::{
    AccessoryTransport, InputStream, OutputStream, SessionToken, StreamEvent, StreamKind,
    TransportEvent,
};
