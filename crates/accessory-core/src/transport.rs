//! Transport abstraction for accessory sessions.
//!
//! Abstracts over platform accessory frameworks that expose a connected
//! device as a pair of non-blocking byte streams. Production binds a platform
//! framework, tests use the in-memory simulation from `accessory-harness`.
//!
//! The transport delivers everything asynchronous (device presence, stream
//! readiness) as [`TransportEvent`] values. Stream events carry the
//! [`SessionToken`] the streams were opened with, which is how the controller
//! subscribes to exactly the streams it currently owns: anything tagged with
//! an older token belongs to a torn-down session and is dropped.

use std::io;

use crate::accessory::Accessory;

/// Identifies one opened stream pair.
///
/// Minted by the controller on every open attempt and never reused by the
/// same controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

/// Which half of a session a stream event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Device to host
    Input,
    /// Host to device
    Output,
}

/// Stream readiness events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Stream finished opening
    OpenCompleted,
    /// Input stream has bytes to read
    HasBytesAvailable,
    /// Output stream can accept a write
    HasSpaceAvailable,
    /// Stream failed
    ErrorOccurred(String),
    /// Stream reached its end
    EndEncountered,
}

/// Events pushed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An accessory attached
    AccessoryConnected(Accessory),
    /// An accessory detached
    AccessoryDisconnected(Accessory),
    /// Readiness change on one stream of an opened session
    Stream {
        /// Token the session was opened with
        token: SessionToken,
        /// Stream the event refers to
        stream: StreamKind,
        /// What happened
        event: StreamEvent,
    },
}

/// Device-to-host byte stream.
pub trait InputStream: Send + 'static {
    /// Read up to `buf.len()` bytes without blocking.
    ///
    /// Returns `Ok(0)` when nothing is currently available.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether a read would currently return bytes.
    fn has_bytes_available(&self) -> bool;

    /// Close the stream. After this the transport emits no further events for
    /// it.
    fn close(&mut self);
}

/// Host-to-device byte stream.
pub trait OutputStream: Send + 'static {
    /// Write a prefix of `buf` without blocking, returning how many bytes the
    /// stream accepted. May accept fewer than offered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Whether a write would currently accept bytes.
    fn has_space_available(&self) -> bool;

    /// Close the stream. After this the transport emits no further events for
    /// it.
    fn close(&mut self);
}

/// Device discovery and session establishment.
pub trait AccessoryTransport: Send + Sync + 'static {
    /// Stream type for device-to-host bytes.
    type Input: InputStream;

    /// Stream type for host-to-device bytes.
    type Output: OutputStream;

    /// Accessories currently attached.
    fn connected_accessories(&self) -> Vec<Accessory>;

    /// Establish a session speaking `protocol` with `accessory`.
    ///
    /// On success both streams are open and the transport starts emitting
    /// [`TransportEvent::Stream`] events tagged with `token`. May block briefly
    /// while the platform negotiates the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is gone, already has a session elsewhere,
    /// or protocol negotiation fails.
    fn open_session(
        &self,
        accessory: &Accessory,
        protocol: &str,
        token: SessionToken,
    ) -> io::Result<(Self::Input, Self::Output)>;
}
