//! Session controller for one accessory session.
//!
//! Owns the stream pair of the live session, the read and write buffers, and
//! the session state machine. Stream readiness events are translated into
//! buffer movement and [`Notification`]s.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────┐  bind   ┌───────┐  open   ┌──────┐
//! │ Unbound │────────>│ Bound │────────>│ Open │
//! └─────────┘         └───────┘         └──────┘
//!                         ^                 │
//!                         │ bind / open     │ close / stream error / end
//!                         │                 ↓
//!                         │            ┌────────┐
//!                         └────────────│ Closed │
//!                                      └────────┘
//! ```
//!
//! `unbind` returns any state to `Unbound`, closing an open session first.
//!
//! # Buffering
//!
//! - **Read buffer**: every byte the input stream delivers is appended before
//!   the data-received notification is sent. Callers drain it from the front
//!   with [`SessionController::read`].
//! - **Write buffer**: [`SessionController::write`] appends and flushes as much
//!   as the output stream accepts. The remainder waits for the next
//!   has-space event, in order.
//!
//! Closing a session discards both buffers. Bytes still queued for writing are
//! dropped, not flushed.
//!
//! # Concurrency
//!
//! Every mutation happens under one mutex per controller, so stream events
//! from the transport's context and caller operations from another context
//! are serialized. Notifications are sent after the lock is released.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::{
    accessory::Accessory,
    config::SessionConfig,
    error::{ConfigError, SessionError},
    notification::{DisconnectReason, Notification},
    transport::{
        AccessoryTransport, InputStream, OutputStream, SessionToken, StreamEvent, StreamKind,
    },
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No accessory bound
    Unbound,
    /// Accessory and protocol bound, no session yet
    Bound,
    /// Streams open
    Open,
    /// Session closed; binding retained, can be reopened
    Closed,
}

#[derive(Debug, Clone)]
struct Binding {
    accessory: Accessory,
    protocol: String,
}

struct LiveSession<I, O> {
    token: SessionToken,
    accessory: Accessory,
    protocol: String,
    input: I,
    output: O,
}

struct Inner<I, O> {
    state: SessionState,
    binding: Option<Binding>,
    session: Option<LiveSession<I, O>>,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    next_token: u64,
    /// A stream event tore down the last session and the disconnect was
    /// already notified
    loss_reported: bool,
}

impl<I, O> Inner<I, O> {
    fn new() -> Self {
        Self {
            state: SessionState::Unbound,
            binding: None,
            session: None,
            read_buffer: BytesMut::new(),
            write_buffer: BytesMut::new(),
            next_token: 0,
            loss_reported: false,
        }
    }
}

impl<I: InputStream, O: OutputStream> Inner<I, O> {
    /// Close both streams, drop the session and clear both buffers.
    ///
    /// Returns the accessory whose session was torn down, or `None` if no
    /// session was open.
    fn teardown(&mut self) -> Option<Accessory> {
        let discarded = self.write_buffer.len();
        self.read_buffer.clear();
        self.write_buffer.clear();

        let mut session = self.session.take()?;
        session.input.close();
        session.output.close();

        self.state =
            if self.binding.is_some() { SessionState::Closed } else { SessionState::Unbound };

        debug!(
            connection_id = session.accessory.connection_id,
            token = session.token.0,
            discarded,
            "session closed"
        );
        Some(session.accessory)
    }

    /// Tear down after a stream failure and build the disconnect notification.
    fn disconnect(&mut self, reason: DisconnectReason) -> Option<Notification> {
        let accessory = self.teardown()?;
        self.loss_reported = true;
        warn!(connection_id = accessory.connection_id, ?reason, "session lost");
        Some(Notification::Disconnected { accessory, reason })
    }

    /// Submit the write buffer's prefix while the output stream has space.
    fn flush_writes(&mut self) -> io::Result<usize> {
        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };

        let mut sent = 0;
        while !self.write_buffer.is_empty() && session.output.has_space_available() {
            let accepted = match session.output.write(&self.write_buffer) {
                Ok(n) => n.min(self.write_buffer.len()),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            };
            if accepted == 0 {
                break;
            }
            self.write_buffer.advance(accepted);
            sent += accepted;
        }

        trace!(sent, pending = self.write_buffer.len(), "flushed write buffer");
        Ok(sent)
    }

    /// Append everything the input stream currently offers to the read buffer.
    ///
    /// Returns a copy of the appended bytes and the error that stopped reading,
    /// if any. Bytes read before an error are still appended.
    fn read_inbound(&mut self, chunk_size: usize) -> (Bytes, Option<io::Error>) {
        let start = self.read_buffer.len();
        let mut failure = None;

        if let Some(session) = self.session.as_mut() {
            let mut chunk = vec![0u8; chunk_size];
            while session.input.has_bytes_available() {
                match session.input.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => self.read_buffer.extend_from_slice(&chunk[..n.min(chunk.len())]),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    },
                }
            }
        }

        (Bytes::copy_from_slice(&self.read_buffer[start..]), failure)
    }
}

/// Session controller
///
/// Manages one accessory session's streams and buffers. At most one session
/// exists per controller at a time.
pub struct SessionController<T: AccessoryTransport> {
    transport: Arc<T>,
    config: SessionConfig,
    inner: Mutex<Inner<T::Input, T::Output>>,
    notifications: broadcast::Sender<Notification>,
}

impl<T: AccessoryTransport> SessionController<T> {
    /// Create an unbound controller.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` fails validation.
    pub fn new(transport: Arc<T>, config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        Ok(Self { transport, config, inner: Mutex::new(Inner::new()), notifications })
    }

    /// Subscribe to notifications emitted by this controller.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Sender side of the notification channel, shared with the monitor.
    pub(crate) fn notifier(&self) -> broadcast::Sender<Notification> {
        self.notifications.clone()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Whether a session is open.
    pub fn is_open(&self) -> bool {
        self.lock().session.is_some()
    }

    /// The bound accessory, if any.
    pub fn accessory(&self) -> Option<Accessory> {
        self.lock().binding.as_ref().map(|b| b.accessory.clone())
    }

    /// The bound protocol identifier, if any.
    pub fn protocol(&self) -> Option<String> {
        self.lock().binding.as_ref().map(|b| b.protocol.clone())
    }

    /// Token of the open session, if any.
    pub fn session_token(&self) -> Option<SessionToken> {
        self.lock().session.as_ref().map(|s| s.token)
    }

    /// Bytes queued for writing that the output stream has not yet accepted.
    pub fn pending_write_bytes(&self) -> usize {
        self.lock().write_buffer.len()
    }

    /// Bind an accessory and the protocol to request. No I/O.
    ///
    /// Rebinding the accessory and protocol of the open session is a no-op.
    ///
    /// # Errors
    ///
    /// - `InvalidProtocol` if the accessory does not advertise `protocol`
    /// - `AlreadyOpen` if a session is open for another accessory or protocol
    pub fn bind(&self, accessory: Accessory, protocol: &str) -> Result<(), SessionError> {
        if !accessory.supports(protocol) {
            return Err(SessionError::InvalidProtocol { protocol: protocol.to_owned() });
        }

        let mut inner = self.lock();
        if let Some(session) = &inner.session {
            if session.accessory.connection_id == accessory.connection_id
                && session.protocol == protocol
            {
                return Ok(());
            }
            return Err(SessionError::AlreadyOpen {
                connection_id: session.accessory.connection_id,
            });
        }

        debug!(connection_id = accessory.connection_id, protocol, "accessory bound");
        inner.binding = Some(Binding { accessory, protocol: protocol.to_owned() });
        inner.state = SessionState::Bound;
        inner.loss_reported = false;
        Ok(())
    }

    /// Forget the bound accessory, closing its session first if open.
    ///
    /// Returns `true` if the bound accessory's last session was lost to a
    /// stream event whose disconnect was already notified, with no session
    /// opened since.
    pub fn unbind(&self) -> bool {
        let mut inner = self.lock();
        inner.binding = None;
        inner.teardown();
        inner.state = SessionState::Unbound;
        std::mem::take(&mut inner.loss_reported)
    }

    /// Open a session with the bound accessory.
    ///
    /// Blocks while the transport establishes the session. Opening while a
    /// session for the same accessory is already open is a no-op.
    ///
    /// # Errors
    ///
    /// - `SessionUnavailable` if nothing is bound, the accessory is no longer
    ///   connected, or the transport refuses the session
    /// - `AlreadyOpen` if the open session belongs to another accessory
    pub fn open(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        let Some(binding) = inner.binding.clone() else {
            return Err(SessionError::SessionUnavailable {
                reason: "no accessory bound".to_owned(),
            });
        };

        if let Some(session) = &inner.session {
            if session.accessory.connection_id == binding.accessory.connection_id {
                return Ok(());
            }
            return Err(SessionError::AlreadyOpen {
                connection_id: session.accessory.connection_id,
            });
        }

        let connection_id = binding.accessory.connection_id;
        if !self.transport.connected_accessories().iter().any(|a| a.connection_id == connection_id)
        {
            warn!(connection_id, "bound accessory is not connected");
            return Err(SessionError::SessionUnavailable {
                reason: format!("accessory {connection_id} is not connected"),
            });
        }

        let token = SessionToken(inner.next_token);
        inner.next_token += 1;

        let (input, output) = self
            .transport
            .open_session(&binding.accessory, &binding.protocol, token)
            .map_err(|err| {
                warn!(connection_id, protocol = %binding.protocol, %err, "session refused");
                SessionError::SessionUnavailable { reason: err.to_string() }
            })?;

        inner.read_buffer.clear();
        inner.write_buffer.clear();
        inner.session = Some(LiveSession {
            token,
            accessory: binding.accessory,
            protocol: binding.protocol,
            input,
            output,
        });
        inner.state = SessionState::Open;
        inner.loss_reported = false;

        debug!(connection_id, token = token.0, "session opened");
        Ok(())
    }

    /// Close the session, releasing both streams and clearing both buffers.
    ///
    /// Unflushed writes are discarded. Closing a controller with no open
    /// session does nothing.
    pub fn close(&self) {
        self.lock().teardown();
    }

    /// Queue bytes for the accessory and flush what the output stream accepts.
    ///
    /// Success means the bytes are queued, not that they were transmitted. A
    /// stream failure during the flush closes the session and is reported as
    /// a disconnect notification.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` if no session is open; nothing is buffered.
    pub fn write(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let notification = {
            let mut inner = self.lock();
            if inner.session.is_none() {
                return Err(SessionError::NotOpen);
            }

            inner.write_buffer.extend_from_slice(bytes);
            trace!(queued = bytes.len(), pending = inner.write_buffer.len(), "write queued");

            match inner.flush_writes() {
                Ok(_) => None,
                Err(err) => inner.disconnect(DisconnectReason::StreamError(err.to_string())),
            }
        };

        if let Some(notification) = notification {
            self.notify(notification);
        }
        Ok(())
    }

    /// Number of received bytes not yet consumed.
    pub fn bytes_available(&self) -> usize {
        self.lock().read_buffer.len()
    }

    /// Remove and return up to `max_bytes` from the front of the read buffer.
    ///
    /// Never blocks; returns fewer bytes, possibly none, when fewer are
    /// buffered.
    pub fn read(&self, max_bytes: usize) -> Bytes {
        let mut inner = self.lock();
        let n = max_bytes.min(inner.read_buffer.len());
        inner.read_buffer.split_to(n).freeze()
    }

    /// Handle a readiness event delivered by the transport.
    ///
    /// Events tagged with anything but the open session's token are dropped.
    pub fn handle_stream_event(&self, token: SessionToken, stream: StreamKind, event: StreamEvent) {
        let mut notifications = Vec::new();
        {
            let mut inner = self.lock();
            let connection_id = match inner.session.as_ref() {
                Some(session) if session.token == token => session.accessory.connection_id,
                _ => {
                    trace!(token = token.0, ?stream, ?event, "dropping event for stale session");
                    return;
                },
            };

            match (stream, event) {
                (StreamKind::Input, StreamEvent::HasBytesAvailable) => {
                    let (data, failure) = inner.read_inbound(self.config.read_chunk_size);
                    if !data.is_empty() {
                        trace!(
                            received = data.len(),
                            buffered = inner.read_buffer.len(),
                            "inbound bytes"
                        );
                        notifications.push(Notification::DataReceived { connection_id, data });
                    }
                    if let Some(err) = failure {
                        notifications
                            .extend(inner.disconnect(DisconnectReason::StreamError(err.to_string())));
                    }
                },
                (StreamKind::Output, StreamEvent::HasSpaceAvailable) => {
                    if let Err(err) = inner.flush_writes() {
                        notifications
                            .extend(inner.disconnect(DisconnectReason::StreamError(err.to_string())));
                    }
                },
                (_, StreamEvent::ErrorOccurred(reason)) => {
                    notifications.extend(inner.disconnect(DisconnectReason::StreamError(reason)));
                },
                (_, StreamEvent::EndEncountered) => {
                    notifications.extend(inner.disconnect(DisconnectReason::StreamEnded));
                },
                (stream, event) => trace!(?stream, ?event, "ignoring stream event"),
            }
        }

        for notification in notifications {
            self.notify(notification);
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            trace!("no notification subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T::Input, T::Output>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
