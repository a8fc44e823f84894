//! Accessory monitor
//!
//! Bridges device presence events to the [`SessionController`] and presents a
//! simplified facade over it. One protocol identifier is watched at a time;
//! the first attached accessory advertising it is bound and stays bound until
//! it detaches, or until monitoring restarts for an identifier it does not
//! advertise.
//!
//! Each loss is notified once. If a stream event already closed the session
//! and reported the disconnect, the later removal of the accessory is silent.
//!
//! The monitor never retries. A failed open or a lost stream surfaces once;
//! callers decide whether to reopen when they next see a connect notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::{
    accessory::Accessory,
    config::SessionConfig,
    error::{ConfigError, SessionError},
    notification::{DisconnectReason, Notification},
    session::SessionController,
    transport::{AccessoryTransport, TransportEvent},
};

#[derive(Debug, Default)]
struct MonitorState {
    /// Watched protocol; `None` when not monitoring
    protocol: Option<String>,
    /// Accessory currently bound to the controller
    bound: Option<Accessory>,
}

/// Accessory monitor
///
/// Owns the session controller for the watched protocol. Create one per
/// logical device watch and pass it by reference.
pub struct AccessoryMonitor<T: AccessoryTransport> {
    transport: Arc<T>,
    controller: SessionController<T>,
    state: Mutex<MonitorState>,
    notifications: broadcast::Sender<Notification>,
}

impl<T: AccessoryTransport> AccessoryMonitor<T> {
    /// Create an idle monitor and its controller.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` fails validation.
    pub fn new(transport: Arc<T>, config: SessionConfig) -> Result<Self, ConfigError> {
        let controller = SessionController::new(transport.clone(), config)?;
        let notifications = controller.notifier();
        Ok(Self { transport, controller, state: Mutex::new(MonitorState::default()), notifications })
    }

    /// The underlying session controller.
    pub fn controller(&self) -> &SessionController<T> {
        &self.controller
    }

    /// Subscribe to connect, disconnect and data-received notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Whether device events are being observed.
    pub fn is_monitoring(&self) -> bool {
        self.lock().protocol.is_some()
    }

    /// The watched protocol identifier.
    pub fn protocol(&self) -> Option<String> {
        self.lock().protocol.clone()
    }

    /// The accessory bound to the controller.
    pub fn bound_accessory(&self) -> Option<Accessory> {
        self.lock().bound.clone()
    }

    /// Start observing devices that advertise `protocol`.
    ///
    /// If a matching accessory is already attached it is bound immediately and
    /// a connect notification is sent. Starting again with the same identifier
    /// is a no-op.
    ///
    /// An accessory still bound from an earlier watch is kept only if it is
    /// attached and advertises `protocol`. Otherwise it is unbound with a
    /// disconnect notification before attached accessories are scanned.
    ///
    /// Returns `false` if already monitoring a different identifier.
    pub fn start_monitoring(&self, protocol: &str) -> bool {
        let mut notifications = Vec::new();
        {
            let mut state = self.lock();
            match state.protocol.as_deref() {
                Some(watched) if watched == protocol => return true,
                Some(watched) => {
                    debug!(watched, requested = protocol, "already monitoring another protocol");
                    return false;
                },
                None => {},
            }

            state.protocol = Some(protocol.to_owned());
            info!(protocol, "monitoring started");

            let attached = self.transport.connected_accessories();
            if let Some(bound) = state.bound.take() {
                let present = attached.iter().any(|a| a.connection_id == bound.connection_id);
                if present && bound.supports(protocol) {
                    state.bound = Some(bound);
                } else {
                    info!(connection_id = bound.connection_id, present, "dropping stale binding");
                    notifications.extend(self.release(bound));
                }
            }

            if state.bound.is_none() {
                notifications.extend(
                    attached
                        .into_iter()
                        .find(|a| a.supports(protocol))
                        .and_then(|accessory| self.attach(&mut state, accessory, protocol)),
                );
            }
        }

        for notification in notifications {
            self.notify(notification);
        }
        true
    }

    /// Stop observing device events. An open session stays open.
    ///
    /// Returns `false` if not monitoring.
    pub fn stop_monitoring(&self) -> bool {
        let stopped = self.lock().protocol.take();
        if let Some(protocol) = &stopped {
            info!(protocol, "monitoring stopped");
        }
        stopped.is_some()
    }

    /// Open a session with the bound accessory.
    ///
    /// # Errors
    ///
    /// `NoDeviceBound` if no matching accessory is present, otherwise any
    /// error from [`SessionController::open`].
    pub fn open_session(&self) -> Result<(), SessionError> {
        self.require_bound()?;
        self.controller.open()
    }

    /// Close the session with the bound accessory.
    ///
    /// # Errors
    ///
    /// `NoDeviceBound` if no matching accessory is present.
    pub fn close_session(&self) -> Result<(), SessionError> {
        self.require_bound()?;
        self.controller.close();
        Ok(())
    }

    /// Queue bytes for the bound accessory.
    ///
    /// # Errors
    ///
    /// `NoDeviceBound` if no matching accessory is present, `NotOpen` if no
    /// session is open.
    pub fn write_data(&self, bytes: &[u8]) -> Result<(), SessionError> {
        self.require_bound()?;
        self.controller.write(bytes)
    }

    /// Remove up to `max_bytes` received bytes. See
    /// [`SessionController::read`].
    pub fn read_data(&self, max_bytes: usize) -> Bytes {
        self.controller.read(max_bytes)
    }

    /// Received bytes not yet consumed.
    pub fn bytes_available(&self) -> usize {
        self.controller.bytes_available()
    }

    /// Route one transport event.
    ///
    /// Device events are ignored while not monitoring. Stream events always go
    /// to the controller, which drops those for stale sessions.
    pub fn process_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::AccessoryConnected(accessory) => self.handle_connected(accessory),
            TransportEvent::AccessoryDisconnected(accessory) => {
                self.handle_disconnected(&accessory);
            },
            TransportEvent::Stream { token, stream, event } => {
                self.controller.handle_stream_event(token, stream, event);
            },
        }
    }

    /// Drain `events` until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.process_event(event);
        }
        debug!("transport event channel closed");
    }

    fn handle_connected(&self, accessory: Accessory) {
        let notification = {
            let mut state = self.lock();
            let Some(protocol) = state.protocol.clone() else {
                trace!(connection_id = accessory.connection_id, "not monitoring, ignoring connect");
                return;
            };
            if !accessory.supports(&protocol) {
                trace!(connection_id = accessory.connection_id, "accessory lacks protocol");
                return;
            }
            if let Some(bound) = &state.bound {
                if bound.connection_id == accessory.connection_id {
                    trace!(connection_id = bound.connection_id, "accessory already bound");
                } else {
                    debug!(
                        bound = bound.connection_id,
                        ignored = accessory.connection_id,
                        "another accessory already bound"
                    );
                }
                return;
            }
            self.attach(&mut state, accessory, &protocol)
        };

        if let Some(notification) = notification {
            self.notify(notification);
        }
    }

    fn handle_disconnected(&self, accessory: &Accessory) {
        let notification = {
            let mut state = self.lock();
            if state.protocol.is_none() {
                trace!(connection_id = accessory.connection_id, "not monitoring, ignoring disconnect");
                return;
            }
            match state.bound.take() {
                Some(bound) if bound.connection_id == accessory.connection_id => {
                    info!(connection_id = bound.connection_id, "bound accessory removed");
                    self.release(bound)
                },
                other => {
                    state.bound = other;
                    return;
                },
            }
        };

        if let Some(notification) = notification {
            self.notify(notification);
        }
    }

    /// Unbind `accessory` from the controller.
    ///
    /// Returns the removal notification, or `None` when its session was
    /// already lost to a stream event and that disconnect was notified.
    fn release(&self, accessory: Accessory) -> Option<Notification> {
        if self.controller.unbind() {
            debug!(connection_id = accessory.connection_id, "loss already notified");
            return None;
        }
        Some(Notification::Disconnected { accessory, reason: DisconnectReason::AccessoryRemoved })
    }

    /// Bind `accessory` and record it, returning the connect notification.
    fn attach(
        &self,
        state: &mut MonitorState,
        accessory: Accessory,
        protocol: &str,
    ) -> Option<Notification> {
        match self.controller.bind(accessory.clone(), protocol) {
            Ok(()) => {
                info!(
                    connection_id = accessory.connection_id,
                    name = %accessory.name,
                    "accessory connected"
                );
                state.bound = Some(accessory.clone());
                Some(Notification::Connected(accessory))
            },
            Err(err) => {
                warn!(connection_id = accessory.connection_id, %err, "could not bind accessory");
                None
            },
        }
    }

    fn require_bound(&self) -> Result<(), SessionError> {
        if self.lock().bound.is_some() { Ok(()) } else { Err(SessionError::NoDeviceBound) }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            trace!("no notification subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
