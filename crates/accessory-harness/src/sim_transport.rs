//! Simulated accessory transport.
//!
//! Everything lives behind one shared mutex so that streams handed to a
//! controller and the test driving the simulation see the same state. Nothing
//! here ever calls back into the controller: events are queued and delivered
//! when the test pumps them, which keeps delivery order deterministic.
//!
//! # Defaults
//!
//! - Output streams accept unlimited bytes (`usize::MAX` capacity)
//! - Reads and writes transfer as much as possible in one call
//! - Sessions are accepted for any attached accessory advertising the protocol

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use accessory_core::{
    Accessory, AccessoryMonitor, AccessoryTransport, ConnectionId, InputStream, OutputStream,
    SessionController, SessionToken, StreamEvent, StreamKind, TransportEvent,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// The simulated device side of one opened session.
struct SimLink {
    token: SessionToken,
    connection_id: ConnectionId,
    inbound: VecDeque<u8>,
    capacity: usize,
    input_open: bool,
    output_open: bool,
}

impl SimLink {
    fn is_live(&self) -> bool {
        self.input_open || self.output_open
    }
}

struct SimState {
    accessories: Vec<Accessory>,
    events: VecDeque<TransportEvent>,
    link: Option<SimLink>,
    refusal: Option<String>,
    write_failure: Option<String>,
    initial_capacity: usize,
    max_read: Option<usize>,
    max_write: Option<usize>,
    rng: ChaCha8Rng,
    transmitted: Vec<u8>,
    stream_closes: usize,
    sessions_opened: usize,
    next_connection_id: ConnectionId,
}

impl SimState {
    fn push_stream_event(&mut self, stream: StreamKind, event: StreamEvent) -> bool {
        let Some(link) = self.link.as_ref().filter(|l| l.is_live()) else {
            return false;
        };
        self.events.push_back(TransportEvent::Stream { token: link.token, stream, event });
        true
    }

    /// Pick how many of `available` bytes one call transfers.
    fn fragment(rng: &mut ChaCha8Rng, available: usize, max: Option<usize>) -> usize {
        match max {
            Some(max) if available > 0 => available.min(rng.gen_range(1..=max.max(1))),
            _ => available,
        }
    }
}

/// In-memory accessory transport.
///
/// Cloning yields another handle to the same simulation.
#[derive(Clone)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// Create an empty simulation with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create an empty simulation whose fragmentation is driven by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState {
            accessories: Vec::new(),
            events: VecDeque::new(),
            link: None,
            refusal: None,
            write_failure: None,
            initial_capacity: usize::MAX,
            max_read: None,
            max_write: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            transmitted: Vec::new(),
            stream_closes: 0,
            sessions_opened: 0,
            next_connection_id: 1,
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Output capacity each new session starts with.
    #[must_use]
    pub fn with_write_capacity(self, capacity: usize) -> Self {
        self.lock().initial_capacity = capacity;
        self
    }

    /// Return at most a random `1..=max` bytes per input read.
    #[must_use]
    pub fn with_read_fragments(self, max: usize) -> Self {
        self.lock().max_read = Some(max);
        self
    }

    /// Accept at most a random `1..=max` bytes per output write.
    #[must_use]
    pub fn with_write_fragments(self, max: usize) -> Self {
        self.lock().max_write = Some(max);
        self
    }

    /// Attach an accessory and queue its connect event.
    pub fn attach(&self, accessory: Accessory) {
        let mut state = self.lock();
        state.next_connection_id = state.next_connection_id.max(accessory.connection_id + 1);
        trace!(connection_id = accessory.connection_id, "sim attach");
        state.events.push_back(TransportEvent::AccessoryConnected(accessory.clone()));
        state.accessories.push(accessory);
    }

    /// Attach a new accessory with a fresh connection ID.
    pub fn attach_new(&self, name: &str, protocols: &[&str]) -> Accessory {
        let connection_id = self.lock().next_connection_id;
        let accessory = protocols
            .iter()
            .fold(Accessory::new(connection_id, name), |acc, p| acc.with_protocol(*p));
        self.attach(accessory.clone());
        accessory
    }

    /// Detach an accessory.
    ///
    /// Queues the disconnect event, then end-of-stream for its session if one
    /// is live.
    pub fn detach(&self, connection_id: ConnectionId) -> Option<Accessory> {
        let mut state = self.lock();
        let index = state.accessories.iter().position(|a| a.connection_id == connection_id)?;
        let accessory = state.accessories.remove(index);
        trace!(connection_id, "sim detach");
        state.events.push_back(TransportEvent::AccessoryDisconnected(accessory.clone()));

        if state.link.as_ref().is_some_and(|l| l.connection_id == connection_id) {
            state.push_stream_event(StreamKind::Input, StreamEvent::EndEncountered);
            state.link = None;
        }
        Some(accessory)
    }

    /// Refuse every session request with `reason` until
    /// [`accept_sessions`](Self::accept_sessions).
    pub fn refuse_sessions(&self, reason: impl Into<String>) {
        self.lock().refusal = Some(reason.into());
    }

    /// Accept session requests again.
    pub fn accept_sessions(&self) {
        self.lock().refusal = None;
    }

    /// Fail every output write with `reason`.
    pub fn fail_writes(&self, reason: impl Into<String>) {
        self.lock().write_failure = Some(reason.into());
    }

    /// Device sends `bytes` to the host.
    ///
    /// Returns `false` if no session is live.
    pub fn deliver(&self, bytes: &[u8]) -> bool {
        let mut state = self.lock();
        let Some(link) = state.link.as_mut().filter(|l| l.input_open) else {
            return false;
        };
        link.inbound.extend(bytes);
        state.push_stream_event(StreamKind::Input, StreamEvent::HasBytesAvailable)
    }

    /// Device makes room for `bytes` more output bytes.
    ///
    /// Returns `false` if no session is live.
    pub fn grant_capacity(&self, bytes: usize) -> bool {
        let mut state = self.lock();
        let Some(link) = state.link.as_mut().filter(|l| l.output_open) else {
            return false;
        };
        link.capacity = link.capacity.saturating_add(bytes);
        state.push_stream_event(StreamKind::Output, StreamEvent::HasSpaceAvailable)
    }

    /// Queue an error event on one stream of the live session.
    pub fn fail_stream(&self, stream: StreamKind, reason: impl Into<String>) -> bool {
        self.lock().push_stream_event(stream, StreamEvent::ErrorOccurred(reason.into()))
    }

    /// Queue end-of-stream on the live session's input.
    pub fn end_stream(&self) -> bool {
        self.lock().push_stream_event(StreamKind::Input, StreamEvent::EndEncountered)
    }

    /// Every byte the device has accepted, across all sessions.
    pub fn transmitted(&self) -> Vec<u8> {
        self.lock().transmitted.clone()
    }

    /// Number of `close` calls made on streams.
    pub fn stream_closes(&self) -> usize {
        self.lock().stream_closes
    }

    /// Number of sessions successfully opened.
    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    /// Whether a session has at least one open stream.
    pub fn has_live_session(&self) -> bool {
        self.lock().link.as_ref().is_some_and(SimLink::is_live)
    }

    /// Events queued but not yet taken.
    pub fn pending_events(&self) -> usize {
        self.lock().events.len()
    }

    /// Take all queued events.
    pub fn take_events(&self) -> Vec<TransportEvent> {
        self.lock().events.drain(..).collect()
    }

    /// Deliver queued events to `monitor` until none remain.
    ///
    /// Returns the number delivered.
    pub fn pump(&self, monitor: &AccessoryMonitor<Self>) -> usize {
        let mut delivered = 0;
        loop {
            let events = self.take_events();
            if events.is_empty() {
                return delivered;
            }
            delivered += events.len();
            for event in events {
                monitor.process_event(event);
            }
        }
    }

    /// Deliver queued stream events to `controller`, discarding device events.
    ///
    /// Returns the number of stream events delivered.
    pub fn pump_controller(&self, controller: &SessionController<Self>) -> usize {
        let mut delivered = 0;
        loop {
            let events = self.take_events();
            if events.is_empty() {
                return delivered;
            }
            for event in events {
                if let TransportEvent::Stream { token, stream, event } = event {
                    controller.handle_stream_event(token, stream, event);
                    delivered += 1;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        lock_state(&self.state)
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_state(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stream_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream closed")
}

impl AccessoryTransport for SimTransport {
    type Input = SimInputStream;
    type Output = SimOutputStream;

    fn connected_accessories(&self) -> Vec<Accessory> {
        self.lock().accessories.clone()
    }

    fn open_session(
        &self,
        accessory: &Accessory,
        protocol: &str,
        token: SessionToken,
    ) -> io::Result<(SimInputStream, SimOutputStream)> {
        let mut state = self.lock();

        if let Some(reason) = &state.refusal {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, reason.clone()));
        }
        let Some(attached) =
            state.accessories.iter().find(|a| a.connection_id == accessory.connection_id)
        else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "accessory not attached"));
        };
        if !attached.supports(protocol) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "protocol not supported"));
        }
        if state.link.as_ref().is_some_and(SimLink::is_live) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "accessory already in session"));
        }

        let capacity = state.initial_capacity;
        state.link = Some(SimLink {
            token,
            connection_id: accessory.connection_id,
            inbound: VecDeque::new(),
            capacity,
            input_open: true,
            output_open: true,
        });
        state.sessions_opened += 1;

        state.push_stream_event(StreamKind::Input, StreamEvent::OpenCompleted);
        state.push_stream_event(StreamKind::Output, StreamEvent::OpenCompleted);
        if capacity > 0 {
            state.push_stream_event(StreamKind::Output, StreamEvent::HasSpaceAvailable);
        }

        trace!(connection_id = accessory.connection_id, token = token.0, "sim session opened");
        Ok((
            SimInputStream { state: self.state.clone(), token },
            SimOutputStream { state: self.state.clone(), token },
        ))
    }
}

/// Input half of a simulated session.
pub struct SimInputStream {
    state: Arc<Mutex<SimState>>,
    token: SessionToken,
}

impl InputStream for SimInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = lock_state(&self.state);
        let SimState { link, rng, max_read, .. } = &mut *guard;
        let Some(link) = link.as_mut().filter(|l| l.token == self.token && l.input_open) else {
            return Err(stream_closed());
        };

        let n = SimState::fragment(rng, buf.len().min(link.inbound.len()), *max_read);
        for (slot, byte) in buf.iter_mut().zip(link.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn has_bytes_available(&self) -> bool {
        lock_state(&self.state)
            .link
            .as_ref()
            .is_some_and(|l| l.token == self.token && l.input_open && !l.inbound.is_empty())
    }

    fn close(&mut self) {
        let mut state = lock_state(&self.state);
        state.stream_closes += 1;
        if let Some(link) = state.link.as_mut().filter(|l| l.token == self.token) {
            link.input_open = false;
        }
    }
}

/// Output half of a simulated session.
pub struct SimOutputStream {
    state: Arc<Mutex<SimState>>,
    token: SessionToken,
}

impl OutputStream for SimOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = lock_state(&self.state);
        let SimState { link, rng, max_write, write_failure, transmitted, .. } = &mut *guard;
        if let Some(reason) = write_failure {
            return Err(io::Error::other(reason.clone()));
        }
        let Some(link) = link.as_mut().filter(|l| l.token == self.token && l.output_open) else {
            return Err(stream_closed());
        };

        let n = SimState::fragment(rng, buf.len().min(link.capacity), *max_write);
        transmitted.extend_from_slice(&buf[..n]);
        link.capacity -= n;
        Ok(n)
    }

    fn has_space_available(&self) -> bool {
        lock_state(&self.state)
            .link
            .as_ref()
            .is_some_and(|l| l.token == self.token && l.output_open && l.capacity > 0)
    }

    fn close(&mut self) {
        let mut state = lock_state(&self.state);
        state.stream_closes += 1;
        if let Some(link) = state.link.as_mut().filter(|l| l.token == self.token) {
            link.output_open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTO: &str = "com.example.proto";

    #[test]
    fn attach_assigns_fresh_ids() {
        let sim = SimTransport::new();
        let a = sim.attach_new("a", &[PROTO]);
        let b = sim.attach_new("b", &[PROTO]);
        assert_ne!(a.connection_id, b.connection_id);
        assert_eq!(sim.connected_accessories().len(), 2);
        assert_eq!(sim.pending_events(), 2);
    }

    #[test]
    fn open_session_requires_attached_accessory() {
        let sim = SimTransport::new();
        let ghost = Accessory::new(9, "ghost").with_protocol(PROTO);
        let err = sim.open_session(&ghost, PROTO, SessionToken(0)).err();
        assert_eq!(err.map(|e| e.kind()), Some(io::ErrorKind::NotConnected));
    }

    #[test]
    fn second_session_is_refused_while_live() {
        let sim = SimTransport::new();
        let accessory = sim.attach_new("a", &[PROTO]);
        let _streams = sim.open_session(&accessory, PROTO, SessionToken(0)).unwrap();
        let err = sim.open_session(&accessory, PROTO, SessionToken(1)).err();
        assert_eq!(err.map(|e| e.kind()), Some(io::ErrorKind::AddrInUse));
    }

    #[test]
    fn fragmented_reads_are_bounded() {
        let sim = SimTransport::with_seed(7).with_read_fragments(3);
        let accessory = sim.attach_new("a", &[PROTO]);
        let (mut input, _output) = sim.open_session(&accessory, PROTO, SessionToken(0)).unwrap();
        assert!(sim.deliver(&[1, 2, 3, 4, 5, 6, 7, 8]));

        let mut received = Vec::new();
        let mut buf = [0u8; 16];
        while input.has_bytes_available() {
            let n = input.read(&mut buf).unwrap();
            assert!((1..=3).contains(&n));
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn capacity_limits_writes() {
        let sim = SimTransport::new().with_write_capacity(2);
        let accessory = sim.attach_new("a", &[PROTO]);
        let (_input, mut output) = sim.open_session(&accessory, PROTO, SessionToken(0)).unwrap();

        assert_eq!(output.write(b"abc").unwrap(), 2);
        assert!(!output.has_space_available());
        assert!(sim.grant_capacity(5));
        assert_eq!(output.write(b"c").unwrap(), 1);
        assert_eq!(sim.transmitted(), b"abc");
    }

    #[test]
    fn closed_streams_stop_events() {
        let sim = SimTransport::new();
        let accessory = sim.attach_new("a", &[PROTO]);
        let (mut input, mut output) =
            sim.open_session(&accessory, PROTO, SessionToken(0)).unwrap();
        sim.take_events();

        input.close();
        output.close();
        assert_eq!(sim.stream_closes(), 2);
        assert!(!sim.deliver(&[1]));
        assert!(!sim.end_stream());
        assert_eq!(sim.pending_events(), 0);
    }
}
