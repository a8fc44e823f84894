//! Fault injection tests.
//!
//! Stream-level failures must never surface as errors from caller operations.
//! They close the session, clear its buffers, and are reported once as a
//! disconnect notification. The binding survives so the caller can reopen.

use std::sync::Arc;

use accessory_core::{
    AccessoryMonitor, DisconnectReason, Notification, SessionConfig, SessionError, SessionState,
    StreamKind,
};
use accessory_harness::{SimTransport, drain_notifications};

const PROTO: &str = "com.example.proto";

/// Monitor bound to one attached accessory with an open session and no
/// queued notifications.
fn open_session(sim: &SimTransport) -> AccessoryMonitor<SimTransport> {
    sim.attach_new("Reader", &[PROTO]);
    let monitor = AccessoryMonitor::new(Arc::new(sim.clone()), SessionConfig::default()).unwrap();
    assert!(monitor.start_monitoring(PROTO));
    monitor.open_session().unwrap();
    sim.pump(&monitor);
    monitor
}

#[test]
fn refused_session_surfaces_once() {
    let sim = SimTransport::new();
    sim.attach_new("Reader", &[PROTO]);
    let monitor = AccessoryMonitor::new(Arc::new(sim.clone()), SessionConfig::default()).unwrap();
    assert!(monitor.start_monitoring(PROTO));

    sim.refuse_sessions("accessory in use by another app");
    let result = monitor.open_session();
    assert!(matches!(
        result,
        Err(SessionError::SessionUnavailable { ref reason }) if reason.contains("another app")
    ));
    assert_eq!(monitor.controller().state(), SessionState::Bound);
    assert_eq!(sim.sessions_opened(), 0);

    // No retry happened behind our back; the caller retries explicitly
    sim.accept_sessions();
    assert!(monitor.open_session().is_ok());
    assert_eq!(sim.sessions_opened(), 1);
}

#[test]
fn input_error_disconnects() {
    let sim = SimTransport::new();
    let monitor = open_session(&sim);
    let mut rx = monitor.subscribe();

    assert!(sim.deliver(b"partial"));
    assert!(sim.fail_stream(StreamKind::Input, "framing error"));
    sim.pump(&monitor);

    let notifications = drain_notifications(&mut rx);
    assert_eq!(notifications.len(), 2);
    assert!(matches!(notifications[0], Notification::DataReceived { .. }));
    assert!(matches!(
        &notifications[1],
        Notification::Disconnected { reason: DisconnectReason::StreamError(r), .. }
            if r == "framing error"
    ));

    assert_eq!(monitor.controller().state(), SessionState::Closed);
    assert_eq!(monitor.bytes_available(), 0);
    assert!(!sim.has_live_session());
    assert_eq!(monitor.write_data(b"x"), Err(SessionError::NotOpen));
}

#[test]
fn end_of_stream_disconnects_and_allows_reopen() {
    let sim = SimTransport::new();
    let monitor = open_session(&sim);
    let mut rx = monitor.subscribe();

    assert!(sim.end_stream());
    sim.pump(&monitor);
    assert!(matches!(
        drain_notifications(&mut rx).as_slice(),
        [Notification::Disconnected { reason: DisconnectReason::StreamEnded, .. }]
    ));
    assert!(monitor.bound_accessory().is_some());

    monitor.open_session().unwrap();
    monitor.write_data(b"again").unwrap();
    assert_eq!(sim.transmitted(), b"again");
}

#[test]
fn write_failure_disconnects_without_error() {
    let sim = SimTransport::new();
    let monitor = open_session(&sim);
    let mut rx = monitor.subscribe();

    sim.fail_writes("device stalled");
    assert!(monitor.write_data(b"lost").is_ok());

    assert!(matches!(
        drain_notifications(&mut rx).as_slice(),
        [Notification::Disconnected { reason: DisconnectReason::StreamError(_), .. }]
    ));
    assert!(!monitor.controller().is_open());
    assert!(sim.transmitted().is_empty());
}

#[test]
fn stale_events_after_close_are_dropped() {
    let sim = SimTransport::new().with_write_capacity(0);
    let monitor = open_session(&sim);
    let mut rx = monitor.subscribe();

    monitor.write_data(b"queued").unwrap();
    assert!(sim.deliver(b"late"));
    assert!(sim.grant_capacity(100));
    let stale = sim.take_events();
    assert_eq!(stale.len(), 2);

    monitor.close_session().unwrap();
    for event in stale {
        monitor.process_event(event);
    }

    assert!(drain_notifications(&mut rx).is_empty());
    assert_eq!(monitor.bytes_available(), 0);
    assert!(sim.transmitted().is_empty());
}

#[test]
fn detach_during_backpressure_discards_queue() {
    let sim = SimTransport::new().with_write_capacity(4);
    let monitor = open_session(&sim);
    let device = monitor.bound_accessory().unwrap();

    monitor.write_data(b"0123456789").unwrap();
    assert_eq!(sim.transmitted(), b"0123");
    assert_eq!(monitor.controller().pending_write_bytes(), 6);

    sim.detach(device.connection_id);
    sim.pump(&monitor);
    assert_eq!(monitor.controller().pending_write_bytes(), 0);
    assert_eq!(sim.transmitted(), b"0123");
    assert_eq!(sim.stream_closes(), 2);
}

#[test]
fn fragmented_streams_preserve_order() {
    let sim = SimTransport::with_seed(99).with_read_fragments(2).with_write_fragments(1);
    let monitor = open_session(&sim);

    let outbound: Vec<u8> = (0..200u8).collect();
    for chunk in outbound.chunks(17) {
        monitor.write_data(chunk).unwrap();
    }
    assert_eq!(sim.transmitted(), outbound);

    let inbound: Vec<u8> = (0..=255u8).rev().collect();
    for chunk in inbound.chunks(31) {
        assert!(sim.deliver(chunk));
    }
    sim.pump(&monitor);

    let mut received = Vec::new();
    while monitor.bytes_available() > 0 {
        received.extend_from_slice(&monitor.read_data(7));
    }
    assert_eq!(received, inbound);
}
