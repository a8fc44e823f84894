//! End-to-end console sessions.

use accessory_cli::{Console, Reply};
use accessory_core::{SessionConfig, SessionState};

fn lines(console: &mut Console, input: &str) -> Vec<String> {
    match console.run_line(input) {
        Reply::Lines(lines) => lines,
        Reply::Quit => panic!("unexpected quit on {input:?}"),
    }
}

fn console() -> Console {
    Console::new(SessionConfig::default(), 0).unwrap()
}

#[test]
fn scripted_session() {
    let mut console = console();

    assert_eq!(lines(&mut console, "/start com.example.proto"), ["monitoring com.example.proto"]);
    assert_eq!(
        lines(&mut console, "/attach Reader com.example.proto"),
        ["attached Reader (id 1)", "* connected: Reader (id 1)"]
    );
    assert_eq!(lines(&mut console, "/open"), ["session open"]);
    assert_eq!(lines(&mut console, "/write 0102"), ["queued 2 bytes (0 pending)"]);
    assert_eq!(console.transport().transmitted(), vec![0x01, 0x02]);

    assert_eq!(
        lines(&mut console, "/deliver aabbcc"),
        ["delivered 3 bytes", "* received 3 bytes from 1: aabbcc"]
    );
    assert_eq!(lines(&mut console, "/read 2"), ["read 2 bytes: aabb (1 remaining)"]);

    assert_eq!(
        lines(&mut console, "/detach"),
        ["detached Reader", "* disconnected: Reader (accessory removed)"]
    );
    assert_eq!(console.monitor().controller().state(), SessionState::Unbound);
    assert_eq!(lines(&mut console, "/open"), ["error: no accessory bound"]);
}

#[test]
fn text_is_sent_as_utf8() {
    let mut console = console();
    lines(&mut console, "/start p");
    lines(&mut console, "/attach A p");
    lines(&mut console, "/open");

    assert_eq!(lines(&mut console, "hi"), ["queued 2 bytes (0 pending)"]);
    assert_eq!(console.transport().transmitted(), b"hi");
}

#[test]
fn second_protocol_is_refused() {
    let mut console = console();
    lines(&mut console, "/start a");
    assert_eq!(lines(&mut console, "/start b"), ["already monitoring a; /stop first"]);
    assert_eq!(lines(&mut console, "/stop"), ["monitoring stopped"]);
    assert_eq!(lines(&mut console, "/stop"), ["not monitoring"]);
}

#[test]
fn commands_without_device_report_errors() {
    let mut console = console();
    assert_eq!(lines(&mut console, "/write 00"), ["error: no accessory bound"]);
    assert_eq!(lines(&mut console, "/detach"), ["error: no accessory bound"]);
    assert_eq!(lines(&mut console, "/deliver 00"), ["no live session"]);
    assert_eq!(lines(&mut console, "/read 4"), ["no data"]);
}

#[test]
fn status_reflects_session() {
    let mut console = console();
    lines(&mut console, "/start p");
    lines(&mut console, "/attach A p");
    lines(&mut console, "/open");
    lines(&mut console, "/deliver 00ff");

    assert_eq!(
        lines(&mut console, "/status"),
        [
            "monitoring: p",
            "bound: A (id 1)",
            "session: Open",
            "bytes available: 2",
            "pending writes: 0",
        ]
    );
}

#[test]
fn bad_input_is_reported() {
    let mut console = console();
    assert_eq!(lines(&mut console, "/bogus"), ["unknown command: /bogus (try /help)"]);
    assert_eq!(lines(&mut console, "/read x"), ["/read: Invalid byte count"]);
    assert!(!lines(&mut console, "/help").is_empty());
}
