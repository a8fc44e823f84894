//! Console command parsing.
//!
//! Commands start with `/`. Anything else is sent to the accessory as UTF-8
//! text.

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start monitoring a protocol.
    Start {
        /// Protocol identifier to watch.
        protocol: String,
    },

    /// Stop monitoring.
    Stop,

    /// Open a session with the bound accessory.
    Open,

    /// Close the session.
    Close,

    /// Queue raw bytes for the accessory.
    Write {
        /// Bytes decoded from hex.
        bytes: Vec<u8>,
    },

    /// Send text to the accessory.
    Send {
        /// Text as typed.
        text: String,
    },

    /// Consume received bytes.
    Read {
        /// Maximum number of bytes to take.
        max_bytes: usize,
    },

    /// Attach a simulated accessory.
    Attach {
        /// Display name.
        name: String,
        /// Advertised protocol identifiers.
        protocols: Vec<String>,
    },

    /// Detach the bound simulated accessory.
    Detach,

    /// Simulated accessory sends bytes to the host.
    Deliver {
        /// Bytes decoded from hex.
        bytes: Vec<u8>,
    },

    /// Print monitor and session state.
    Status,

    /// List commands.
    Help,

    /// Quit the console.
    Quit,

    /// Unknown command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// One-line summary of every command, for `/help`.
pub const HELP: &[&str] = &[
    "/start <protocol>           watch for accessories advertising <protocol>",
    "/stop                       stop watching",
    "/open                       open a session with the bound accessory",
    "/close                      close the session",
    "/write <hex>                queue bytes for the accessory",
    "/read <n>                   take up to <n> received bytes",
    "/attach <name> <proto...>   attach a simulated accessory",
    "/detach                     detach the bound accessory",
    "/deliver <hex>              simulated accessory sends bytes",
    "/status                     show monitor and session state",
    "/quit                       exit",
    "<text>                      send text to the accessory",
];

/// Parse a user input string into a command.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Send { text: input.to_string() };
    };

    let parts: Vec<&str> = cmd_str.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");

    match command {
        "start" => match parts.get(1) {
            Some(protocol) => Command::Start { protocol: (*protocol).to_string() },
            None => Command::InvalidArgs {
                command: "start".into(),
                error: "Usage: /start <protocol>".into(),
            },
        },

        "stop" => Command::Stop,

        "open" => Command::Open,

        "close" => Command::Close,

        "write" => match parse_hex("write", &parts[1..]) {
            Ok(bytes) => Command::Write { bytes },
            Err(invalid) => invalid,
        },

        "deliver" => match parse_hex("deliver", &parts[1..]) {
            Ok(bytes) => Command::Deliver { bytes },
            Err(invalid) => invalid,
        },

        "read" => match parts.get(1) {
            Some(n) => match n.parse::<usize>() {
                Ok(max_bytes) => Command::Read { max_bytes },
                Err(_) => {
                    Command::InvalidArgs { command: "read".into(), error: "Invalid byte count".into() }
                },
            },
            None => {
                Command::InvalidArgs { command: "read".into(), error: "Usage: /read <n>".into() }
            },
        },

        "attach" => match parts.get(1..) {
            Some([name, protocols @ ..]) if !protocols.is_empty() => Command::Attach {
                name: (*name).to_string(),
                protocols: protocols.iter().map(ToString::to_string).collect(),
            },
            _ => Command::InvalidArgs {
                command: "attach".into(),
                error: "Usage: /attach <name> <protocol...>".into(),
            },
        },

        "detach" => Command::Detach,

        "status" => Command::Status,

        "help" | "h" => Command::Help,

        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}

/// Decode hex from the remaining words; whitespace between bytes is allowed.
fn parse_hex(command: &str, words: &[&str]) -> Result<Vec<u8>, Command> {
    if words.is_empty() {
        return Err(Command::InvalidArgs {
            command: command.into(),
            error: format!("Usage: /{command} <hex>"),
        });
    }
    hex::decode(words.concat()).map_err(|err| Command::InvalidArgs {
        command: command.into(),
        error: format!("Invalid hex: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text() {
        assert_eq!(parse("hello world"), Command::Send { text: "hello world".into() });
    }

    #[test]
    fn parse_empty() {
        assert_eq!(parse("   "), Command::Send { text: String::new() });
    }

    #[test]
    fn parse_start() {
        assert_eq!(
            parse("/start com.example.proto"),
            Command::Start { protocol: "com.example.proto".into() }
        );
    }

    #[test]
    fn parse_start_missing_protocol() {
        assert!(
            matches!(parse("/start"), Command::InvalidArgs { command, .. } if command == "start")
        );
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse("/stop"), Command::Stop);
        assert_eq!(parse("/open"), Command::Open);
        assert_eq!(parse("/close"), Command::Close);
        assert_eq!(parse("/detach"), Command::Detach);
        assert_eq!(parse("/status"), Command::Status);
        assert_eq!(parse("/help"), Command::Help);
    }

    #[test]
    fn parse_write_hex() {
        assert_eq!(parse("/write 0102ff"), Command::Write { bytes: vec![0x01, 0x02, 0xff] });
        assert_eq!(parse("/write 01 02 ff"), Command::Write { bytes: vec![0x01, 0x02, 0xff] });
    }

    #[test]
    fn parse_write_bad_hex() {
        assert!(
            matches!(parse("/write 0g"), Command::InvalidArgs { command, .. } if command == "write")
        );
        assert!(
            matches!(parse("/write 012"), Command::InvalidArgs { command, .. } if command == "write")
        );
        assert!(
            matches!(parse("/write"), Command::InvalidArgs { command, .. } if command == "write")
        );
    }

    #[test]
    fn parse_deliver() {
        assert_eq!(parse("/deliver abcd"), Command::Deliver { bytes: vec![0xab, 0xcd] });
    }

    #[test]
    fn parse_read() {
        assert_eq!(parse("/read 10"), Command::Read { max_bytes: 10 });
        assert!(matches!(parse("/read -1"), Command::InvalidArgs { .. }));
        assert!(matches!(parse("/read"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_attach() {
        assert_eq!(
            parse("/attach Reader com.a com.b"),
            Command::Attach { name: "Reader".into(), protocols: vec!["com.a".into(), "com.b".into()] }
        );
    }

    #[test]
    fn parse_attach_requires_protocol() {
        assert!(
            matches!(parse("/attach Reader"), Command::InvalidArgs { command, .. } if command == "attach")
        );
        assert!(matches!(parse("/attach"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_quit() {
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/q"), Command::Quit);
    }

    #[test]
    fn parse_unknown_command() {
        assert!(matches!(parse("/unknown"), Command::Unknown { .. }));
        assert!(matches!(parse("/"), Command::Unknown { .. }));
    }
}
