//! Command execution against a monitor over the simulated transport.
//!
//! Every command runs synchronously: the console applies it, pumps whatever
//! transport events it caused, and renders the resulting notifications after
//! the command's own output.

use std::sync::Arc;

use accessory_core::{
    AccessoryMonitor, DisconnectReason, Notification, SessionConfig, SessionError,
};
use accessory_harness::{SimTransport, drain_notifications};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    cli::Cli,
    commands::{self, Command, HELP},
    error::CliError,
};

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Lines to print
    Lines(Vec<String>),
    /// The console should exit
    Quit,
}

/// Interactive console state.
pub struct Console {
    sim: SimTransport,
    monitor: AccessoryMonitor<SimTransport>,
    notifications: broadcast::Receiver<Notification>,
}

impl Console {
    /// Create a console with no accessories attached.
    pub fn new(config: SessionConfig, seed: u64) -> Result<Self, CliError> {
        Self::with_transport(config, SimTransport::with_seed(seed))
    }

    /// Create a console configured from command-line flags, starting the
    /// monitor if a protocol was given.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut sim = SimTransport::with_seed(cli.seed);
        if let Some(max) = cli.read_fragments {
            sim = sim.with_read_fragments(max);
        }
        let console = Self::with_transport(cli.session_config(), sim)?;
        if let Some(protocol) = &cli.protocol {
            console.monitor.start_monitoring(protocol);
        }
        Ok(console)
    }

    fn with_transport(config: SessionConfig, sim: SimTransport) -> Result<Self, CliError> {
        let monitor = AccessoryMonitor::new(Arc::new(sim.clone()), config)?;
        let notifications = monitor.subscribe();
        Ok(Self { sim, monitor, notifications })
    }

    /// The monitor the console drives.
    pub fn monitor(&self) -> &AccessoryMonitor<SimTransport> {
        &self.monitor
    }

    /// The simulated transport behind the monitor.
    pub fn transport(&self) -> &SimTransport {
        &self.sim
    }

    /// Parse and execute one input line.
    pub fn run_line(&mut self, line: &str) -> Reply {
        self.execute(commands::parse(line))
    }

    /// Execute `command`, then report any notifications it triggered.
    pub fn execute(&mut self, command: Command) -> Reply {
        debug!(?command, "executing");
        let mut lines = match command {
            Command::Quit => return Reply::Quit,
            Command::Start { protocol } => self.start(&protocol),
            Command::Stop => {
                let line = if self.monitor.stop_monitoring() {
                    "monitoring stopped"
                } else {
                    "not monitoring"
                };
                vec![line.to_string()]
            },
            Command::Open => outcome(self.monitor.open_session(), "session open"),
            Command::Close => outcome(self.monitor.close_session(), "session closed"),
            Command::Write { bytes } => self.write(&bytes),
            Command::Send { text } if text.is_empty() => Vec::new(),
            Command::Send { text } => self.write(text.as_bytes()),
            Command::Read { max_bytes } => self.read(max_bytes),
            Command::Attach { name, protocols } => {
                let protocols: Vec<&str> = protocols.iter().map(String::as_str).collect();
                let accessory = self.sim.attach_new(&name, &protocols);
                vec![format!("attached {} (id {})", accessory.name, accessory.connection_id)]
            },
            Command::Detach => self.detach(),
            Command::Deliver { bytes } => {
                let line = if self.sim.deliver(&bytes) {
                    format!("delivered {} bytes", bytes.len())
                } else {
                    "no live session".to_string()
                };
                vec![line]
            },
            Command::Status => self.status(),
            Command::Help => HELP.iter().map(ToString::to_string).collect(),
            Command::Unknown { input } => vec![format!("unknown command: {input} (try /help)")],
            Command::InvalidArgs { command, error } => vec![format!("/{command}: {error}")],
        };

        self.sim.pump(&self.monitor);
        lines.extend(drain_notifications(&mut self.notifications).iter().map(render));
        Reply::Lines(lines)
    }

    fn start(&self, protocol: &str) -> Vec<String> {
        if self.monitor.start_monitoring(protocol) {
            vec![format!("monitoring {protocol}")]
        } else {
            let watched = self.monitor.protocol().unwrap_or_default();
            vec![format!("already monitoring {watched}; /stop first")]
        }
    }

    fn write(&self, bytes: &[u8]) -> Vec<String> {
        match self.monitor.write_data(bytes) {
            Ok(()) => vec![format!(
                "queued {} bytes ({} pending)",
                bytes.len(),
                self.monitor.controller().pending_write_bytes()
            )],
            Err(err) => vec![format!("error: {err}")],
        }
    }

    fn read(&self, max_bytes: usize) -> Vec<String> {
        let bytes = self.monitor.read_data(max_bytes);
        if bytes.is_empty() {
            return vec!["no data".to_string()];
        }
        vec![format!(
            "read {} bytes: {} ({} remaining)",
            bytes.len(),
            hex::encode(&bytes),
            self.monitor.bytes_available()
        )]
    }

    fn detach(&self) -> Vec<String> {
        let Some(bound) = self.monitor.bound_accessory() else {
            return vec![format!("error: {}", SessionError::NoDeviceBound)];
        };
        match self.sim.detach(bound.connection_id) {
            Some(accessory) => vec![format!("detached {}", accessory.name)],
            None => vec![format!("accessory {} already gone", bound.connection_id)],
        }
    }

    fn status(&self) -> Vec<String> {
        let controller = self.monitor.controller();
        let monitoring = self.monitor.protocol().unwrap_or_else(|| "off".to_string());
        let bound = self.monitor.bound_accessory().map_or_else(
            || "none".to_string(),
            |a| format!("{} (id {})", a.name, a.connection_id),
        );
        vec![
            format!("monitoring: {monitoring}"),
            format!("bound: {bound}"),
            format!("session: {:?}", controller.state()),
            format!("bytes available: {}", controller.bytes_available()),
            format!("pending writes: {}", controller.pending_write_bytes()),
        ]
    }
}

fn outcome(result: Result<(), SessionError>, success: &str) -> Vec<String> {
    match result {
        Ok(()) => vec![success.to_string()],
        Err(err) => vec![format!("error: {err}")],
    }
}

/// Render a notification as a console line.
pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::Connected(accessory) => {
            format!("* connected: {} (id {})", accessory.name, accessory.connection_id)
        },
        Notification::Disconnected { accessory, reason } => {
            let reason = match reason {
                DisconnectReason::AccessoryRemoved => "accessory removed".to_string(),
                DisconnectReason::StreamEnded => "stream ended".to_string(),
                DisconnectReason::StreamError(err) => format!("stream error: {err}"),
            };
            format!("* disconnected: {} ({reason})", accessory.name)
        },
        Notification::DataReceived { connection_id, data } => {
            format!("* received {} bytes from {connection_id}: {}", data.len(), hex::encode(data))
        },
    }
}
