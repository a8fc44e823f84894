//! Accessory session console
//!
//! A thin shell over [`accessory_core::AccessoryMonitor`] driven by text
//! commands. The monitor runs against [`accessory_harness::SimTransport`], so
//! the console doubles as a way to attach, detach and feed simulated devices
//! by hand.
//!
//! # Architecture
//!
//! ```text
//! stdin line ──> commands::parse ──> Console::execute ──> monitor / sim
//!                                          │
//!                                          └── pump events, drain notifications
//!                                                   │
//!                                                   v
//!                                            reply lines ──> stdout
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod commands;
pub mod console;
pub mod error;
pub mod logging;

pub use cli::Cli;
pub use commands::Command;
pub use console::{Console, Reply};
pub use error::CliError;
