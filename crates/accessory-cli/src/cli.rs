//! Command-line arguments.

use accessory_core::SessionConfig;
use clap::Parser;

/// Interactive console for accessory sessions.
#[derive(Debug, Clone, Parser)]
#[command(name = "accessory-cli", version, about)]
pub struct Cli {
    /// Start monitoring this protocol identifier on launch
    #[arg(short, long)]
    pub protocol: Option<String>,

    /// Bytes requested from the input stream per read call
    #[arg(long, default_value_t = accessory_core::config::DEFAULT_READ_CHUNK_SIZE)]
    pub read_chunk: usize,

    /// Seed for simulated stream fragmentation
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Split simulated reads into random fragments of at most this many bytes
    #[arg(long)]
    pub read_fragments: Option<usize>,

    /// Enable debug logging (overridden by `RUST_LOG`)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Session configuration derived from the flags.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig { read_chunk_size: self.read_chunk, ..SessionConfig::default() }
    }
}
