//! Console errors.

use accessory_core::ConfigError;
use thiserror::Error;

/// Errors that end the console.
#[derive(Debug, Error)]
pub enum CliError {
    /// Flags produced an invalid session configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Reading commands or writing replies failed
    #[error("console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
