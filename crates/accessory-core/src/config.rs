//! Controller configuration.

use crate::error::ConfigError;

/// Default size of the transient buffer used for each inbound stream read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 128;

/// Default number of notifications buffered per subscriber before the oldest
/// are overwritten.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Session controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bytes requested from the inbound stream per read call
    pub read_chunk_size: usize,
    /// Capacity of the notification broadcast channel
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for a zero read chunk or notification capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::ZeroReadChunk);
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::ZeroNotificationCapacity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_sizes_rejected() {
        let config = SessionConfig { read_chunk_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroReadChunk)));

        let config = SessionConfig { notification_capacity: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroNotificationCapacity)));
    }
}
