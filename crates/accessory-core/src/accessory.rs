//! Device handle for an attached peripheral.
//!
//! The handle is supplied by the transport's discovery mechanism and is never
//! created by the core itself. It identifies one physical attachment: a device
//! that is unplugged and plugged back in reports a new `connection_id`.

/// Transport-assigned identifier of one accessory attachment.
pub type ConnectionId = u64;

/// A connected peripheral and the protocols it advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accessory {
    /// Unique per attachment; changes when the device reconnects
    pub connection_id: ConnectionId,
    /// Display name reported by the device
    pub name: String,
    /// Manufacturer name
    pub manufacturer: String,
    /// Model number
    pub model_number: String,
    /// Serial number
    pub serial_number: String,
    /// Firmware revision
    pub firmware_revision: String,
    /// Hardware revision
    pub hardware_revision: String,
    /// Application-layer protocol identifiers, in the order the device lists them
    pub protocol_strings: Vec<String>,
}

impl Accessory {
    /// Create a handle with only a connection ID and name.
    pub fn new(connection_id: ConnectionId, name: impl Into<String>) -> Self {
        Self { connection_id, name: name.into(), ..Self::default() }
    }

    /// Add an advertised protocol identifier.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol_strings.push(protocol.into());
        self
    }

    /// Whether the device advertises `protocol`. Exact, case-sensitive match.
    pub fn supports(&self, protocol: &str) -> bool {
        self.protocol_strings.iter().any(|p| p == protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_exact_protocol_only() {
        let accessory = Accessory::new(7, "Reader")
            .with_protocol("com.example.proto")
            .with_protocol("com.example.update");

        assert!(accessory.supports("com.example.proto"));
        assert!(accessory.supports("com.example.update"));
        assert!(!accessory.supports("com.example"));
        assert!(!accessory.supports("COM.EXAMPLE.PROTO"));
    }

    #[test]
    fn new_has_no_protocols() {
        let accessory = Accessory::new(1, "Bare");
        assert_eq!(accessory.connection_id, 1);
        assert_eq!(accessory.name, "Bare");
        assert!(accessory.protocol_strings.is_empty());
        assert!(!accessory.supports(""));
    }
}
