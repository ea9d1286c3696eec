//! Common types for transport layer

use serde::Serialize;
use std::fmt;

/// Transport backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportType {
    /// Linux i2c-dev character device
    I2c,
    /// In-memory simulated device
    Simulated,
}

/// Bus number and 7-bit device address of one HAT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BusAddress {
    pub bus: u8,
    pub address: u8,
}

impl BusAddress {
    pub const fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }

    /// Path of the i2c-dev node for this bus
    pub fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.bus)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c-{}@0x{:02X}", self.bus, self.address)
    }
}

/// Device identification information
#[derive(Debug, Clone, Serialize)]
pub struct TransportDeviceInfo {
    /// Where the device sits on the bus
    pub location: BusAddress,
    /// Transport type
    pub transport_type: TransportType,
}

impl TransportDeviceInfo {
    pub fn new(location: BusAddress, transport_type: TransportType) -> Self {
        Self {
            location,
            transport_type,
        }
    }
}
