//! Transport abstraction layer for PiJuice UPS HAT communication
//!
//! This crate provides the byte-level plumbing between the host and the HAT
//! microcontroller:
//!
//! - I2C (Linux i2c-dev, SMBus block transfers)
//! - Simulated (in-memory register file with fault injection)
//!
//! On top of a raw backend, [`FlowControlTransport`] adds framing (checksum
//! append/verify), bounded retries with backoff and single-flight locking.
//! [`PrinterTransport`] is a middleware that dumps every frame for debugging.
//!
//! ```text
//! [I2cTransport / SimulatedTransport]  ← implements Transport (raw I/O)
//!                |
//!       [PrinterTransport]              ← optional, prints frames
//!                |
//!      [FlowControlTransport]           ← checksum, retries, bus lock
//!                |
//!         [command groups]
//! ```

pub mod error;
pub mod flow_control;
pub mod printer;
pub mod protocol;
pub mod sim;
pub mod types;

#[cfg(all(target_os = "linux", feature = "i2c"))]
mod i2c;

pub use error::TransportError;
pub use flow_control::{Exchange, FlowControlTransport, RetryPolicy};
pub use printer::{PacketFilter, PrinterConfig, PrinterTransport};
pub use protocol::{append_checksum, checksum, cmd, verify_checksum, verify_frame};
pub use sim::SimulatedTransport;
pub use types::{BusAddress, TransportDeviceInfo, TransportType};

#[cfg(all(target_os = "linux", feature = "i2c"))]
pub use i2c::I2cTransport;

use std::sync::Arc;

/// The core transport trait - all backends implement this
///
/// One call is one bus transaction. Implementations do no retrying and no
/// checksum handling; they only move bytes and report bus failures.
pub trait Transport: Send + Sync {
    /// Read `len` bytes (payload plus checksum) from a command register
    fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Write a complete frame (payload plus checksum) to a command register
    fn write(&self, register: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn Transport>;

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(register, len)
    }

    fn write(&self, register: u8, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(register, data)
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        (**self).device_info()
    }
}

/// Open the hardware backend for `location`
#[cfg(all(target_os = "linux", feature = "i2c"))]
pub fn open_bus(location: BusAddress) -> Result<BoxedTransport, TransportError> {
    Ok(Arc::new(I2cTransport::open(location)?))
}

/// Open the hardware backend for `location`
#[cfg(not(all(target_os = "linux", feature = "i2c")))]
pub fn open_bus(location: BusAddress) -> Result<BoxedTransport, TransportError> {
    Err(TransportError::DeviceNotFound(format!(
        "{location}: I2C support not built for this platform"
    )))
}
