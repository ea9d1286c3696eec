//! Linux i2c-dev transport
//!
//! Each command is one SMBus I²C block transfer: the register byte followed
//! by the frame. No retries here; that is the flow-control layer's job.

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::types::{BusAddress, TransportDeviceInfo, TransportType};
use crate::Transport;

/// Largest block a single SMBus transfer may carry
const SMBUS_BLOCK_MAX: usize = 32;

/// Transport over `/dev/i2c-<bus>`
pub struct I2cTransport {
    device: Mutex<LinuxI2CDevice>,
    info: TransportDeviceInfo,
}

impl I2cTransport {
    /// Open the HAT at `location`
    pub fn open(location: BusAddress) -> Result<Self, TransportError> {
        if location.address > 0x7F {
            return Err(TransportError::InvalidArgument(format!(
                "address 0x{:02X} is not a 7-bit I2C address",
                location.address
            )));
        }
        let path = location.device_path();
        let device = LinuxI2CDevice::new(&path, u16::from(location.address))
            .map_err(|e| TransportError::from((0u8, e)))?;
        debug!("Opened {} at {}", path, location);
        Ok(Self {
            device: Mutex::new(device),
            info: TransportDeviceInfo::new(location, TransportType::I2c),
        })
    }
}

impl Transport for I2cTransport {
    fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        if len == 0 || len > SMBUS_BLOCK_MAX {
            return Err(TransportError::InvalidArgument(format!(
                "block read of {len} bytes"
            )));
        }
        let data = self
            .device
            .lock()
            .smbus_read_i2c_block_data(register, len as u8)
            .map_err(|e| TransportError::from((register, e)))?;
        if data.len() < len {
            return Err(TransportError::ShortRead {
                register,
                expected: len,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    fn write(&self, register: u8, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > SMBUS_BLOCK_MAX {
            return Err(TransportError::InvalidArgument(format!(
                "block write of {} bytes",
                data.len()
            )));
        }
        self.device
            .lock()
            .smbus_write_i2c_block_data(register, data)
            .map_err(|e| TransportError::from((register, e)))
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}
