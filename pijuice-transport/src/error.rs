//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    // Bus errors
    #[error("Bus I/O error on register 0x{register:02X}: {message}")]
    Io { register: u8, message: String },

    #[error("Short read on register 0x{register:02X}: expected {expected} bytes, got {actual}")]
    ShortRead {
        register: u8,
        expected: usize,
        actual: usize,
    },

    /// The transfer completed but took longer than the device allows;
    /// the command is still executing and the bus must not be hammered.
    #[error("Transfer on register 0x{register:02X} took {elapsed:?}, device busy")]
    Timeout { register: u8, elapsed: Duration },

    #[error("Checksum mismatch on register 0x{register:02X}")]
    ChecksumMismatch { register: u8 },

    // Device access errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Bus permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid transport argument: {0}")]
    InvalidArgument(String),
}

impl TransportError {
    /// Whether the retry policy may absorb this error by trying again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ShortRead { .. } | Self::ChecksumMismatch { .. }
        )
    }

    /// Whether this came from the bus itself rather than from frame validation
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::ShortRead { .. })
    }

    /// Whether the frame arrived but failed checksum validation
    pub fn is_checksum(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }

    /// Build an I/O error from any displayable bus error
    pub fn io(register: u8, err: impl std::fmt::Display) -> Self {
        Self::Io {
            register,
            message: err.to_string(),
        }
    }
}

#[cfg(all(target_os = "linux", feature = "i2c"))]
impl From<(u8, i2cdev::linux::LinuxI2CError)> for TransportError {
    fn from((register, e): (u8, i2cdev::linux::LinuxI2CError)) -> Self {
        let io: std::io::Error = e.into();
        match io.kind() {
            std::io::ErrorKind::PermissionDenied => TransportError::PermissionDenied(io.to_string()),
            std::io::ErrorKind::NotFound => TransportError::DeviceNotFound(io.to_string()),
            _ => TransportError::io(register, io),
        }
    }
}
