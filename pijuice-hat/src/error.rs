//! Device interface error types
//!
//! Every operation returns `Result<T, PiJuiceError>`. [`PiJuiceError::kind`]
//! projects an error onto the closed [`ErrorKind`] set the device protocol
//! defines, so callers can branch on the outcome without matching variants.

use std::fmt;
use std::str::FromStr;

use pijuice_transport::TransportError;
use serde::Serialize;
use thiserror::Error;

/// Closed set of protocol outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoError,
    CommunicationError,
    DataCorrupted,
    WriteFailed,
    BadArgument,
    UnknownData,
    UnknownConfig,
    InvalidSecond,
    InvalidMinute,
    InvalidMinutePeriod,
    InvalidHour,
    InvalidWeekday,
    InvalidDay,
    InvalidMonth,
    InvalidYear,
    InvalidPeriod,
    InvalidDutyCycle,
    InvalidConfig,
    InvalidMode,
    InvalidPull,
    InvalidUsbMicroCurrentLimit,
    InvalidUsbMicroDpm,
}

impl ErrorKind {
    pub const ALL: &'static [ErrorKind] = &[
        Self::NoError,
        Self::CommunicationError,
        Self::DataCorrupted,
        Self::WriteFailed,
        Self::BadArgument,
        Self::UnknownData,
        Self::UnknownConfig,
        Self::InvalidSecond,
        Self::InvalidMinute,
        Self::InvalidMinutePeriod,
        Self::InvalidHour,
        Self::InvalidWeekday,
        Self::InvalidDay,
        Self::InvalidMonth,
        Self::InvalidYear,
        Self::InvalidPeriod,
        Self::InvalidDutyCycle,
        Self::InvalidConfig,
        Self::InvalidMode,
        Self::InvalidPull,
        Self::InvalidUsbMicroCurrentLimit,
        Self::InvalidUsbMicroDpm,
    ];

    /// Device-style name, e.g. `COMMUNICATION_ERROR`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoError => "NO_ERROR",
            Self::CommunicationError => "COMMUNICATION_ERROR",
            Self::DataCorrupted => "DATA_CORRUPTED",
            Self::WriteFailed => "WRITE_FAILED",
            Self::BadArgument => "BAD_ARGUMENT",
            Self::UnknownData => "UNKNOWN_DATA",
            Self::UnknownConfig => "UNKNOWN_CONFIG",
            Self::InvalidSecond => "INVALID_SECOND",
            Self::InvalidMinute => "INVALID_MINUTE",
            Self::InvalidMinutePeriod => "INVALID_MINUTE_PERIOD",
            Self::InvalidHour => "INVALID_HOUR",
            Self::InvalidWeekday => "INVALID_WEEKDAY",
            Self::InvalidDay => "INVALID_DAY",
            Self::InvalidMonth => "INVALID_MONTH",
            Self::InvalidYear => "INVALID_YEAR",
            Self::InvalidPeriod => "INVALID_PERIOD",
            Self::InvalidDutyCycle => "INVALID_DUTY_CYCLE",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::InvalidMode => "INVALID_MODE",
            Self::InvalidPull => "INVALID_PULL",
            Self::InvalidUsbMicroCurrentLimit => "INVALID_USB_MICRO_CURRENT_LIMIT",
            Self::InvalidUsbMicroDpm => "INVALID_USB_MICRO_DPM",
        }
    }

    /// Validation failures never reach the bus and are never retried
    pub fn is_validation(self) -> bool {
        !matches!(
            self,
            Self::NoError
                | Self::CommunicationError
                | Self::DataCorrupted
                | Self::WriteFailed
                | Self::UnknownData
                | Self::UnknownConfig
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown error kind: {}", s))
    }
}

/// Errors from PiJuice operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PiJuiceError {
    /// Transport layer error, after retries
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The write went out but the read-back differs
    #[error("Write verification failed on register 0x{register:02X}")]
    WriteFailed { register: u8 },

    /// Caller-supplied value outside its domain
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// A field-specific value check failed
    #[error("{kind}: {detail}")]
    Invalid { kind: ErrorKind, detail: String },

    /// The device returned a value outside the expected enumeration
    #[error("Unknown data in register 0x{register:02X}: {detail}")]
    UnknownData { register: u8, detail: String },

    /// A configuration register holds an unrecognised setting
    #[error("Unknown configuration in register 0x{register:02X}: {detail}")]
    UnknownConfig { register: u8, detail: String },

    /// The worker thread owning the device has exited
    #[error("Device worker stopped")]
    WorkerStopped,
}

impl PiJuiceError {
    /// Map onto the closed protocol outcome set
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(TransportError::ChecksumMismatch { .. }) => ErrorKind::DataCorrupted,
            Self::Transport(TransportError::InvalidArgument(_)) => ErrorKind::BadArgument,
            Self::Transport(_) => ErrorKind::CommunicationError,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::BadArgument(_) => ErrorKind::BadArgument,
            Self::Invalid { kind, .. } => *kind,
            Self::UnknownData { .. } => ErrorKind::UnknownData,
            Self::UnknownConfig { .. } => ErrorKind::UnknownConfig,
            Self::WorkerStopped => ErrorKind::CommunicationError,
        }
    }

    pub(crate) fn invalid(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            detail: detail.into(),
        }
    }

    pub(crate) fn unknown_data(register: u8, detail: impl Into<String>) -> Self {
        Self::UnknownData {
            register,
            detail: detail.into(),
        }
    }

    pub(crate) fn unknown_config(register: u8, detail: impl Into<String>) -> Self {
        Self::UnknownConfig {
            register,
            detail: detail.into(),
        }
    }

    /// Attribute a decode failure to the register the bytes were read from
    pub(crate) fn read_from(self, register: u8) -> Self {
        match self {
            Self::UnknownData { detail, .. } => Self::UnknownData { register, detail },
            Self::UnknownConfig { detail, .. } => Self::UnknownConfig { register, detail },
            other => other,
        }
    }
}

/// Kind of a finished operation, `NoError` on success
pub fn outcome<T>(result: &Result<T, PiJuiceError>) -> ErrorKind {
    match result {
        Ok(_) => ErrorKind::NoError,
        Err(e) => e.kind(),
    }
}
