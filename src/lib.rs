// PiJuice UPS HAT host tool - shared library
// Configuration file and host session on top of the device crates

pub mod config;
pub mod session;

pub use config::{AppConfig, RetryConfig};
pub use session::{
    scan, Indication, PollingGate, PollingGuard, SessionError, SessionOptions, UpsSession,
    SCAN_BUSES,
};
