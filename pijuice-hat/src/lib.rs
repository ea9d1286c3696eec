//! High-level device interface for the PiJuice UPS HAT
//!
//! This crate turns typed operations into command frames and back. Four
//! command groups share one [`PiJuice`] handle:
//!
//! - [`StatusCommands`]: telemetry, buttons, faults, LEDs, IO pins
//! - [`ConfigCommands`]: persisted settings, battery profiles, addresses
//! - [`PowerCommands`]: power-off timer, watchdog, wake-on-charge
//! - [`RtcCommands`]: date/time, alarm, wake-up control
//!
//! plus the diagnostic log reader, a settings registry and a worker handle
//! for async callers.

mod codec;

pub mod config;
pub mod diag_log;
pub mod error;
pub mod power;
pub mod registry;
pub mod rtc;
pub mod status;
pub mod worker;

pub use config::{
    BatteryExtProfile, BatteryProfile, BatteryProfileStatus, ButtonAction, ButtonConfig,
    ButtonFunction, ConfigCommands, FirmwareVersion, IoConfig, IoMode, IoParameter, IoPull,
    IoWakeup, LedConfig, LedFunction, PowerInputsConfig, PowerRegulatorMode, RsocEstimation,
    RunPinConfig, TempSense,
};
pub use diag_log::{DiagLog, LogConfigFlag, LogEntry, LogEvent};
pub use error::{outcome, ErrorKind, PiJuiceError};
pub use power::{PowerCommands, WakeOnCharge};
pub use registry::{SettingDescriptor, SettingKey, SettingKind, SettingsRegistry};
pub use rtc::{Alarm, AlarmDay, AlarmHour, AlarmMinute, ControlStatus, Hour, RtcCommands, RtcTime};
pub use status::{
    BatteryState, Button, ButtonEvent, ButtonEvents, FaultFlag, FaultStatus, IoPin, Led,
    LedBlink, PowerInputState, Rgb, Status, StatusCommands,
};
pub use worker::PiJuiceHandle;

use std::sync::Arc;

use parking_lot::Mutex;
use pijuice_transport::protocol::cmd;
use pijuice_transport::{
    open_bus, BusAddress, Exchange, FlowControlTransport, RetryPolicy, TransportError,
};
use serde::Serialize;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, PiJuiceError>;

/// A value read from a register that also carries a persistence flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stored<T> {
    pub value: T,
    pub non_volatile: bool,
}

impl<T> Stored<T> {
    pub fn new(value: T, non_volatile: bool) -> Self {
        Self {
            value,
            non_volatile,
        }
    }
}

/// Handle to one HAT on one bus address
///
/// Holds the flow-controlled transport and a cached firmware version.
/// Command groups borrow it; see [`PiJuice::status`] and friends.
pub struct PiJuice {
    transport: Arc<FlowControlTransport>,
    firmware: Mutex<Option<FirmwareVersion>>,
}

impl PiJuice {
    /// Create a device interface on an existing transport
    pub fn new(transport: Arc<FlowControlTransport>) -> Self {
        Self {
            transport,
            firmware: Mutex::new(None),
        }
    }

    /// Open the HAT at `location` over i2c-dev
    pub fn open(location: BusAddress, policy: RetryPolicy) -> Result<Self> {
        let raw = open_bus(location)?;
        Ok(Self::new(Arc::new(FlowControlTransport::with_policy(
            raw, policy,
        ))))
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &Arc<FlowControlTransport> {
        &self.transport
    }

    pub fn location(&self) -> BusAddress {
        self.transport.device_info().location
    }

    // === Command groups ===

    pub fn status(&self) -> StatusCommands<'_> {
        StatusCommands::new(self)
    }

    pub fn config(&self) -> ConfigCommands<'_> {
        ConfigCommands::new(self)
    }

    pub fn power(&self) -> PowerCommands<'_> {
        PowerCommands::new(self)
    }

    pub fn rtc(&self) -> RtcCommands<'_> {
        RtcCommands::new(self)
    }

    pub fn diag_log(&self) -> DiagLog<'_> {
        DiagLog::new(self)
    }

    // === Firmware ===

    /// Firmware version, read once and cached
    pub fn firmware_version(&self) -> Result<FirmwareVersion> {
        if let Some(version) = *self.firmware.lock() {
            return Ok(version);
        }
        let version = self.config().get_firmware_version()?;
        debug!("Firmware version {}", version);
        *self.firmware.lock() = Some(version);
        Ok(version)
    }

    /// Forget the cached firmware version (after an upgrade)
    pub fn invalidate_firmware_cache(&self) {
        *self.firmware.lock() = None;
    }

    // === Register access shared by the command groups ===

    /// Read the fixed-length payload of `register`
    pub(crate) fn read(&self, register: u8) -> Result<Vec<u8>> {
        let len = read_len(register)?;
        Ok(self.transport.query(register, len)?)
    }

    /// Write a payload without reading it back
    pub(crate) fn write(&self, register: u8, payload: &[u8]) -> Result<()> {
        Ok(self.transport.send(register, payload)?)
    }

    /// Write a payload and confirm the register now holds exactly it
    pub(crate) fn write_verified(&self, register: u8, payload: &[u8]) -> Result<()> {
        self.write_verified_with(register, payload, |readback| readback == payload)
    }

    /// Write a payload and confirm the read-back with a custom comparison
    pub(crate) fn write_verified_with(
        &self,
        register: u8,
        payload: &[u8],
        matches: impl Fn(&[u8]) -> bool,
    ) -> Result<()> {
        self.transport
            .transaction(|tx| verified_exchange(tx, register, payload, &matches))
    }

    /// Read-modify-write under one bus hold
    ///
    /// `modify` receives the current payload and returns the new one, or
    /// `None` when the register already holds the wanted value.
    pub(crate) fn modify_verified(
        &self,
        register: u8,
        modify: impl FnOnce(&[u8]) -> Result<Option<Vec<u8>>>,
    ) -> Result<()> {
        let len = read_len(register)?;
        self.transport.transaction(|tx| {
            let current = tx.query(register, len)?;
            match modify(&current)? {
                Some(payload) => {
                    verified_exchange(tx, register, &payload, &|readback| readback == payload)
                }
                None => {
                    debug!("{} already up to date", cmd::name(register));
                    Ok(())
                }
            }
        })
    }
}

fn read_len(register: u8) -> Result<usize> {
    cmd::read_len(register).ok_or_else(|| {
        PiJuiceError::Transport(TransportError::InvalidArgument(format!(
            "register 0x{register:02X} has no fixed read length"
        )))
    })
}

fn verified_exchange(
    tx: &Exchange<'_>,
    register: u8,
    payload: &[u8],
    matches: &dyn Fn(&[u8]) -> bool,
) -> Result<()> {
    tx.send(register, payload)?;
    tx.settle();
    let readback = tx.query(register, payload.len())?;
    if matches(&readback) {
        Ok(())
    } else {
        warn!(
            "{} read-back mismatch: wrote {:02x?}, read {:02x?}",
            cmd::name(register),
            payload,
            readback
        );
        Err(PiJuiceError::WriteFailed { register })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use pijuice_transport::SimulatedTransport;

    /// Simulated HAT behind a zero-delay flow-control layer
    pub fn simulated() -> (Arc<SimulatedTransport>, PiJuice) {
        let sim = Arc::new(SimulatedTransport::new());
        let flow = FlowControlTransport::with_policy(sim.clone(), RetryPolicy::immediate());
        (sim, PiJuice::new(Arc::new(flow)))
    }
}
