//! Host-side session with one HAT
//!
//! Wraps a [`PiJuice`] with what a long-running host needs on top of the
//! raw command groups: device verification, start-up housekeeping, a
//! status cache bounded by the polling interval, a polling gate for
//! firmware maintenance, LED indications and the power-off sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pijuice_hat::{
    Button, FirmwareVersion, Led, LedConfig, LedFunction, PiJuice, PiJuiceError, Rgb, Status,
    WakeOnCharge,
};
use pijuice_transport::BusAddress;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts at reading the reported address during `connect`
const VERIFY_TRIES: u32 = 5;

/// Cached status stays valid for the scan interval times this margin
const CACHE_MARGIN: f64 = 1.1;

/// LED showing the host state
const INDICATOR_LED: Led = Led::D2;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HAT reports address 0x{found:02X}, configured 0x{expected:02X}")]
    AddressMismatch { expected: u8, found: u8 },

    #[error("Firmware {0} is too old, 1.0 or newer is required")]
    FirmwareTooOld(FirmwareVersion),

    #[error(transparent)]
    Device(#[from] PiJuiceError),
}

/// Host state shown on the indicator LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    Running,
    InTransition,
    ShuttingDown,
}

impl Indication {
    pub fn color(self) -> Rgb {
        match self {
            Self::Running => Rgb::new(0, 9, 0),
            Self::InTransition => Rgb::new(9, 0, 0),
            Self::ShuttingDown => Rgb::new(0, 0, 9),
        }
    }
}

// ============================================================================
// Polling gate
// ============================================================================

/// Shared flag telling pollers whether they may touch the bus
#[derive(Debug, Clone)]
pub struct PollingGate {
    enabled: Arc<AtomicBool>,
}

impl Default for PollingGate {
    fn default() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl PollingGate {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Disable polling until the returned guard drops
    pub fn suspend(&self) -> PollingGuard {
        let previous = self.enabled.swap(false, Ordering::SeqCst);
        debug!("Polling suspended");
        PollingGuard {
            enabled: Arc::clone(&self.enabled),
            previous,
        }
    }
}

/// Restores the polling flag on drop
#[must_use = "polling resumes as soon as the guard is dropped"]
pub struct PollingGuard {
    enabled: Arc<AtomicBool>,
    previous: bool,
}

impl Drop for PollingGuard {
    fn drop(&mut self) {
        self.enabled.store(self.previous, Ordering::SeqCst);
        debug!("Polling restored to {}", self.previous);
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Address the HAT must report for itself
    pub address: u8,
    pub scan_interval: Duration,
    /// First pause between address read attempts, doubled each time
    pub verify_backoff: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            address: pijuice_transport::protocol::DEFAULT_ADDRESS,
            scan_interval: Duration::from_secs(30),
            verify_backoff: Duration::from_millis(50),
        }
    }
}

struct CachedStatus {
    status: Status,
    read_at: Instant,
}

pub struct UpsSession {
    pj: PiJuice,
    scan_interval: Duration,
    cache: Mutex<Option<CachedStatus>>,
    powered: AtomicBool,
    gate: PollingGate,
}

impl UpsSession {
    /// Verify the device and take an initial status reading
    ///
    /// The HAT must report the configured address for itself and run
    /// firmware 1.0 or newer.
    pub fn connect(pj: PiJuice, options: &SessionOptions) -> Result<Self, SessionError> {
        let found = reported_address(&pj, options.verify_backoff)?;
        if found != options.address {
            return Err(SessionError::AddressMismatch {
                expected: options.address,
                found,
            });
        }
        let firmware = pj.firmware_version()?;
        if !firmware.at_least(1, 0) {
            return Err(SessionError::FirmwareTooOld(firmware));
        }
        info!("PiJuice HAT at {} with firmware {}", pj.location(), firmware);

        let session = Self {
            pj,
            scan_interval: options.scan_interval,
            cache: Mutex::new(None),
            powered: AtomicBool::new(false),
            gate: PollingGate::default(),
        };
        session.indicate_or_warn(Indication::InTransition);
        session.status(true)?;
        Ok(session)
    }

    pub fn device(&self) -> &PiJuice {
        &self.pj
    }

    /// Give the device back, e.g. to move it onto a worker thread
    pub fn into_device(self) -> PiJuice {
        self.pj
    }

    /// Sync the RTC to host UTC and clear any reported faults
    pub fn set_up(&self) -> Result<(), SessionError> {
        let time = self.pj.rtc().set_time_now()?;
        debug!("RTC set to {}", time);

        let status = self.status(true)?;
        if status.is_fault {
            let faults = self.pj.status().get_fault_status()?;
            warn!("HAT reports faults: {:?}", faults);
            self.pj.status().reset_fault_flags(&faults.flags)?;
        }
        self.indicate_or_warn(Indication::Running);
        Ok(())
    }

    // === Status cache ===

    /// STATUS register, served from cache while younger than the scan interval
    ///
    /// A fresh read that reports button activity also reads and
    /// acknowledges the pending events of all three buttons.
    pub fn status(&self, force: bool) -> Result<Status, SessionError> {
        let max_age = self.scan_interval.mul_f64(CACHE_MARGIN);
        if !force {
            if let Some(cached) = &*self.cache.lock() {
                if cached.read_at.elapsed() < max_age {
                    return Ok(cached.status);
                }
            }
        }

        let status = self.pj.status().get_status()?;
        self.powered.store(status.is_powered(), Ordering::SeqCst);
        *self.cache.lock() = Some(CachedStatus {
            status,
            read_at: Instant::now(),
        });
        if status.is_button {
            self.process_buttons()?;
        }
        Ok(status)
    }

    /// Whether the last status read showed a present power input
    pub fn powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn process_buttons(&self) -> Result<(), SessionError> {
        let events = self.pj.status().get_button_events()?;
        for (button, event) in events.pending() {
            info!("Button {} event {}", button, event);
        }
        for button in Button::ALL {
            self.pj.status().accept_button_event(*button)?;
        }
        Ok(())
    }

    // === Polling gate ===

    pub fn polling_gate(&self) -> PollingGate {
        self.gate.clone()
    }

    pub fn suspend_polling(&self) -> PollingGuard {
        self.gate.suspend()
    }

    pub fn polling_enabled(&self) -> bool {
        self.gate.enabled()
    }

    // === LED and power-off ===

    pub fn indicate(&self, indication: Indication) -> Result<(), SessionError> {
        let config = LedConfig {
            function: LedFunction::UserLed,
            color: indication.color(),
        };
        self.pj.config().set_led_config(INDICATOR_LED, &config)?;
        Ok(())
    }

    fn indicate_or_warn(&self, indication: Indication) {
        if let Err(e) = self.indicate(indication) {
            warn!("Failed to show {:?} on LED: {}", indication, e);
        }
    }

    /// Arm the HAT to cut power after `delay_s` seconds
    ///
    /// With a non-negative `wakeon_delta` the HAT wakes the host once the
    /// battery is `wakeon_delta` percent above its current charge (capped at
    /// 100); a negative delta writes level 0. Returns the level written.
    pub fn power_off(&self, wakeon_delta: i32, delay_s: u8) -> Result<WakeOnCharge, SessionError> {
        let _quiet = self.suspend_polling();
        self.indicate_or_warn(Indication::InTransition);

        let level = if wakeon_delta >= 0 {
            let charge = match self.pj.status().get_charge_level() {
                Ok(charge) => i32::from(charge),
                Err(e) => {
                    warn!("Charge level unavailable ({}), waking at 100%", e);
                    100
                }
            };
            charge.saturating_add(wakeon_delta).min(100) as u8
        } else {
            0
        };
        let wake = WakeOnCharge::Level(level);
        info!("Setting wake-on-charge to {}%, power-off in {} s", level, delay_s);
        self.pj.power().set_wakeup_on_charge(wake, true)?;
        self.pj.power().set_power_off(delay_s)?;

        self.indicate_or_warn(Indication::ShuttingDown);
        Ok(wake)
    }
}

fn reported_address(pj: &PiJuice, backoff: Duration) -> Result<u8, PiJuiceError> {
    let mut delay = backoff;
    let mut attempt = 1;
    loop {
        match pj.config().get_address(1) {
            Ok(address) => return Ok(address),
            Err(e) if attempt < VERIFY_TRIES => {
                debug!("Address read attempt {} failed: {}", attempt, e);
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Bus scan
// ============================================================================

/// Buses searched when none are given
pub const SCAN_BUSES: [u8; 2] = [1, 2];

/// Try every address on every bus for a HAT
///
/// An address matches when the device there reports that same address as
/// its own. A failure to open a bus abandons the rest of that bus.
pub fn scan<F>(buses: &[u8], addresses: &[u8], mut open: F) -> Vec<BusAddress>
where
    F: FnMut(BusAddress) -> pijuice_hat::Result<PiJuice>,
{
    let mut found = Vec::new();
    for &bus in buses {
        for &address in addresses {
            let location = BusAddress::new(bus, address);
            let pj = match open(location) {
                Ok(pj) => pj,
                Err(e) => {
                    info!("Giving up on bus {}: {}", bus, e);
                    break;
                }
            };
            match pj.config().get_address(1) {
                Ok(reported) if reported == address => {
                    debug!("HAT found at {}", location);
                    found.push(location);
                }
                Ok(reported) => {
                    debug!("{} reports address 0x{:02X}", location, reported)
                }
                Err(_) => {}
            }
        }
    }
    found
}
