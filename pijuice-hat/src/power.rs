//! Power group: delayed power-off, wake-on-charge, watchdog, power switch

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tracing::info;

use pijuice_transport::protocol::cmd;

use crate::codec::bit;
use crate::error::PiJuiceError;
use crate::{PiJuice, Result, Stored};

/// POWER_OFF value meaning no countdown is running
const NO_POWER_OFF: u8 = 0xFF;

/// Largest power-switch current the register can express, in mA
pub const MAX_POWER_SWITCH_MA: u32 = 25_500;

/// Charge level at which the HAT wakes the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOnCharge {
    Disabled,
    /// Percent, 0..=100
    Level(u8),
}

impl WakeOnCharge {
    fn from_byte(d: u8) -> Stored<Self> {
        let value = match d & 0x7F {
            0x7F => Self::Disabled,
            level => Self::Level(level),
        };
        Stored::new(value, bit!(d, 7))
    }

    fn to_byte(self, non_volatile: bool) -> Result<u8> {
        let level = match self {
            Self::Disabled => 0x7F,
            Self::Level(level @ 0..=100) => level,
            Self::Level(level) => {
                return Err(PiJuiceError::BadArgument(format!(
                    "wake-on-charge level {level} exceeds 100"
                )))
            }
        };
        Ok(level | u8::from(non_volatile) << 7)
    }
}

impl fmt::Display for WakeOnCharge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("DISABLED"),
            Self::Level(level) => write!(f, "{level}"),
        }
    }
}

impl FromStr for WakeOnCharge {
    type Err = PiJuiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("DISABLED") {
            return Ok(Self::Disabled);
        }
        match s.parse::<u8>() {
            Ok(level) if level <= 100 => Ok(Self::Level(level)),
            _ => Err(PiJuiceError::BadArgument(format!(
                "wake-on-charge must be DISABLED or 0..=100, got {s}"
            ))),
        }
    }
}

impl Serialize for WakeOnCharge {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Disabled => serializer.serialize_str("DISABLED"),
            Self::Level(level) => serializer.serialize_u8(*level),
        }
    }
}

/// Watchdog timeout in minutes to the register value
///
/// Timeouts from 0x4000 up lose their two low bits.
fn watchdog_to_raw(minutes: u32, non_volatile: bool) -> Result<u16> {
    let raw = match minutes {
        0..=0x3FFF => minutes as u16,
        0x4000..=0xFFFF => ((minutes >> 2) as u16) | 0x4000,
        _ => {
            return Err(PiJuiceError::BadArgument(format!(
                "watchdog timeout {minutes} min exceeds 65535"
            )))
        }
    };
    Ok(raw | u16::from(non_volatile) << 15)
}

fn watchdog_from_raw(raw: u16) -> Stored<u32> {
    let minutes = u32::from(raw & 0x3FFF);
    let minutes = if raw & 0x4000 != 0 {
        minutes << 2
    } else {
        minutes
    };
    Stored::new(minutes, raw & 0x8000 != 0)
}

/// Power command group
pub struct PowerCommands<'a> {
    pj: &'a PiJuice,
}

impl<'a> PowerCommands<'a> {
    pub(crate) fn new(pj: &'a PiJuice) -> Self {
        Self { pj }
    }

    /// Seconds until the HAT cuts power, `None` when no countdown is pending
    pub fn get_power_off(&self) -> Result<Option<u8>> {
        let d = self.pj.read(cmd::POWER_OFF)?;
        Ok((d[0] != NO_POWER_OFF).then_some(d[0]))
    }

    pub fn set_power_off(&self, delay_s: u8) -> Result<()> {
        if delay_s == NO_POWER_OFF {
            return Err(PiJuiceError::BadArgument(
                "power-off delay must be 0..=254 s".into(),
            ));
        }
        info!("Power-off in {} s", delay_s);
        self.pj.write(cmd::POWER_OFF, &[delay_s])
    }

    pub fn cancel_power_off(&self) -> Result<()> {
        self.pj.write(cmd::POWER_OFF, &[NO_POWER_OFF])
    }

    pub fn get_wakeup_on_charge(&self) -> Result<Stored<WakeOnCharge>> {
        let d = self.pj.read(cmd::WAKEUP_ON_CHARGE)?;
        Ok(WakeOnCharge::from_byte(d[0]))
    }

    pub fn set_wakeup_on_charge(&self, wake: WakeOnCharge, non_volatile: bool) -> Result<()> {
        let d = wake.to_byte(non_volatile)?;
        self.pj.write_verified(cmd::WAKEUP_ON_CHARGE, &[d])
    }

    /// Watchdog timeout in minutes; 0 means disabled
    pub fn get_watchdog(&self) -> Result<Stored<u32>> {
        let d = self.pj.read(cmd::WATCHDOG_ACTIVATION)?;
        Ok(watchdog_from_raw(u16::from_le_bytes([d[0], d[1]])))
    }

    pub fn set_watchdog(&self, minutes: u32, non_volatile: bool) -> Result<()> {
        let raw = watchdog_to_raw(minutes, non_volatile)?;
        self.pj
            .write_verified(cmd::WATCHDOG_ACTIVATION, &raw.to_le_bytes())
    }

    /// System power switch current limit in mA; 0 means switched off
    pub fn get_system_power_switch(&self) -> Result<u32> {
        let d = self.pj.read(cmd::SYSTEM_POWER_SWITCH)?;
        Ok(u32::from(d[0]) * 100)
    }

    /// Set the limit, rounded to the nearest 100 mA
    pub fn set_system_power_switch(&self, milliamps: u32) -> Result<()> {
        if milliamps > MAX_POWER_SWITCH_MA {
            return Err(PiJuiceError::BadArgument(format!(
                "power switch limit {milliamps} mA exceeds {MAX_POWER_SWITCH_MA}"
            )));
        }
        let d = ((milliamps + 50) / 100).min(255) as u8;
        self.pj.write_verified(cmd::SYSTEM_POWER_SWITCH, &[d])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::simulated;

    #[test]
    fn test_power_off_countdown() {
        let (sim, pj) = simulated();
        let power = pj.power();
        assert_eq!(power.get_power_off().unwrap(), None);
        power.set_power_off(5).unwrap();
        assert_eq!(power.get_power_off().unwrap(), Some(5));
        power.cancel_power_off().unwrap();
        assert_eq!(sim.register(cmd::POWER_OFF), Some(vec![0xFF]));
        assert_eq!(
            power.set_power_off(255).unwrap_err().kind(),
            ErrorKind::BadArgument
        );
    }

    #[test]
    fn test_wakeup_on_charge() {
        let (sim, pj) = simulated();
        let power = pj.power();
        assert_eq!(
            power.get_wakeup_on_charge().unwrap(),
            Stored::new(WakeOnCharge::Level(24), true)
        );

        sim.set_register(cmd::WAKEUP_ON_CHARGE, &[0x7F]);
        assert_eq!(
            power.get_wakeup_on_charge().unwrap(),
            Stored::new(WakeOnCharge::Disabled, false)
        );

        power.set_wakeup_on_charge(WakeOnCharge::Level(5), false).unwrap();
        assert_eq!(sim.register(cmd::WAKEUP_ON_CHARGE), Some(vec![5]));
        power.set_wakeup_on_charge(WakeOnCharge::Disabled, true).unwrap();
        assert_eq!(sim.register(cmd::WAKEUP_ON_CHARGE), Some(vec![0xFF]));
        assert_eq!(
            power
                .set_wakeup_on_charge(WakeOnCharge::Level(101), false)
                .unwrap_err()
                .kind(),
            ErrorKind::BadArgument
        );
    }

    #[test]
    fn test_wake_on_charge_parse() {
        assert_eq!("disabled".parse::<WakeOnCharge>().unwrap(), WakeOnCharge::Disabled);
        assert_eq!("50".parse::<WakeOnCharge>().unwrap(), WakeOnCharge::Level(50));
        assert!("DISABLED0".parse::<WakeOnCharge>().is_err());
        assert!("101".parse::<WakeOnCharge>().is_err());
        assert_eq!(
            serde_json::to_string(&WakeOnCharge::Level(24)).unwrap(),
            "24"
        );
    }

    #[test]
    fn test_watchdog_encoding() {
        assert_eq!(watchdog_to_raw(15, false).unwrap(), 15);
        assert_eq!(watchdog_to_raw(0x4000, false).unwrap(), 0x5000);
        assert_eq!(watchdog_to_raw(0x4003, true).unwrap(), 0xD000);
        assert_eq!(watchdog_to_raw(65535, false).unwrap(), 0x7FFF);
        assert!(watchdog_to_raw(65536, false).is_err());

        assert_eq!(watchdog_from_raw(0x5000), Stored::new(0x4000, false));
        assert_eq!(watchdog_from_raw(0x800F), Stored::new(15, true));
    }

    #[test]
    fn test_watchdog_on_device() {
        let (sim, pj) = simulated();
        let power = pj.power();
        assert_eq!(power.get_watchdog().unwrap(), Stored::new(0, false));
        power.set_watchdog(0x4000, false).unwrap();
        assert_eq!(sim.register(cmd::WATCHDOG_ACTIVATION), Some(vec![0x00, 0x50]));
        assert_eq!(power.get_watchdog().unwrap().value, 0x4000);
        power.set_watchdog(15, true).unwrap();
        assert_eq!(power.get_watchdog().unwrap(), Stored::new(15, true));
    }

    #[test]
    fn test_system_power_switch() {
        let (sim, pj) = simulated();
        let power = pj.power();
        assert_eq!(power.get_system_power_switch().unwrap(), 0);
        power.set_system_power_switch(1).unwrap();
        assert_eq!(sim.register(cmd::SYSTEM_POWER_SWITCH), Some(vec![0]));
        power.set_system_power_switch(2150).unwrap();
        assert_eq!(power.get_system_power_switch().unwrap(), 2200);
        power.set_system_power_switch(MAX_POWER_SWITCH_MA).unwrap();
        assert_eq!(sim.register(cmd::SYSTEM_POWER_SWITCH), Some(vec![255]));
        assert_eq!(
            power.set_system_power_switch(25_501).unwrap_err().kind(),
            ErrorKind::BadArgument
        );
    }
}
