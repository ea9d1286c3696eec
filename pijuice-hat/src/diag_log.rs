//! Diagnostic event log kept by HAT firmware 1.6 and later
//!
//! The log is a ring of fixed-size entries behind the LOGGING register. A
//! write of `[0x00]` rewinds the device cursor and every following read
//! returns the next entry, so entries are read under one bus hold and never
//! retried individually.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use pijuice_transport::protocol::{cmd, log};
use pijuice_transport::{Exchange, TransportError};

use crate::codec::{bit, le_i16, le_u16, wire_enum};
use crate::error::PiJuiceError;
use crate::rtc::{Alarm, RtcTime};
use crate::status::Status;
use crate::{PiJuice, Result};

wire_enum! {
    /// Event classes that can be enabled in the log config mask
    pub enum LogConfigFlag (BadArgument) {
        Other = 0 => "OTHER",
        RegulatorOn = 1 => "5VREG_ON",
        RegulatorOff = 2 => "5VREG_OFF",
        Wakeup = 3 => "WAKEUP_EVT",
        Alarm = 4 => "ALARM_EVT",
        McuReset = 5 => "MCU_RESET",
    }
}

impl LogConfigFlag {
    fn mask(flags: &[Self]) -> u8 {
        flags.iter().fold(0, |mask, flag| mask | 1 << flag.raw())
    }

    fn from_mask(mask: u8) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|flag| bit!(mask, flag.raw()))
            .collect()
    }
}

mod tag {
    pub const REGULATOR_ON: u8 = 4;
    pub const REGULATOR_OFF: u8 = 5;
    pub const WAKEUP: u8 = 6;
    pub const ALARM: u8 = 7;
    pub const MCU_RESET: u8 = 8;
    pub const ALARM_WRITE: u8 = 10;
}

/// ADC samples per regulator entry and channel
const SAMPLES: usize = 10;
/// mV per regulator ADC count
const SAMPLE_MV: u16 = 20;

/// Battery state of charge from a log byte (0.4 % per count)
fn soc_percent(raw: u8) -> f32 {
    f32::from(raw) * 0.4
}

/// Power state captured with reset, wake-up and alarm-write events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerSnapshot {
    pub event_flags: u8,
    pub status: Status,
    pub regulator_on: bool,
    pub power_flags: u8,
    pub wake_on_charge: u8,
    pub charge_percent: f32,
    pub battery_temperature: i8,
    pub battery_mv: u16,
    pub gpio_5v_mv: u16,
    pub gpio_5v_ma: i16,
}

impl PowerSnapshot {
    fn decode(d: &[u8]) -> Self {
        Self {
            event_flags: d[10],
            status: Status::from_byte(d[11]),
            regulator_on: bit!(d[12], 0),
            power_flags: d[12],
            wake_on_charge: d[13],
            charge_percent: soc_percent(d[15]),
            battery_temperature: d[16] as i8,
            battery_mv: le_u16(d, 17),
            gpio_5v_mv: le_u16(d, 19),
            gpio_5v_ma: le_i16(d, 21),
        }
    }
}

impl fmt::Display for PowerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flags=0x{:02X} status=0x{:02X} reg={} soc={:.1}% temp={}°C bat={}mV 5V={}mV/{}mA",
            self.event_flags,
            self.status.to_byte(),
            if self.regulator_on { "on" } else { "off" },
            self.charge_percent,
            self.battery_temperature,
            self.battery_mv,
            self.gpio_5v_mv,
            self.gpio_5v_ma
        )
    }
}

/// Event-specific payload of a log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum LogEvent {
    #[serde(rename = "5VREG_ON")]
    RegulatorOn {
        reason: u8,
        battery_mv: Vec<u16>,
        gpio_5v_mv: Vec<u16>,
    },
    #[serde(rename = "5VREG_OFF")]
    RegulatorOff {
        reason: u8,
        battery_mv: Vec<u16>,
        current_raw: Vec<u8>,
    },
    #[serde(rename = "WAKEUP_EVT")]
    Wakeup(PowerSnapshot),
    #[serde(rename = "ALARM_EVT")]
    Alarm {
        rtc_control: [u8; 2],
        status: Status,
        charge_percent: f32,
        /// Logged unsigned by the firmware
        battery_temperature: u8,
        battery_mv: u16,
        /// `None` when the logged alarm registers are not valid BCD
        alarm: Option<Alarm>,
        alarm_raw: [u8; 9],
    },
    #[serde(rename = "MCU_RESET")]
    McuReset(PowerSnapshot),
    #[serde(rename = "ALARM_WRITE")]
    AlarmWrite(PowerSnapshot),
    #[serde(rename = "OTHER")]
    Other { tag: u8, data: Vec<u8> },
}

impl LogEvent {
    fn decode(d: &[u8]) -> Result<Self> {
        let samples = |from: usize| {
            d[from..from + SAMPLES]
                .iter()
                .map(|s| u16::from(*s) * SAMPLE_MV)
                .collect::<Vec<_>>()
        };
        Ok(match d[1] {
            tag::REGULATOR_ON => Self::RegulatorOn {
                reason: d[10],
                battery_mv: samples(11),
                gpio_5v_mv: samples(21),
            },
            tag::REGULATOR_OFF => Self::RegulatorOff {
                reason: d[10],
                battery_mv: samples(11),
                current_raw: d[21..21 + SAMPLES].to_vec(),
            },
            tag::WAKEUP => Self::Wakeup(PowerSnapshot::decode(d)),
            tag::ALARM => Self::decode_alarm(d),
            tag::MCU_RESET => Self::McuReset(PowerSnapshot::decode(d)),
            tag::ALARM_WRITE => Self::AlarmWrite(PowerSnapshot::decode(d)),
            other => Self::Other {
                tag: other,
                data: d[10..].to_vec(),
            },
        })
    }

    // d12 is unused by the firmware
    fn decode_alarm(d: &[u8]) -> Self {
        let mut alarm_raw = [0u8; 9];
        alarm_raw.copy_from_slice(&d[18..27]);
        let alarm = match Alarm::decode(&alarm_raw) {
            Ok(alarm) => Some(alarm),
            Err(e) => {
                debug!("ALARM_EVT #{} alarm snapshot kept raw: {}", d[0], e.read_from(cmd::LOGGING));
                None
            }
        };
        Self::Alarm {
            rtc_control: [d[10], d[11]],
            status: Status::from_byte(d[13]),
            charge_percent: soc_percent(d[14]),
            battery_temperature: d[15],
            battery_mv: le_u16(d, 16),
            alarm,
            alarm_raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RegulatorOn { .. } => "5VREG_ON",
            Self::RegulatorOff { .. } => "5VREG_OFF",
            Self::Wakeup(_) => "WAKEUP_EVT",
            Self::Alarm { .. } => "ALARM_EVT",
            Self::McuReset(_) => "MCU_RESET",
            Self::AlarmWrite(_) => "ALARM_WRITE",
            Self::Other { .. } => "OTHER",
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Self::RegulatorOn {
                reason,
                battery_mv,
                gpio_5v_mv,
            } => write!(f, " reason=0x{reason:02X} bat={battery_mv:?}mV 5V={gpio_5v_mv:?}mV"),
            Self::RegulatorOff {
                reason,
                battery_mv,
                current_raw,
            } => write!(f, " reason=0x{reason:02X} bat={battery_mv:?}mV cur={current_raw:?}"),
            Self::Wakeup(snapshot) | Self::McuReset(snapshot) | Self::AlarmWrite(snapshot) => {
                write!(f, " {snapshot}")
            }
            Self::Alarm {
                rtc_control,
                status,
                charge_percent,
                battery_temperature,
                battery_mv,
                alarm,
                alarm_raw,
            } => {
                write!(
                    f,
                    " ctrl={:02X}{:02X} status=0x{:02X} soc={:.1}% temp={}°C bat={}mV",
                    rtc_control[0],
                    rtc_control[1],
                    status.to_byte(),
                    charge_percent,
                    battery_temperature,
                    battery_mv
                )?;
                match alarm {
                    Some(alarm) => write!(f, " alarm=[{alarm}]"),
                    None => write!(f, " alarm={alarm_raw:02X?}"),
                }
            }
            Self::Other { tag, .. } => write!(f, "({tag})"),
        }
    }
}

/// One decoded log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub index: u8,
    pub timestamp: RtcTime,
    #[serde(flatten)]
    pub event: LogEvent,
}

impl LogEntry {
    pub fn decode(d: &[u8]) -> Result<Self> {
        if d.len() != log::ENTRY_DATA_LEN {
            return Err(PiJuiceError::unknown_data(
                cmd::LOGGING,
                format!("entry of {} bytes", d.len()),
            ));
        }
        // Timestamp uses the RTC layout minus the trailing flags byte
        let mut rtc = [0u8; 9];
        rtc[..8].copy_from_slice(&d[2..10]);
        Ok(Self {
            index: d[0],
            timestamp: RtcTime::decode(&rtc).map_err(|e| e.read_from(cmd::LOGGING))?,
            event: LogEvent::decode(d)?,
        })
    }

    fn is_sentinel(d: &[u8]) -> bool {
        d.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02} {} {}", self.index, self.timestamp, self.event)
    }
}

/// Reader and configuration of the diagnostic log
pub struct DiagLog<'a> {
    pj: &'a PiJuice,
}

impl<'a> DiagLog<'a> {
    pub(crate) fn new(pj: &'a PiJuice) -> Self {
        Self { pj }
    }

    fn supported(&self) -> Result<bool> {
        let firmware = self.pj.firmware_version()?;
        if firmware.at_least(1, 6) {
            Ok(true)
        } else {
            warn!("Diagnostic log needs firmware 1.6, HAT runs {}", firmware);
            Ok(false)
        }
    }

    /// Read all entries, oldest first
    ///
    /// Stops at the first empty entry or after a full ring. Entries that fail
    /// their checksum or do not decode are skipped.
    pub fn read_entries(&self) -> Result<Vec<LogEntry>> {
        if !self.supported()? {
            return Ok(Vec::new());
        }
        let entries = self.pj.transport().transaction(|tx| -> Result<_> {
            tx.send(cmd::LOGGING, &[log::LOG_READ])?;
            tx.settle();
            let mut entries = Vec::new();
            for slot in 0..log::CAPACITY {
                let d = match tx.query_once(cmd::LOGGING, log::ENTRY_DATA_LEN) {
                    Ok(d) => d,
                    Err(TransportError::ChecksumMismatch { .. }) => {
                        warn!("Log slot {} failed its checksum, skipped", slot);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                if LogEntry::is_sentinel(&d) {
                    break;
                }
                match LogEntry::decode(&d) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Log slot {} skipped: {}", slot, e),
                }
            }
            Ok(entries)
        })?;
        debug!("Read {} diagnostic log entries", entries.len());
        Ok(entries)
    }

    /// Enabled event classes
    pub fn get_config(&self) -> Result<Vec<LogConfigFlag>> {
        if !self.supported()? {
            return Ok(Vec::new());
        }
        let mask = self.pj.transport().transaction(read_config)?;
        Ok(LogConfigFlag::from_mask(mask))
    }

    /// Replace the set of enabled event classes
    pub fn set_config(&self, flags: &[LogConfigFlag]) -> Result<()> {
        if !self.supported()? {
            return Err(PiJuiceError::BadArgument(
                "diagnostic log needs firmware 1.6".into(),
            ));
        }
        let mask = LogConfigFlag::mask(flags) & log::CONFIG_MASK;
        self.pj.transport().transaction(|tx| -> Result<()> {
            tx.send(cmd::LOGGING, &[log::LOG_SET_CONFIG, mask])?;
            tx.settle();
            let readback = read_config(tx)?;
            if readback & 0x3F != mask {
                warn!("LOGGING config read-back 0x{:02X}, wrote 0x{:02X}", readback, mask);
                return Err(PiJuiceError::WriteFailed {
                    register: cmd::LOGGING,
                });
            }
            Ok(())
        })?;
        info!("Diagnostic log config set to 0x{:02X}", mask);
        Ok(())
    }
}

fn read_config(tx: &Exchange<'_>) -> Result<u8> {
    tx.send(cmd::LOGGING, &[log::LOG_GET_CONFIG])?;
    tx.settle();
    let d = tx.query_once(cmd::LOGGING, log::ENTRY_DATA_LEN)?;
    if d[1] != 0 || d[2] != 1 {
        return Err(PiJuiceError::unknown_data(
            cmd::LOGGING,
            format!("config response {:02x?}", &d[..4]),
        ));
    }
    Ok(d[3])
}
