//! RTC group: date/time, wake-up alarm and alarm control
//!
//! All time fields are packed BCD on the wire. Decoding only rejects bytes
//! that are not valid BCD; range checks happen when encoding, so values the
//! device reports (such as the factory alarm with day 0) read back as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use pijuice_transport::protocol::cmd;

use crate::codec::{bit, from_bcd, to_bcd, wire_enum};
use crate::error::{ErrorKind, PiJuiceError};
use crate::{PiJuice, Result};

/// Largest drift between written and read-back time still counted as a match
const SET_TIME_TOLERANCE_S: i64 = 2;

fn bcd(register: u8, field: &str, byte: u8) -> Result<u8> {
    from_bcd(byte)
        .ok_or_else(|| PiJuiceError::unknown_data(register, format!("{field} 0x{byte:02X} is not BCD")))
}

fn check(ok: bool, kind: ErrorKind, detail: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(PiJuiceError::invalid(kind, detail()))
    }
}

// ============================================================================
// Hour
// ============================================================================

/// Hour in 24-hour or 12-hour notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hour {
    H24(u8),
    H12 { hour: u8, pm: bool },
}

impl Hour {
    fn decode(register: u8, d: u8) -> Result<Self> {
        if bit!(d, 6) {
            Ok(Self::H12 {
                hour: bcd(register, "hour", d & 0x1F)?,
                pm: bit!(d, 5),
            })
        } else {
            Ok(Self::H24(bcd(register, "hour", d & 0x3F)?))
        }
    }

    fn encode(self) -> Result<u8> {
        self.validate()?;
        Ok(match self {
            Self::H24(hour) => to_bcd(hour),
            Self::H12 { hour, pm } => to_bcd(hour) | 0x40 | u8::from(pm) << 5,
        })
    }

    pub fn validate(self) -> Result<()> {
        match self {
            Self::H24(hour) => check(hour <= 23, ErrorKind::InvalidHour, || {
                format!("hour {hour} is outside 0..=23")
            }),
            Self::H12 { hour, .. } => check((1..=12).contains(&hour), ErrorKind::InvalidHour, || {
                format!("hour {hour} is outside 1..=12")
            }),
        }
    }

    /// Hour of day 0..=23, `None` for an out-of-range value
    pub fn to_24h(self) -> Option<u8> {
        match self {
            Self::H24(hour) if hour <= 23 => Some(hour),
            Self::H12 { hour, pm } if (1..=12).contains(&hour) => {
                Some(hour % 12 + if pm { 12 } else { 0 })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Hour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H24(hour) => write!(f, "{hour}"),
            Self::H12 { hour, pm } => write!(f, "{hour} {}", if *pm { "PM" } else { "AM" }),
        }
    }
}

impl FromStr for Hour {
    type Err = PiJuiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || PiJuiceError::invalid(ErrorKind::InvalidHour, format!("cannot parse hour {s:?}"));
        let mut parts = s.split_whitespace();
        let number = parts.next().and_then(|n| n.parse::<u8>().ok()).ok_or_else(bad)?;
        let hour = match (parts.next(), parts.next()) {
            (None, _) => Self::H24(number),
            (Some(suffix), None) if suffix.eq_ignore_ascii_case("AM") => Self::H12 {
                hour: number,
                pm: false,
            },
            (Some(suffix), None) if suffix.eq_ignore_ascii_case("PM") => Self::H12 {
                hour: number,
                pm: true,
            },
            _ => return Err(bad()),
        };
        hour.validate()?;
        Ok(hour)
    }
}

impl Serialize for Hour {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::H24(hour) => serializer.serialize_u8(*hour),
            Self::H12 { .. } => serializer.collect_str(self),
        }
    }
}

// ============================================================================
// Time
// ============================================================================

wire_enum! {
    pub enum DaylightSaving (BadArgument) {
        Off = 0 => "NONE",
        Add1h = 1 => "ADD1H",
        Sub1h = 2 => "SUB1H",
    }
}

/// Contents of RTC_TIME
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RtcTime {
    pub second: u8,
    pub minute: u8,
    pub hour: Hour,
    /// 1 = Sunday
    pub weekday: u8,
    pub day: u8,
    pub month: u8,
    pub year: u16,
    /// Raw fraction of a second in 1/256 s
    pub subsecond: u8,
    #[serde(rename = "daylightsaving")]
    pub daylight_saving: DaylightSaving,
    #[serde(rename = "storeoperation")]
    pub store_operation: bool,
}

impl RtcTime {
    pub const MIN_YEAR: u16 = 2000;
    pub const MAX_YEAR: u16 = 2099;

    pub fn decode(d: &[u8]) -> Result<Self> {
        let reg = cmd::RTC_TIME;
        let daylight_saving = DaylightSaving::from_raw(d[8] & 0x03).ok_or_else(|| {
            PiJuiceError::unknown_data(reg, format!("daylight saving {}", d[8] & 0x03))
        })?;
        Ok(Self {
            second: bcd(reg, "second", d[0] & 0x7F)?,
            minute: bcd(reg, "minute", d[1] & 0x7F)?,
            hour: Hour::decode(reg, d[2])?,
            weekday: d[3] & 0x07,
            day: bcd(reg, "day", d[4] & 0x3F)?,
            month: bcd(reg, "month", d[5] & 0x1F)?,
            year: Self::MIN_YEAR + u16::from(bcd(reg, "year", d[6])?),
            subsecond: d[7],
            daylight_saving,
            store_operation: bit!(d[8], 2),
        })
    }

    pub fn validate(&self) -> Result<()> {
        check(self.second <= 59, ErrorKind::InvalidSecond, || {
            format!("second {}", self.second)
        })?;
        check(self.minute <= 59, ErrorKind::InvalidMinute, || {
            format!("minute {}", self.minute)
        })?;
        self.hour.validate()?;
        check((1..=7).contains(&self.weekday), ErrorKind::InvalidWeekday, || {
            format!("weekday {}", self.weekday)
        })?;
        check((1..=31).contains(&self.day), ErrorKind::InvalidDay, || {
            format!("day {}", self.day)
        })?;
        check((1..=12).contains(&self.month), ErrorKind::InvalidMonth, || {
            format!("month {}", self.month)
        })?;
        check(
            (Self::MIN_YEAR..=Self::MAX_YEAR).contains(&self.year),
            ErrorKind::InvalidYear,
            || format!("year {}", self.year),
        )
    }

    pub fn encode(&self) -> Result<[u8; 9]> {
        self.validate()?;
        Ok([
            to_bcd(self.second),
            to_bcd(self.minute),
            self.hour.encode()?,
            self.weekday,
            to_bcd(self.day),
            to_bcd(self.month),
            to_bcd((self.year - Self::MIN_YEAR) as u8),
            self.subsecond,
            self.daylight_saving.raw() | u8::from(self.store_operation) << 2,
        ])
    }

    /// RTC fields for a UTC wall-clock time, in 24-hour notation
    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        Self {
            second: dt.second().min(59) as u8,
            minute: dt.minute() as u8,
            hour: Hour::H24(dt.hour() as u8),
            weekday: dt.weekday().number_from_sunday() as u8,
            day: dt.day() as u8,
            month: dt.month() as u8,
            year: dt.year().clamp(0, i32::from(u16::MAX)) as u16,
            subsecond: (dt.nanosecond() / 3_906_250).min(255) as u8,
            daylight_saving: DaylightSaving::Off,
            store_operation: false,
        }
    }

    /// Wall-clock time, `None` when the fields do not form a valid date
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_opt(
                u32::from(self.hour.to_24h()?),
                u32::from(self.minute),
                u32::from(self.second),
            )
    }
}

impl From<DateTime<Utc>> for RtcTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_naive(&dt.naive_utc())
    }
}

impl fmt::Display for RtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Whether a read-back RTC image matches what was written, allowing the
/// clock to have ticked in between
fn time_matches(written: &[u8], readback: &[u8]) -> bool {
    if written == readback {
        return true;
    }
    let (Ok(w), Ok(r)) = (RtcTime::decode(written), RtcTime::decode(readback)) else {
        return false;
    };
    if w.daylight_saving != r.daylight_saving || w.store_operation != r.store_operation {
        return false;
    }
    match (w.to_naive(), r.to_naive()) {
        (Some(w), Some(r)) => (0..=SET_TIME_TOLERANCE_S).contains(&(r - w).num_seconds()),
        _ => false,
    }
}

// ============================================================================
// Alarm
// ============================================================================

/// Minute field of the alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMinute {
    At(u8),
    /// Fire every N minutes, 1..=60
    Every(u8),
}

/// Hour field of the alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmHour {
    At(Hour),
    /// Any set of hours of day 0..=23
    Hours(Vec<u8>),
    EveryHour,
}

impl AlarmHour {
    const EVERY_HOUR: &'static str = "EVERY_HOUR";

    fn mask(hours: &[u8]) -> Result<[u8; 3]> {
        check(!hours.is_empty(), ErrorKind::InvalidHour, || "empty hour list".into())?;
        let mut mask = 0u32;
        for &hour in hours {
            check(hour <= 23, ErrorKind::InvalidHour, || format!("hour {hour}"))?;
            mask |= 1 << hour;
        }
        let [a, b, c, _] = mask.to_le_bytes();
        Ok([a, b, c])
    }
}

impl fmt::Display for AlarmHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(hour) => write!(f, "{hour}"),
            Self::Hours(hours) => f.write_str(&join(hours)),
            Self::EveryHour => f.write_str(Self::EVERY_HOUR),
        }
    }
}

impl FromStr for AlarmHour {
    type Err = PiJuiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::EVERY_HOUR) {
            return Ok(Self::EveryHour);
        }
        if !s.contains(';') {
            return s.parse().map(Self::At);
        }
        let hours = split_list(s, ErrorKind::InvalidHour)?;
        Self::mask(&hours)?;
        Ok(Self::Hours(hours))
    }
}

impl Serialize for AlarmHour {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::At(hour) => hour.serialize(serializer),
            _ => serializer.collect_str(self),
        }
    }
}

/// Day field of the alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmDay {
    /// Day of month; 0 is the factory "unset" value
    DayOfMonth(u8),
    /// Weekday 1..=7, 1 = Sunday
    Weekday(u8),
    Weekdays(Vec<u8>),
    EveryDay,
}

impl AlarmDay {
    const EVERY_DAY: &'static str = "EVERY_DAY";

    /// Parse a weekday spec: `N`, `a;b;...` or `EVERY_DAY`
    pub fn parse_weekdays(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::EVERY_DAY) {
            return Ok(Self::EveryDay);
        }
        let days = split_list(s, ErrorKind::InvalidWeekday)?;
        for &day in &days {
            check((1..=7).contains(&day), ErrorKind::InvalidWeekday, || format!("weekday {day}"))?;
        }
        match days.as_slice() {
            [day] if !s.contains(';') => Ok(Self::Weekday(*day)),
            _ => Ok(Self::Weekdays(days)),
        }
    }

    /// Parse a day-of-month spec: `N` or `EVERY_DAY`
    pub fn parse_day(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::EVERY_DAY) {
            return Ok(Self::EveryDay);
        }
        let day = s
            .parse::<u8>()
            .map_err(|_| PiJuiceError::invalid(ErrorKind::InvalidDay, format!("cannot parse day {s:?}")))?;
        check((1..=31).contains(&day), ErrorKind::InvalidDay, || format!("day {day}"))?;
        Ok(Self::DayOfMonth(day))
    }

    /// Day byte (d3) and weekday mask (d8)
    fn encode(&self) -> Result<(u8, u8)> {
        Ok(match self {
            Self::DayOfMonth(day) => {
                check(*day <= 31, ErrorKind::InvalidDay, || format!("day {day}"))?;
                (to_bcd(*day), 0xFF)
            }
            Self::Weekday(day) => {
                check((1..=7).contains(day), ErrorKind::InvalidWeekday, || format!("weekday {day}"))?;
                (0x40 | day, 0xFF)
            }
            Self::Weekdays(days) => {
                check(!days.is_empty(), ErrorKind::InvalidWeekday, || "empty weekday list".into())?;
                let mut mask = 0u8;
                for &day in days {
                    check((1..=7).contains(&day), ErrorKind::InvalidWeekday, || format!("weekday {day}"))?;
                    mask |= 1 << day;
                }
                (0xC0, mask)
            }
            Self::EveryDay => (0x80, 0xFF),
        })
    }

    fn decode(d3: u8, d8: u8) -> Result<Self> {
        let reg = cmd::RTC_ALARM;
        if !bit!(d3, 6) {
            return if bit!(d3, 7) {
                Ok(Self::EveryDay)
            } else {
                Ok(Self::DayOfMonth(bcd(reg, "day", d3 & 0x3F)?))
            };
        }
        if !bit!(d3, 7) {
            return match d3 & 0x07 {
                0 => Err(PiJuiceError::unknown_data(reg, format!("weekday 0 in day 0x{d3:02X}"))),
                day => Ok(Self::Weekday(day)),
            };
        }
        if d8 == 0xFF {
            return Ok(Self::EveryDay);
        }
        let days: Vec<u8> = (1..=7).filter(|j| bit!(d8, *j)).collect();
        if days.is_empty() {
            return Err(PiJuiceError::unknown_data(reg, format!("weekday mask 0x{d8:02X}")));
        }
        Ok(Self::Weekdays(days))
    }

    fn is_weekday(&self) -> bool {
        matches!(self, Self::Weekday(_) | Self::Weekdays(_))
    }
}

impl fmt::Display for AlarmDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DayOfMonth(day) | Self::Weekday(day) => write!(f, "{day}"),
            Self::Weekdays(days) => f.write_str(&join(days)),
            Self::EveryDay => f.write_str(Self::EVERY_DAY),
        }
    }
}

impl Serialize for AlarmDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::DayOfMonth(day) | Self::Weekday(day) => serializer.serialize_u8(*day),
            _ => serializer.collect_str(self),
        }
    }
}

fn join(values: &[u8]) -> String {
    values
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

fn split_list(s: &str, kind: ErrorKind) -> Result<Vec<u8>> {
    s.split(';')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| PiJuiceError::invalid(kind, format!("cannot parse {part:?} in {s:?}")))
        })
        .collect()
}

/// Contents of RTC_ALARM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    /// `None` fires on every second of the matching minute
    pub second: Option<u8>,
    pub minute: AlarmMinute,
    pub hour: AlarmHour,
    pub day: AlarmDay,
}

impl Alarm {
    pub fn decode(d: &[u8]) -> Result<Self> {
        let reg = cmd::RTC_ALARM;
        let second = if bit!(d[0], 7) {
            None
        } else {
            Some(bcd(reg, "second", d[0] & 0x7F)?)
        };
        let minute = if bit!(d[1], 7) {
            AlarmMinute::Every(d[7])
        } else {
            AlarmMinute::At(bcd(reg, "minute", d[1] & 0x7F)?)
        };
        let hour = if bit!(d[2], 7) {
            let mask = u32::from_le_bytes([d[4], d[5], d[6], 0]);
            match mask {
                0x00FF_FFFF => AlarmHour::EveryHour,
                0 => return Err(PiJuiceError::unknown_data(reg, "empty hour mask")),
                _ => AlarmHour::Hours((0..24).filter(|h| mask & (1 << h) != 0).collect()),
            }
        } else {
            AlarmHour::At(Hour::decode(reg, d[2])?)
        };
        Ok(Self {
            second,
            minute,
            hour,
            day: AlarmDay::decode(d[3], d[8])?,
        })
    }

    pub fn encode(&self) -> Result<[u8; 9]> {
        let mut d = [0u8; 9];
        d[0] = match self.second {
            None => 0x80,
            Some(second) => {
                check(second <= 59, ErrorKind::InvalidSecond, || format!("second {second}"))?;
                to_bcd(second)
            }
        };
        match self.minute {
            AlarmMinute::At(minute) => {
                check(minute <= 59, ErrorKind::InvalidMinute, || format!("minute {minute}"))?;
                d[1] = to_bcd(minute);
            }
            AlarmMinute::Every(period) => {
                check((1..=60).contains(&period), ErrorKind::InvalidMinutePeriod, || {
                    format!("minute period {period}")
                })?;
                d[1] = 0x80;
                d[7] = period;
            }
        }
        let mask = match &self.hour {
            AlarmHour::At(hour) => {
                d[2] = hour.encode()?;
                [0xFF; 3]
            }
            AlarmHour::Hours(hours) => {
                d[2] = 0x80;
                AlarmHour::mask(hours)?
            }
            AlarmHour::EveryHour => {
                d[2] = 0x80;
                [0xFF; 3]
            }
        };
        d[4..7].copy_from_slice(&mask);
        (d[3], d[8]) = self.day.encode()?;
        Ok(d)
    }
}

impl Serialize for Alarm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(second) = self.second {
            map.serialize_entry("second", &second)?;
        }
        match self.minute {
            AlarmMinute::At(minute) => map.serialize_entry("minute", &minute)?,
            AlarmMinute::Every(period) => map.serialize_entry("minute_period", &period)?,
        }
        map.serialize_entry("hour", &self.hour)?;
        let day_key = if self.day.is_weekday() { "weekday" } else { "day" };
        map.serialize_entry(day_key, &self.day)?;
        map.end()
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.second {
            Some(second) => write!(f, "second {second}, ")?,
            None => f.write_str("every second, ")?,
        }
        match self.minute {
            AlarmMinute::At(minute) => write!(f, "minute {minute}, ")?,
            AlarmMinute::Every(period) => write!(f, "every {period} min, ")?,
        }
        write!(f, "hour {}, ", self.hour)?;
        if self.day.is_weekday() {
            write!(f, "weekday {}", self.day)
        } else {
            write!(f, "day {}", self.day)
        }
    }
}

/// Decoded RTC_CTRL_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlStatus {
    #[serde(rename = "alarm_wakeup_enabled")]
    pub wakeup_enabled: bool,
    pub alarm_flag: bool,
}

impl ControlStatus {
    pub fn from_bytes(d: &[u8]) -> Self {
        Self {
            wakeup_enabled: bit!(d[0], 0) && bit!(d[0], 2),
            alarm_flag: bit!(d[1], 0),
        }
    }
}

// ============================================================================
// Command group
// ============================================================================

/// RTC command group
pub struct RtcCommands<'a> {
    pj: &'a PiJuice,
}

impl<'a> RtcCommands<'a> {
    pub(crate) fn new(pj: &'a PiJuice) -> Self {
        Self { pj }
    }

    pub fn get_control_status(&self) -> Result<ControlStatus> {
        Ok(ControlStatus::from_bytes(&self.pj.read(cmd::RTC_CTRL_STATUS)?))
    }

    pub fn clear_alarm_flag(&self) -> Result<()> {
        self.pj.modify_verified(cmd::RTC_CTRL_STATUS, |d| {
            Ok(bit!(d[1], 0).then(|| vec![d[0], d[1] & !0x01]))
        })
    }

    pub fn set_wakeup_enabled(&self, enabled: bool) -> Result<()> {
        self.pj.modify_verified(cmd::RTC_CTRL_STATUS, |d| {
            let ctrl = if enabled { d[0] | 0x05 } else { d[0] & !0x01 };
            Ok((ctrl != d[0]).then(|| vec![ctrl, d[1]]))
        })
    }

    pub fn get_time(&self) -> Result<RtcTime> {
        RtcTime::decode(&self.pj.read(cmd::RTC_TIME)?)
    }

    /// Write the RTC; a read-back up to two seconds ahead still verifies
    pub fn set_time(&self, time: &RtcTime) -> Result<()> {
        let payload = time.encode()?;
        debug!("Setting RTC to {}", time);
        self.pj
            .write_verified_with(cmd::RTC_TIME, &payload, |readback| {
                time_matches(&payload, readback)
            })
    }

    /// Write the host's current UTC time
    pub fn set_time_now(&self) -> Result<RtcTime> {
        let time = RtcTime::from(Utc::now());
        self.set_time(&time)?;
        info!("RTC set to {} UTC", time);
        Ok(time)
    }

    pub fn get_alarm(&self) -> Result<Alarm> {
        Alarm::decode(&self.pj.read(cmd::RTC_ALARM)?)
    }

    pub fn set_alarm(&self, alarm: &Alarm) -> Result<()> {
        let payload = alarm.encode()?;
        self.pj.write_verified(cmd::RTC_ALARM, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::simulated;

    const FACTORY_TIME: [u8; 9] = [0x53, 0x19, 0x19, 1, 0x18, 0x12, 0x22, 240, 0];
    const FACTORY_ALARM: [u8; 9] = [0, 0, 0, 0, 255, 255, 255, 0, 255];

    fn factory_time() -> RtcTime {
        RtcTime::decode(&FACTORY_TIME).unwrap()
    }

    #[test]
    fn test_time_decode() {
        let time = factory_time();
        assert_eq!((time.second, time.minute), (53, 19));
        assert_eq!(time.hour, Hour::H24(19));
        assert_eq!((time.weekday, time.day, time.month, time.year), (1, 18, 12, 2022));
        assert_eq!(time.subsecond, 240);
        assert_eq!(time.daylight_saving, DaylightSaving::Off);
        assert!(!time.store_operation);
        assert_eq!(time.encode().unwrap(), FACTORY_TIME);
    }

    #[test]
    fn test_time_decode_flags() {
        let mut d = FACTORY_TIME;
        d[2] |= 0x40;
        assert_eq!(
            RtcTime::decode(&d).unwrap().hour,
            Hour::H12 {
                hour: 19,
                pm: false
            }
        );
        assert_eq!(Hour::H12 { hour: 19, pm: false }.to_string(), "19 AM");

        let mut d = FACTORY_TIME;
        d[8] = 0b110;
        let time = RtcTime::decode(&d).unwrap();
        assert_eq!(time.daylight_saving, DaylightSaving::Sub1h);
        assert!(time.store_operation);

        d[8] = 0b001;
        assert_eq!(RtcTime::decode(&d).unwrap().daylight_saving, DaylightSaving::Add1h);

        d[0] = 0x5A;
        assert_eq!(RtcTime::decode(&d).unwrap_err().kind(), ErrorKind::UnknownData);
    }

    #[test]
    fn test_time_json_shape() {
        let json = serde_json::to_value(factory_time()).unwrap();
        assert_eq!(json["hour"], 19);
        assert_eq!(json["daylightsaving"], "NONE");
        assert_eq!(json["storeoperation"], false);
    }

    #[test]
    fn test_hour_grammar() {
        assert_eq!("23".parse::<Hour>().unwrap(), Hour::H24(23));
        assert_eq!(
            "1 PM".parse::<Hour>().unwrap(),
            Hour::H12 { hour: 1, pm: true }
        );
        assert_eq!(
            "1 am".parse::<Hour>().unwrap(),
            Hour::H12 { hour: 1, pm: false }
        );
        for bad in ["25", "no_hours", "13 AM", "13 PM", "0 PM", "1 XM"] {
            assert_eq!(
                bad.parse::<Hour>().unwrap_err().kind(),
                ErrorKind::InvalidHour,
                "{bad}"
            );
        }
        assert_eq!(Hour::H12 { hour: 12, pm: false }.to_24h(), Some(0));
        assert_eq!(Hour::H12 { hour: 12, pm: true }.to_24h(), Some(12));
        assert_eq!(Hour::H12 { hour: 7, pm: true }.to_24h(), Some(19));
    }

    #[test]
    fn test_time_validation() {
        let base = factory_time();
        let cases: [(fn(&mut RtcTime), ErrorKind); 7] = [
            (|t| t.second = 61, ErrorKind::InvalidSecond),
            (|t| t.minute = 61, ErrorKind::InvalidMinute),
            (|t| t.hour = Hour::H24(25), ErrorKind::InvalidHour),
            (|t| t.weekday = 8, ErrorKind::InvalidWeekday),
            (|t| t.day = 32, ErrorKind::InvalidDay),
            (|t| t.month = 13, ErrorKind::InvalidMonth),
            (|t| t.year = 3000, ErrorKind::InvalidYear),
        ];
        for (mutate, kind) in cases {
            let mut time = base;
            mutate(&mut time);
            assert_eq!(time.encode().unwrap_err().kind(), kind);
        }
    }

    #[test]
    fn test_time_encode_12h() {
        let mut time = factory_time();
        time.hour = Hour::H12 { hour: 1, pm: true };
        assert_eq!(time.encode().unwrap()[2], 0x61);
        time.hour = Hour::H12 { hour: 11, pm: false };
        assert_eq!(time.encode().unwrap()[2], 0x51);
    }

    fn clock_hours(h: u8) -> [Hour; 2] {
        [
            Hour::H24(h),
            Hour::H12 {
                hour: (h + 11) % 12 + 1,
                pm: h >= 12,
            },
        ]
    }

    #[test]
    fn test_every_minute_of_day_round_trips() {
        for m in 0..1440u16 {
            let (h, minute) = ((m / 60) as u8, (m % 60) as u8);
            for hour in clock_hours(h) {
                let mut time = factory_time();
                time.hour = hour;
                time.minute = minute;
                assert_eq!(RtcTime::decode(&time.encode().unwrap()).unwrap(), time, "time {hour:?}:{minute}");

                let alarm = Alarm {
                    second: Some(0),
                    minute: AlarmMinute::At(minute),
                    hour: AlarmHour::At(hour),
                    day: AlarmDay::EveryDay,
                };
                assert_eq!(Alarm::decode(&alarm.encode().unwrap()).unwrap(), alarm, "alarm {hour:?}:{minute}");
            }
        }
    }

    #[test]
    fn test_chrono_conversion() {
        let dt = NaiveDate::from_ymd_opt(2022, 12, 18)
            .unwrap()
            .and_hms_milli_opt(19, 19, 53, 500)
            .unwrap();
        let time = RtcTime::from_naive(&dt);
        assert_eq!(time.weekday, 1);
        assert_eq!(time.subsecond, 128);
        assert_eq!(time.to_naive().unwrap(), dt.with_nanosecond(0).unwrap());
    }

    #[test]
    fn test_set_time_tolerates_clock_tick() {
        let written = factory_time().encode().unwrap();
        let mut ticked = factory_time();
        ticked.second = 55;
        assert!(time_matches(&written, &ticked.encode().unwrap()));

        // Minute carry
        let mut late = factory_time();
        late.second = 59;
        let mut carried = late;
        carried.second = 0;
        carried.minute = 20;
        assert!(time_matches(&late.encode().unwrap(), &carried.encode().unwrap()));

        ticked.second = 56;
        assert!(!time_matches(&written, &ticked.encode().unwrap()));
        ticked.second = 52;
        assert!(!time_matches(&written, &ticked.encode().unwrap()));
    }

    #[test]
    fn test_set_time_on_device() {
        let (sim, pj) = simulated();
        let rtc = pj.rtc();
        let mut time = factory_time();
        time.hour = Hour::H12 { hour: 1, pm: true };
        rtc.set_time(&time).unwrap();
        assert_eq!(rtc.get_time().unwrap(), time);

        let written = rtc.set_time_now().unwrap();
        assert_eq!(rtc.get_time().unwrap().year, written.year);

        sim.freeze_register(cmd::RTC_TIME);
        time.day = 1;
        assert_eq!(rtc.set_time(&time).unwrap_err().kind(), ErrorKind::WriteFailed);

        let writes = sim.write_count();
        time.month = 13;
        assert_eq!(rtc.set_time(&time).unwrap_err().kind(), ErrorKind::InvalidMonth);
        assert_eq!(sim.write_count(), writes);
    }

    #[test]
    fn test_factory_alarm_round_trips() {
        let alarm = Alarm::decode(&FACTORY_ALARM).unwrap();
        assert_eq!(alarm.second, Some(0));
        assert_eq!(alarm.minute, AlarmMinute::At(0));
        assert_eq!(alarm.hour, AlarmHour::At(Hour::H24(0)));
        assert_eq!(alarm.day, AlarmDay::DayOfMonth(0));
        assert_eq!(alarm.encode().unwrap(), FACTORY_ALARM);
        assert_eq!(
            serde_json::to_value(&alarm).unwrap(),
            serde_json::json!({"second": 0, "minute": 0, "hour": 0, "day": 0})
        );
    }

    #[test]
    fn test_alarm_decode_variants() {
        let mut d = FACTORY_ALARM;
        d[1] |= 0x80;
        let alarm = Alarm::decode(&d).unwrap();
        assert_eq!(alarm.minute, AlarmMinute::Every(0));
        assert_eq!(
            serde_json::to_value(&alarm).unwrap()["minute_period"],
            0
        );

        let mut d = FACTORY_ALARM;
        d[2] |= 0xC0;
        assert_eq!(Alarm::decode(&d).unwrap().hour, AlarmHour::EveryHour);

        d[4..7].copy_from_slice(&[0x00, 0x10, 0x80]);
        assert_eq!(Alarm::decode(&d).unwrap().hour, AlarmHour::Hours(vec![12, 23]));

        d[4..7].copy_from_slice(&[0, 0, 0]);
        assert_eq!(Alarm::decode(&d).unwrap_err().kind(), ErrorKind::UnknownData);
    }

    #[test]
    fn test_weekday_mask() {
        let days = AlarmDay::parse_weekdays("2;3").unwrap();
        assert_eq!(days, AlarmDay::Weekdays(vec![2, 3]));
        assert_eq!(days.encode().unwrap(), (0xC0, 0x0C));
        assert_eq!(AlarmDay::decode(0xC0, 0x0C).unwrap(), days);
        assert_eq!(AlarmDay::decode(0xC0, 0xFF).unwrap(), AlarmDay::EveryDay);
        assert_eq!(
            AlarmDay::decode(0xC0, 0x01).unwrap_err().kind(),
            ErrorKind::UnknownData
        );
        assert_eq!(AlarmDay::decode(0x45, 0xFF).unwrap(), AlarmDay::Weekday(5));
        assert_eq!(AlarmDay::decode(0x80, 0xFF).unwrap(), AlarmDay::EveryDay);
        assert_eq!(AlarmDay::decode(0x31, 0xFF).unwrap(), AlarmDay::DayOfMonth(31));

        assert_eq!(AlarmDay::parse_weekdays("4").unwrap(), AlarmDay::Weekday(4));
        assert_eq!(
            AlarmDay::parse_weekdays("every_day").unwrap(),
            AlarmDay::EveryDay
        );
        assert_eq!(
            AlarmDay::parse_weekdays("2;8").unwrap_err().kind(),
            ErrorKind::InvalidWeekday
        );
        assert_eq!(
            AlarmDay::parse_day("32").unwrap_err().kind(),
            ErrorKind::InvalidDay
        );
    }

    #[test]
    fn test_every_weekday_round_trips() {
        let mut days = vec![AlarmDay::EveryDay];
        for day in 1..=7 {
            days.push(AlarmDay::Weekday(day));
            days.push(AlarmDay::Weekdays(vec![day]));
        }
        for day in days {
            let alarm = Alarm {
                day,
                ..Alarm::decode(&FACTORY_ALARM).unwrap()
            };
            assert_eq!(Alarm::decode(&alarm.encode().unwrap()).unwrap(), alarm);
        }
    }

    #[test]
    fn test_weekday_zero_is_rejected() {
        assert_eq!(
            AlarmDay::decode(0x40, 0xFF).unwrap_err().kind(),
            ErrorKind::UnknownData
        );
        let mut d = FACTORY_ALARM;
        d[3] = 0x48;
        assert_eq!(Alarm::decode(&d).unwrap_err().kind(), ErrorKind::UnknownData);
    }

    #[test]
    fn test_hour_list_grammar() {
        assert_eq!(
            "1;5;23".parse::<AlarmHour>().unwrap(),
            AlarmHour::Hours(vec![1, 5, 23])
        );
        assert_eq!("EVERY_HOUR".parse::<AlarmHour>().unwrap(), AlarmHour::EveryHour);
        assert_eq!(
            "7 PM".parse::<AlarmHour>().unwrap(),
            AlarmHour::At(Hour::H12 { hour: 7, pm: true })
        );
        assert_eq!(
            "1;24".parse::<AlarmHour>().unwrap_err().kind(),
            ErrorKind::InvalidHour
        );
        assert_eq!(AlarmHour::Hours(vec![1, 5, 23]).to_string(), "1;5;23");
    }

    #[test]
    fn test_alarm_validation() {
        let base = Alarm::decode(&FACTORY_ALARM).unwrap();
        let mut alarm = base.clone();
        alarm.second = Some(61);
        assert_eq!(alarm.encode().unwrap_err().kind(), ErrorKind::InvalidSecond);
        let mut alarm = base.clone();
        alarm.minute = AlarmMinute::At(61);
        assert_eq!(alarm.encode().unwrap_err().kind(), ErrorKind::InvalidMinute);
        let mut alarm = base.clone();
        alarm.minute = AlarmMinute::Every(61);
        assert_eq!(alarm.encode().unwrap_err().kind(), ErrorKind::InvalidMinutePeriod);
        alarm.minute = AlarmMinute::Every(0);
        assert_eq!(alarm.encode().unwrap_err().kind(), ErrorKind::InvalidMinutePeriod);
    }

    #[test]
    fn test_alarm_encode() {
        let alarm = Alarm {
            second: None,
            minute: AlarmMinute::Every(15),
            hour: AlarmHour::Hours(vec![0, 8, 16]),
            day: AlarmDay::Weekdays(vec![2, 3]),
        };
        let d = alarm.encode().unwrap();
        assert_eq!(d, [0x80, 0x80, 0x80, 0xC0, 0x01, 0x01, 0x01, 15, 0x0C]);
        assert_eq!(Alarm::decode(&d).unwrap(), alarm);
    }

    #[test]
    fn test_set_alarm_on_device() {
        let (sim, pj) = simulated();
        let rtc = pj.rtc();
        let factory = rtc.get_alarm().unwrap();
        rtc.set_alarm(&factory).unwrap();
        assert_eq!(sim.register(cmd::RTC_ALARM), Some(FACTORY_ALARM.to_vec()));

        let alarm = Alarm {
            second: Some(30),
            minute: AlarmMinute::At(45),
            hour: AlarmHour::EveryHour,
            day: AlarmDay::EveryDay,
        };
        rtc.set_alarm(&alarm).unwrap();
        assert_eq!(rtc.get_alarm().unwrap(), alarm);
    }

    #[test]
    fn test_control_status() {
        let (sim, pj) = simulated();
        let rtc = pj.rtc();
        sim.set_register(cmd::RTC_CTRL_STATUS, &[0x05, 0x01]);
        assert_eq!(
            rtc.get_control_status().unwrap(),
            ControlStatus {
                wakeup_enabled: true,
                alarm_flag: true
            }
        );
        sim.set_register(cmd::RTC_CTRL_STATUS, &[0x01, 0x00]);
        assert!(!rtc.get_control_status().unwrap().wakeup_enabled);
    }

    #[test]
    fn test_control_status_writes_only_on_change() {
        let (sim, pj) = simulated();
        let rtc = pj.rtc();

        rtc.clear_alarm_flag().unwrap();
        assert_eq!(sim.write_count(), 0);
        sim.set_register(cmd::RTC_CTRL_STATUS, &[0x05, 0x01]);
        rtc.clear_alarm_flag().unwrap();
        assert_eq!(sim.register(cmd::RTC_CTRL_STATUS), Some(vec![0x05, 0x00]));

        let writes = sim.write_count();
        rtc.set_wakeup_enabled(true).unwrap();
        assert_eq!(sim.write_count(), writes);
        rtc.set_wakeup_enabled(false).unwrap();
        assert_eq!(sim.register(cmd::RTC_CTRL_STATUS), Some(vec![0x04, 0x00]));
        rtc.set_wakeup_enabled(true).unwrap();
        assert_eq!(sim.register(cmd::RTC_CTRL_STATUS), Some(vec![0x05, 0x00]));
    }
}
