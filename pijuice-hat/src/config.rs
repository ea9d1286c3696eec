//! Config group: persisted settings, battery profiles, LED/button/IO setup
//!
//! Most setters here write the new value and read it back. Settings that
//! share a byte with another field (temperature sense and SoC estimation)
//! go through a read-modify-write under one bus hold.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tracing::{debug, info};
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use pijuice_transport::protocol::{cmd, magic};

use crate::codec::{bit, duty_from_raw, duty_to_raw, le_u16, wire_enum};
use crate::error::{ErrorKind, PiJuiceError};
use crate::status::{Button, IoPin, Led, Rgb};
use crate::{PiJuice, Result, Stored};

// ============================================================================
// Firmware
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub variant: u8,
}

impl FirmwareVersion {
    pub fn from_bytes(d: &[u8]) -> Self {
        Self {
            major: d[0] >> 4,
            minor: d[0] & 0x0F,
            variant: d[1],
        }
    }

    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ============================================================================
// Battery profiles
// ============================================================================

const PROFILES_V14: &[&str] = &[
    "PJZERO_1000",
    "BP7X_1820",
    "SNN5843_2300",
    "PJLIPO_12000",
    "PJLIPO_5000",
    "PJBP7X_1600",
    "PJSNN5843_1300",
    "PJZERO_1200",
    "BP6X_1400",
    "PJLIPO_600",
    "PJLIPO_500",
    "PJLIPO_2500",
];

const PROFILES_V13: &[&str] = &[
    "BP6X_1400",
    "BP7X_1820",
    "SNN5843_2300",
    "PJLIPO_12000",
    "PJLIPO_5000",
    "PJBP7X_1600",
    "PJSNN5843_1300",
    "PJZERO_1200",
    "PJZERO_1000",
    "PJLIPO_600",
    "PJLIPO_500",
];

const PROFILES_LEGACY: &[&str] = &["BP6X", "BP7X", "SNN5843", "LIPO8047109"];

/// Selector value that loads the firmware default profile
pub const PROFILE_DEFAULT: &str = "DEFAULT";
/// Selector value that activates the custom profile
pub const PROFILE_CUSTOM: &str = "CUSTOM";

/// Predefined profile names known to a firmware version, by index
pub fn profile_names(firmware: FirmwareVersion) -> &'static [&'static str] {
    if firmware.at_least(1, 4) {
        PROFILES_V14
    } else if firmware.at_least(1, 3) {
        PROFILES_V13
    } else {
        PROFILES_LEGACY
    }
}

wire_enum! {
    pub enum ProfileValidity (BadArgument) {
        Valid = 0 => "VALID",
        Invalid = 1 => "INVALID",
        DataWriteNotCompleted = 0xF0 => "DATA_WRITE_NOT_COMPLETED",
    }
}

wire_enum! {
    pub enum ProfileSource (BadArgument) {
        Host = 0 => "HOST",
        DipSwitch = 1 => "DIP_SWITCH",
        Resistor = 2 => "RESISTOR",
        Unknown = 3 => "UNKNOWN",
    }
}

wire_enum! {
    pub enum ProfileOrigin (BadArgument) {
        Predefined = 0 => "PREDEFINED",
        Custom = 1 => "CUSTOM",
    }
}

/// Decoded BATTERY_PROFILE_ID register
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatteryProfileStatus {
    pub validity: ProfileValidity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ProfileSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ProfileOrigin>,
    /// Profile name, `CUSTOM`, or `UNKNOWN` for an index outside the list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl BatteryProfileStatus {
    pub fn decode(id: u8, names: &[&str]) -> Self {
        if id == 0xF0 {
            return Self {
                validity: ProfileValidity::DataWriteNotCompleted,
                source: None,
                origin: None,
                profile: None,
            };
        }
        let index = id & 0x0F;
        let origin = if index == 0x0F {
            ProfileOrigin::Custom
        } else {
            ProfileOrigin::Predefined
        };
        let profile = match origin {
            ProfileOrigin::Custom => PROFILE_CUSTOM,
            ProfileOrigin::Predefined => names.get(usize::from(index)).copied().unwrap_or("UNKNOWN"),
        };
        Self {
            validity: if bit!(id, 6) {
                ProfileValidity::Invalid
            } else {
                ProfileValidity::Valid
            },
            source: Some(ProfileSource::ALL[usize::from((id >> 4) & 0x03)]),
            origin: Some(origin),
            profile: Some(profile.to_string()),
        }
    }
}

/// Wire image of BATTERY_PROFILE
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RawBatteryProfile {
    capacity: U16,
    charge_current: u8,
    termination_current: u8,
    regulation_voltage: u8,
    cutoff_voltage: u8,
    temp_cold: i8,
    temp_cool: i8,
    temp_warm: i8,
    temp_hot: i8,
    ntc_b: U16,
    ntc_resistance: U16,
}

/// Charging parameters of a battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryProfile {
    /// mAh; `u32::MAX` means unspecified
    pub capacity: u32,
    /// mA
    pub charge_current: u16,
    /// mA
    pub termination_current: u16,
    /// mV
    pub regulation_voltage: u16,
    /// mV
    pub cutoff_voltage: u16,
    pub temp_cold: i8,
    pub temp_cool: i8,
    pub temp_warm: i8,
    pub temp_hot: i8,
    pub ntc_b: u16,
    /// Ω
    pub ntc_resistance: u32,
}

impl BatteryProfile {
    /// Decode a 14-byte profile; an all-zero image means no valid profile
    pub fn decode(d: &[u8]) -> Result<Option<Self>> {
        if d.iter().all(|b| *b == 0) {
            return Ok(None);
        }
        let raw = RawBatteryProfile::read_from_bytes(d).map_err(|_| {
            PiJuiceError::unknown_data(cmd::BATTERY_PROFILE, format!("{} bytes", d.len()))
        })?;
        let capacity = match raw.capacity.get() {
            0xFFFF => u32::MAX,
            c if c & 0x8000 != 0 => u32::from(c & 0x7FFF) << 7,
            c => u32::from(c),
        };
        Ok(Some(Self {
            capacity,
            charge_current: u16::from(raw.charge_current) * 75 + 550,
            termination_current: u16::from(raw.termination_current) * 50 + 50,
            regulation_voltage: u16::from(raw.regulation_voltage) * 20 + 3500,
            cutoff_voltage: u16::from(raw.cutoff_voltage) * 20,
            temp_cold: raw.temp_cold,
            temp_cool: raw.temp_cool,
            temp_warm: raw.temp_warm,
            temp_hot: raw.temp_hot,
            ntc_b: raw.ntc_b.get(),
            ntc_resistance: u32::from(raw.ntc_resistance.get()) * 10,
        }))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let capacity = match self.capacity {
            u32::MAX => 0xFFFF,
            c if c <= 0x7FFF => c as u16,
            c if c >> 7 <= 0x7FFF => ((c >> 7) as u16) | 0x8000,
            c => return Err(PiJuiceError::BadArgument(format!("capacity {c} mAh"))),
        };
        let ntc_resistance = u16::try_from(self.ntc_resistance / 10)
            .map_err(|_| PiJuiceError::BadArgument(format!("ntc resistance {}", self.ntc_resistance)))?;
        let raw = RawBatteryProfile {
            capacity: U16::new(capacity),
            charge_current: scaled("charge current", self.charge_current, 550, 75)?,
            termination_current: scaled("termination current", self.termination_current, 50, 50)?,
            regulation_voltage: scaled("regulation voltage", self.regulation_voltage, 3500, 20)?,
            cutoff_voltage: scaled("cutoff voltage", self.cutoff_voltage, 0, 20)?,
            temp_cold: self.temp_cold,
            temp_cool: self.temp_cool,
            temp_warm: self.temp_warm,
            temp_hot: self.temp_hot,
            ntc_b: U16::new(self.ntc_b),
            ntc_resistance: U16::new(ntc_resistance),
        };
        Ok(raw.as_bytes().to_vec())
    }
}

/// `(value - offset) / step` as a register byte
fn scaled(field: &str, value: u16, offset: u16, step: u16) -> Result<u8> {
    value
        .checked_sub(offset)
        .and_then(|v| u8::try_from(v / step).ok())
        .ok_or_else(|| PiJuiceError::BadArgument(format!("{field} {value} out of range")))
}

wire_enum! {
    pub enum BatteryChemistry (BadArgument) {
        LiPo = 0 => "LIPO",
        LiFePo4 = 1 => "LIFEPO4",
        Unknown = 0xFF => "UNKNOWN",
    }
}

/// Wire image of BATTERY_EXT_PROFILE
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RawBatteryExtProfile {
    chemistry: u8,
    ocv10: U16,
    ocv50: U16,
    ocv90: U16,
    r10: U16,
    r50: U16,
    r90: U16,
    reserved: [u8; 4],
}

/// Open-circuit voltages and internal resistance at 10/50/90 % charge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryExtProfile {
    pub chemistry: BatteryChemistry,
    /// mV
    pub ocv10: u16,
    pub ocv50: u16,
    pub ocv90: u16,
    /// mΩ
    pub r10: f32,
    pub r50: f32,
    pub r90: f32,
}

impl BatteryExtProfile {
    pub fn decode(d: &[u8]) -> Result<Option<Self>> {
        if d.iter().all(|b| *b == 0) {
            return Ok(None);
        }
        let raw = RawBatteryExtProfile::read_from_bytes(d).map_err(|_| {
            PiJuiceError::unknown_data(cmd::BATTERY_EXT_PROFILE, format!("{} bytes", d.len()))
        })?;
        let milliohm = |v: U16| f32::from(v.get()) / 100.0;
        Ok(Some(Self {
            chemistry: BatteryChemistry::from_raw(raw.chemistry).unwrap_or(BatteryChemistry::Unknown),
            ocv10: raw.ocv10.get(),
            ocv50: raw.ocv50.get(),
            ocv90: raw.ocv90.get(),
            r10: milliohm(raw.r10),
            r50: milliohm(raw.r50),
            r90: milliohm(raw.r90),
        }))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.chemistry == BatteryChemistry::Unknown {
            return Err(PiJuiceError::BadArgument("chemistry must be LIPO or LIFEPO4".into()));
        }
        let resistance = |r: f32| {
            let v = (r * 100.0).round();
            if (0.0..=f32::from(u16::MAX)).contains(&v) {
                Ok(U16::new(v as u16))
            } else {
                Err(PiJuiceError::BadArgument(format!("resistance {r} mΩ")))
            }
        };
        let raw = RawBatteryExtProfile {
            chemistry: self.chemistry.raw(),
            ocv10: U16::new(self.ocv10),
            ocv50: U16::new(self.ocv50),
            ocv90: U16::new(self.ocv90),
            r10: resistance(self.r10)?,
            r50: resistance(self.r50)?,
            r90: resistance(self.r90)?,
            reserved: [0xFF; 4],
        };
        Ok(raw.as_bytes().to_vec())
    }
}

wire_enum! {
    /// Battery temperature source, bits 0-2 of BATTERY_TEMP_SENSE_CONFIG
    pub enum TempSense (BadArgument) {
        NotUsed = 0 => "NOT_USED",
        Ntc = 1 => "NTC",
        OnBoard = 2 => "ON_BOARD",
        AutoDetect = 3 => "AUTO_DETECT",
    }
}

wire_enum! {
    /// State-of-charge estimation, bits 4-5 of BATTERY_TEMP_SENSE_CONFIG
    pub enum RsocEstimation (BadArgument) {
        AutoDetect = 0 => "AUTO_DETECT",
        DirectByMcu = 1 => "DIRECT_BY_MCU",
    }
}

// ============================================================================
// Power inputs, run pin, regulator
// ============================================================================

wire_enum! {
    pub enum PowerSourcePrecedence (BadArgument) {
        UsbMicro = 0 => "USB_MICRO",
        Gpio5v = 1 => "5V_GPIO",
    }
}

wire_enum! {
    pub enum UsbMicroCurrentLimit (InvalidUsbMicroCurrentLimit) {
        Limit1500mA = 0 => "1.5A",
        Limit2500mA = 1 => "2.5A",
    }
}

/// USB micro dynamic power management trip point, 4.20 V + 0.08 V per step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbMicroDpm(u8);

impl UsbMicroDpm {
    pub const STEPS: u8 = 8;

    pub fn from_step(step: u8) -> Option<Self> {
        (step < Self::STEPS).then_some(Self(step))
    }

    pub fn step(self) -> u8 {
        self.0
    }

    pub fn millivolts(self) -> u16 {
        4200 + u16::from(self.0) * 80
    }
}

impl fmt::Display for UsbMicroDpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cv = self.millivolts() / 10;
        write!(f, "{}.{:02}V", cv / 100, cv % 100)
    }
}

impl FromStr for UsbMicroDpm {
    type Err = PiJuiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        (0..Self::STEPS)
            .map(Self)
            .find(|dpm| dpm.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PiJuiceError::invalid(ErrorKind::InvalidUsbMicroDpm, format!("{s} is not a trip point"))
            })
    }
}

impl Serialize for UsbMicroDpm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerInputsConfig {
    pub precedence: PowerSourcePrecedence,
    pub gpio_in_enabled: bool,
    pub no_battery_turn_on: bool,
    pub usb_micro_current_limit: UsbMicroCurrentLimit,
    pub usb_micro_dpm: UsbMicroDpm,
}

impl PowerInputsConfig {
    pub fn from_byte(d: u8) -> Stored<Self> {
        let config = Self {
            precedence: PowerSourcePrecedence::ALL[usize::from(d & 0x01)],
            gpio_in_enabled: bit!(d, 1),
            no_battery_turn_on: bit!(d, 2),
            usb_micro_current_limit: UsbMicroCurrentLimit::ALL[usize::from((d >> 3) & 0x01)],
            usb_micro_dpm: UsbMicroDpm((d >> 4) & 0x07),
        };
        Stored::new(config, bit!(d, 7))
    }

    pub fn to_byte(&self, non_volatile: bool) -> u8 {
        self.precedence.raw()
            | u8::from(self.gpio_in_enabled) << 1
            | u8::from(self.no_battery_turn_on) << 2
            | self.usb_micro_current_limit.raw() << 3
            | self.usb_micro_dpm.step() << 4
            | u8::from(non_volatile) << 7
    }
}

wire_enum! {
    pub enum RunPinConfig (BadArgument) {
        NotInstalled = 0 => "NOT_INSTALLED",
        Installed = 1 => "INSTALLED",
    }
}

wire_enum! {
    pub enum PowerRegulatorMode (BadArgument) {
        PowerSourceDetection = 0 => "POWER_SOURCE_DETECTION",
        Ldo = 1 => "LDO",
        Dcdc = 2 => "DCDC",
    }
}

// ============================================================================
// LEDs and buttons
// ============================================================================

wire_enum! {
    pub enum LedFunction (BadArgument) {
        NotUsed = 0 => "NOT_USED",
        ChargeStatus = 1 => "CHARGE_STATUS",
        OnOffStatus = 2 => "ON_OFF_STATUS",
        UserLed = 3 => "USER_LED",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedConfig {
    pub function: LedFunction,
    #[serde(rename = "parameter")]
    pub color: Rgb,
}

impl LedConfig {
    fn decode(register: u8, d: &[u8]) -> Result<Self> {
        let function = LedFunction::from_raw(d[0])
            .ok_or_else(|| PiJuiceError::unknown_config(register, format!("LED function {}", d[0])))?;
        Ok(Self {
            function,
            color: Rgb::new(d[1], d[2], d[3]),
        })
    }

    fn encode(&self) -> [u8; 4] {
        [self.function.raw(), self.color.r, self.color.g, self.color.b]
    }
}

/// Action bound to a button event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonFunction {
    NoFunc,
    HardPowerOn,
    HardPowerOff,
    HardReset,
    SysHalt,
    SysHaltPowerOff,
    SysOffHalt,
    SysReboot,
    UserEvent,
    /// USER_FUNC1 ..= USER_FUNC15
    User(u8),
    Unknown,
}

impl ButtonFunction {
    pub fn from_raw(value: u8) -> Self {
        match value {
            0x00 | 0x10 => Self::NoFunc,
            0x01 => Self::HardPowerOn,
            0x02 => Self::HardPowerOff,
            0x03 => Self::HardReset,
            0x11 => Self::SysHalt,
            0x12 => Self::SysHaltPowerOff,
            0x13 => Self::SysOffHalt,
            0x14 => Self::SysReboot,
            0x20 => Self::UserEvent,
            0x21..=0x2F => Self::User(value & 0x0F),
            _ => Self::Unknown,
        }
    }

    pub fn raw(self) -> Option<u8> {
        Some(match self {
            Self::NoFunc => 0x00,
            Self::HardPowerOn => 0x01,
            Self::HardPowerOff => 0x02,
            Self::HardReset => 0x03,
            Self::SysHalt => 0x11,
            Self::SysHaltPowerOff => 0x12,
            Self::SysOffHalt => 0x13,
            Self::SysReboot => 0x14,
            Self::UserEvent => 0x20,
            Self::User(n @ 1..=15) => 0x20 | n,
            Self::User(_) | Self::Unknown => return None,
        })
    }

    /// Every assignable function in table order
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::NoFunc,
            Self::HardPowerOn,
            Self::HardPowerOff,
            Self::HardReset,
            Self::SysHalt,
            Self::SysHaltPowerOff,
            Self::SysOffHalt,
            Self::SysReboot,
            Self::UserEvent,
        ]
        .into_iter()
        .chain((1..=15).map(Self::User))
    }
}

impl fmt::Display for ButtonFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFunc => f.write_str("NO_FUNC"),
            Self::HardPowerOn => f.write_str("HARD_FUNC_POWER_ON"),
            Self::HardPowerOff => f.write_str("HARD_FUNC_POWER_OFF"),
            Self::HardReset => f.write_str("HARD_FUNC_RESET"),
            Self::SysHalt => f.write_str("SYS_FUNC_HALT"),
            Self::SysHaltPowerOff => f.write_str("SYS_FUNC_HALT_POW_OFF"),
            Self::SysOffHalt => f.write_str("SYS_FUNC_SYS_OFF_HALT"),
            Self::SysReboot => f.write_str("SYS_FUNC_REBOOT"),
            Self::UserEvent => f.write_str("USER_EVENT"),
            Self::User(n) => write!(f, "USER_FUNC{n}"),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

impl FromStr for ButtonFunction {
    type Err = PiJuiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .find(|func| func.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PiJuiceError::BadArgument(format!("unknown button function {s}")))
    }
}

impl Serialize for ButtonFunction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonAction {
    pub function: ButtonFunction,
    /// Event-specific timing in ms, in 100 ms steps
    pub parameter: u16,
}

impl ButtonAction {
    pub const fn new(function: ButtonFunction, parameter: u16) -> Self {
        Self {
            function,
            parameter,
        }
    }

    fn decode(d: &[u8]) -> Self {
        Self::new(ButtonFunction::from_raw(d[0]), u16::from(d[1]) * 100)
    }

    fn encode(&self) -> Result<[u8; 2]> {
        let function = self.function.raw().ok_or_else(|| {
            PiJuiceError::BadArgument(format!("{} cannot be assigned", self.function))
        })?;
        let parameter = u8::try_from(self.parameter / 100).map_err(|_| {
            PiJuiceError::BadArgument(format!("button parameter {} ms", self.parameter))
        })?;
        Ok([function, parameter])
    }
}

/// Actions for the six events of one button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ButtonConfig {
    pub press: ButtonAction,
    pub release: ButtonAction,
    pub single_press: ButtonAction,
    pub double_press: ButtonAction,
    pub long_press1: ButtonAction,
    pub long_press2: ButtonAction,
}

impl ButtonConfig {
    pub fn decode(d: &[u8]) -> Self {
        Self {
            press: ButtonAction::decode(&d[0..2]),
            release: ButtonAction::decode(&d[2..4]),
            single_press: ButtonAction::decode(&d[4..6]),
            double_press: ButtonAction::decode(&d[6..8]),
            long_press1: ButtonAction::decode(&d[8..10]),
            long_press2: ButtonAction::decode(&d[10..12]),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(12);
        for action in [
            &self.press,
            &self.release,
            &self.single_press,
            &self.double_press,
            &self.long_press1,
            &self.long_press2,
        ] {
            out.extend(action.encode()?);
        }
        Ok(out)
    }
}

// ============================================================================
// IO pin configuration
// ============================================================================

wire_enum! {
    /// IO pin mode; the value is the IO1 code, IO2 has no ANALOG_IN
    pub enum IoMode (InvalidMode) {
        NotUsed = 0 => "NOT_USED",
        AnalogIn = 1 => "ANALOG_IN",
        DigitalIn = 2 => "DIGITAL_IN",
        DigitalOutPushPull = 3 => "DIGITAL_OUT_PUSHPULL",
        DigitalIoOpenDrain = 4 => "DIGITAL_IO_OPEN_DRAIN",
        PwmOutPushPull = 5 => "PWM_OUT_PUSHPULL",
        PwmOutOpenDrain = 6 => "PWM_OUT_OPEN_DRAIN",
    }
}

impl IoMode {
    fn from_code(pin: IoPin, code: u8) -> Option<Self> {
        match (pin, code) {
            (IoPin::Io1, _) | (IoPin::Io2, 0) => Self::from_raw(code),
            (IoPin::Io2, 1..=5) => Self::from_raw(code + 1),
            (IoPin::Io2, _) => None,
        }
    }

    fn code(self, pin: IoPin) -> Result<u8> {
        match (pin, self) {
            (IoPin::Io2, Self::AnalogIn) => Err(PiJuiceError::invalid(
                ErrorKind::InvalidMode,
                "IO2 has no analog input",
            )),
            (IoPin::Io2, Self::NotUsed) | (IoPin::Io1, _) => Ok(self.raw()),
            (IoPin::Io2, mode) => Ok(mode.raw() - 1),
        }
    }

    pub fn is_digital_out(self) -> bool {
        matches!(self, Self::DigitalOutPushPull | Self::DigitalIoOpenDrain)
    }

    pub fn is_pwm(self) -> bool {
        matches!(self, Self::PwmOutPushPull | Self::PwmOutOpenDrain)
    }
}

wire_enum! {
    pub enum IoPull (InvalidPull) {
        NoPull = 0 => "NOPULL",
        PullDown = 1 => "PULLDOWN",
        PullUp = 2 => "PULLUP",
    }
}

wire_enum! {
    pub enum IoWakeup (BadArgument) {
        NoWakeup = 0 => "NO_WAKEUP",
        FallingEdge = 1 => "FALLING_EDGE",
        RisingEdge = 2 => "RISING_EDGE",
    }
}

/// Mode-specific part of an IO configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IoParameter {
    Wakeup {
        wakeup: IoWakeup,
    },
    Value {
        value: u8,
    },
    Pwm {
        #[serde(rename = "period")]
        period_us: u32,
        duty_cycle: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IoConfig {
    pub mode: IoMode,
    pub pull: IoPull,
    #[serde(flatten)]
    pub parameter: IoParameter,
}

impl IoConfig {
    /// Shortest PWM period in µs
    pub const MIN_PERIOD_US: u32 = 2;
    /// Longest PWM period in µs
    pub const MAX_PERIOD_US: u32 = 131_072;

    pub fn decode(pin: IoPin, d: &[u8]) -> Result<Stored<Self>> {
        let register = pin.register(cmd::IO_CONFIGURATION);
        let mode = IoMode::from_code(pin, d[0] & 0x0F)
            .ok_or_else(|| PiJuiceError::unknown_config(register, format!("mode {}", d[0] & 0x0F)))?;
        let pull = IoPull::from_raw((d[0] >> 4) & 0x03)
            .ok_or_else(|| PiJuiceError::unknown_config(register, format!("pull {}", (d[0] >> 4) & 0x03)))?;
        let parameter = if mode.is_digital_out() {
            IoParameter::Value { value: d[1] }
        } else if mode.is_pwm() {
            IoParameter::Pwm {
                period_us: (u32::from(le_u16(d, 1)) + 1) * 2,
                duty_cycle: duty_from_raw(le_u16(d, 3)),
            }
        } else {
            let wakeup = IoWakeup::from_raw(d[1] & 0x03)
                .ok_or_else(|| PiJuiceError::unknown_config(register, format!("wakeup {}", d[1] & 0x03)))?;
            IoParameter::Wakeup { wakeup }
        };
        Ok(Stored::new(
            Self {
                mode,
                pull,
                parameter,
            },
            bit!(d[0], 7),
        ))
    }

    pub fn encode(&self, pin: IoPin, non_volatile: bool) -> Result<Vec<u8>> {
        let mut d = vec![0u8; 5];
        d[0] = self.mode.code(pin)? | self.pull.raw() << 4 | u8::from(non_volatile) << 7;
        match (self.parameter, self.mode) {
            (IoParameter::Value { value }, mode) if mode.is_digital_out() => d[1] = value,
            (IoParameter::Pwm { period_us, duty_cycle }, mode) if mode.is_pwm() => {
                if !(Self::MIN_PERIOD_US..=Self::MAX_PERIOD_US).contains(&period_us) {
                    return Err(PiJuiceError::invalid(
                        ErrorKind::InvalidPeriod,
                        format!("PWM period {period_us} µs"),
                    ));
                }
                if !(0.0..=100.0).contains(&duty_cycle) {
                    return Err(PiJuiceError::invalid(
                        ErrorKind::InvalidConfig,
                        format!("PWM duty cycle {duty_cycle}"),
                    ));
                }
                let period = ((period_us / 2 - 1) as u16).to_le_bytes();
                let duty = duty_to_raw(duty_cycle).to_le_bytes();
                d[1..3].copy_from_slice(&period);
                d[3..5].copy_from_slice(&duty);
            }
            (IoParameter::Wakeup { wakeup }, mode) if !mode.is_digital_out() && !mode.is_pwm() => {
                d[1] = wakeup.raw();
            }
            (parameter, mode) => {
                return Err(PiJuiceError::invalid(
                    ErrorKind::InvalidConfig,
                    format!("{parameter:?} does not apply to {mode}"),
                ))
            }
        }
        Ok(d)
    }
}

// ============================================================================
// Command group
// ============================================================================

/// Config command group
pub struct ConfigCommands<'a> {
    pj: &'a PiJuice,
}

impl<'a> ConfigCommands<'a> {
    pub(crate) fn new(pj: &'a PiJuice) -> Self {
        Self { pj }
    }

    // === Charging and battery ===

    pub fn get_charging_config(&self) -> Result<Stored<bool>> {
        let d = self.pj.read(cmd::CHARGING_CONFIG)?;
        Ok(Stored::new(bit!(d[0], 0), bit!(d[0], 7)))
    }

    pub fn set_charging_config(&self, enabled: bool, non_volatile: bool) -> Result<()> {
        let d = u8::from(enabled) | u8::from(non_volatile) << 7;
        self.pj.write_verified(cmd::CHARGING_CONFIG, &[d])
    }

    pub fn get_battery_profile_status(&self) -> Result<BatteryProfileStatus> {
        let firmware = self.pj.firmware_version()?;
        let d = self.pj.read(cmd::BATTERY_PROFILE_ID)?;
        Ok(BatteryProfileStatus::decode(d[0], profile_names(firmware)))
    }

    /// Select `DEFAULT`, `CUSTOM` or a predefined profile by name
    pub fn set_battery_profile(&self, name: &str) -> Result<()> {
        let known = [PROFILES_V14, PROFILES_V13, PROFILES_LEGACY]
            .iter()
            .any(|list| list.contains(&name));
        let id = match name {
            PROFILE_DEFAULT => 0xFF,
            PROFILE_CUSTOM => 0x0F,
            _ if !known => {
                return Err(PiJuiceError::BadArgument(format!("unknown battery profile {name}")))
            }
            _ => {
                let firmware = self.pj.firmware_version()?;
                let index = profile_names(firmware)
                    .iter()
                    .position(|p| *p == name)
                    .ok_or_else(|| {
                        PiJuiceError::BadArgument(format!("{name} is not supported by firmware {firmware}"))
                    })?;
                index as u8
            }
        };
        info!("Selecting battery profile {} (0x{:02X})", name, id);
        self.pj.write(cmd::BATTERY_PROFILE_ID, &[id])
    }

    /// Active profile parameters; `None` when the device holds no valid profile
    pub fn get_battery_profile(&self) -> Result<Option<BatteryProfile>> {
        BatteryProfile::decode(&self.pj.read(cmd::BATTERY_PROFILE)?)
    }

    pub fn set_custom_battery_profile(&self, profile: &BatteryProfile) -> Result<()> {
        let payload = profile.encode()?;
        self.pj.write_verified(cmd::BATTERY_PROFILE, &payload)
    }

    pub fn get_battery_ext_profile(&self) -> Result<Option<BatteryExtProfile>> {
        BatteryExtProfile::decode(&self.pj.read(cmd::BATTERY_EXT_PROFILE)?)
    }

    pub fn set_custom_battery_ext_profile(&self, profile: &BatteryExtProfile) -> Result<()> {
        let payload = profile.encode()?;
        self.pj.write_verified(cmd::BATTERY_EXT_PROFILE, &payload)
    }

    pub fn get_battery_temp_sense(&self) -> Result<TempSense> {
        let d = self.pj.read(cmd::BATTERY_TEMP_SENSE_CONFIG)?;
        TempSense::from_raw(d[0] & 0x07).ok_or_else(|| {
            PiJuiceError::unknown_data(cmd::BATTERY_TEMP_SENSE_CONFIG, format!("temp sense {}", d[0] & 0x07))
        })
    }

    pub fn set_battery_temp_sense(&self, sense: TempSense) -> Result<()> {
        self.pj.modify_verified(cmd::BATTERY_TEMP_SENSE_CONFIG, |d| {
            let updated = (d[0] & !0x07) | sense.raw();
            Ok((updated != d[0]).then(|| vec![updated]))
        })
    }

    pub fn get_rsoc_estimation(&self) -> Result<RsocEstimation> {
        let d = self.pj.read(cmd::BATTERY_TEMP_SENSE_CONFIG)?;
        let raw = (d[0] >> 4) & 0x03;
        RsocEstimation::from_raw(raw).ok_or_else(|| {
            PiJuiceError::unknown_data(cmd::BATTERY_TEMP_SENSE_CONFIG, format!("rsoc estimation {raw}"))
        })
    }

    pub fn set_rsoc_estimation(&self, estimation: RsocEstimation) -> Result<()> {
        self.pj.modify_verified(cmd::BATTERY_TEMP_SENSE_CONFIG, |d| {
            let updated = (d[0] & !0x30) | estimation.raw() << 4;
            Ok((updated != d[0]).then(|| vec![updated]))
        })
    }

    // === Power inputs, run pin, regulator ===

    pub fn get_power_inputs_config(&self) -> Result<Stored<PowerInputsConfig>> {
        let d = self.pj.read(cmd::POWER_INPUTS_CONFIG)?;
        Ok(PowerInputsConfig::from_byte(d[0]))
    }

    pub fn set_power_inputs_config(&self, config: &PowerInputsConfig, non_volatile: bool) -> Result<()> {
        self.pj
            .write_verified(cmd::POWER_INPUTS_CONFIG, &[config.to_byte(non_volatile)])
    }

    pub fn get_run_pin_config(&self) -> Result<RunPinConfig> {
        let d = self.pj.read(cmd::RUN_PIN_CONFIG)?;
        RunPinConfig::from_raw(d[0])
            .ok_or_else(|| PiJuiceError::unknown_data(cmd::RUN_PIN_CONFIG, format!("run pin {}", d[0])))
    }

    pub fn set_run_pin_config(&self, config: RunPinConfig) -> Result<()> {
        self.pj.write_verified(cmd::RUN_PIN_CONFIG, &[config.raw()])
    }

    pub fn get_power_regulator_mode(&self) -> Result<PowerRegulatorMode> {
        let d = self.pj.read(cmd::POWER_REGULATOR_CONFIG)?;
        PowerRegulatorMode::from_raw(d[0]).ok_or_else(|| {
            PiJuiceError::unknown_data(cmd::POWER_REGULATOR_CONFIG, format!("regulator mode {}", d[0]))
        })
    }

    pub fn set_power_regulator_mode(&self, mode: PowerRegulatorMode) -> Result<()> {
        self.pj.write_verified(cmd::POWER_REGULATOR_CONFIG, &[mode.raw()])
    }

    // === LEDs, buttons, IO ===

    pub fn get_led_config(&self, led: Led) -> Result<LedConfig> {
        let register = cmd::LED_CONFIGURATION + led.raw();
        LedConfig::decode(register, &self.pj.read(register)?)
    }

    pub fn set_led_config(&self, led: Led, config: &LedConfig) -> Result<()> {
        self.pj
            .write_verified(cmd::LED_CONFIGURATION + led.raw(), &config.encode())
    }

    pub fn get_button_config(&self, button: Button) -> Result<ButtonConfig> {
        let d = self.pj.read(cmd::BUTTON_CONFIGURATION + button.raw())?;
        Ok(ButtonConfig::decode(&d))
    }

    pub fn set_button_config(&self, button: Button, config: &ButtonConfig) -> Result<()> {
        let payload = config.encode()?;
        self.pj
            .write_verified(cmd::BUTTON_CONFIGURATION + button.raw(), &payload)
    }

    pub fn get_io_config(&self, pin: IoPin) -> Result<Stored<IoConfig>> {
        let d = self.pj.read(pin.register(cmd::IO_CONFIGURATION))?;
        IoConfig::decode(pin, &d)
    }

    pub fn set_io_config(&self, pin: IoPin, config: &IoConfig, non_volatile: bool) -> Result<()> {
        let payload = config.encode(pin, non_volatile)?;
        self.pj
            .write_verified(pin.register(cmd::IO_CONFIGURATION), &payload)
    }

    // === Addresses and ID EEPROM ===

    /// Bus address of slave 1 (HAT) or 2 (RTC)
    pub fn get_address(&self, slave: u8) -> Result<u8> {
        let register = address_register(slave)?;
        Ok(self.pj.read(register)?[0])
    }

    pub fn set_address(&self, slave: u8, address: u8) -> Result<()> {
        let register = address_register(slave)?;
        if address > 0x7F {
            return Err(PiJuiceError::BadArgument(format!(
                "0x{address:02X} is not a 7-bit address"
            )));
        }
        self.pj.write_verified(register, &[address])
    }

    pub fn get_id_eeprom_write_protect(&self) -> Result<bool> {
        Ok(self.pj.read(cmd::ID_EEPROM_WRITE_PROTECT)?[0] == 1)
    }

    pub fn set_id_eeprom_write_protect(&self, protect: bool) -> Result<()> {
        self.pj
            .write_verified(cmd::ID_EEPROM_WRITE_PROTECT, &[u8::from(protect)])
    }

    pub fn get_id_eeprom_address(&self) -> Result<u8> {
        Ok(self.pj.read(cmd::ID_EEPROM_ADDRESS)?[0])
    }

    pub fn set_id_eeprom_address(&self, address: u8) -> Result<()> {
        if !matches!(address, 0x50 | 0x52) {
            return Err(PiJuiceError::BadArgument(format!(
                "ID EEPROM address must be 0x50 or 0x52, got 0x{address:02X}"
            )));
        }
        self.pj.write_verified(cmd::ID_EEPROM_ADDRESS, &[address])
    }

    // === Maintenance ===

    /// Restore factory settings
    pub fn reset_to_default(&self) -> Result<()> {
        info!("Resetting HAT configuration to defaults");
        self.pj.write(cmd::RESET_TO_DEFAULT, &magic::RESET_TO_DEFAULT)?;
        self.pj.invalidate_firmware_cache();
        Ok(())
    }

    pub fn run_test_calibration(&self) -> Result<()> {
        info!("Starting test calibration");
        self.pj
            .write(cmd::RUN_TEST_CALIBRATION, &magic::RUN_TEST_CALIBRATION)
    }

    /// Read the firmware version; [`PiJuice::firmware_version`] caches this
    pub fn get_firmware_version(&self) -> Result<FirmwareVersion> {
        let d = self.pj.read(cmd::FIRMWARE_VERSION)?;
        let version = FirmwareVersion::from_bytes(&d);
        debug!("FIRMWARE_VERSION {:02x?} -> {}", d, version);
        Ok(version)
    }
}

fn address_register(slave: u8) -> Result<u8> {
    match slave {
        1 | 2 => Ok(cmd::I2C_ADDRESS + slave - 1),
        _ => Err(PiJuiceError::BadArgument(format!("no slave {slave}, expected 1 or 2"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::simulated;

    #[test]
    fn test_firmware_version_decode() {
        let fw = FirmwareVersion::from_bytes(&[0x16, 0x00]);
        assert_eq!(fw.to_string(), "1.6");
        assert!(fw.at_least(1, 4));
        assert!(!fw.at_least(1, 7));
        assert!(!FirmwareVersion::from_bytes(&[0x13, 0]).at_least(1, 4));
    }

    #[test]
    fn test_profile_status_decode() {
        let status = BatteryProfileStatus::decode(0x01, PROFILES_V14);
        assert_eq!(status.validity, ProfileValidity::Valid);
        assert_eq!(status.source, Some(ProfileSource::Host));
        assert_eq!(status.origin, Some(ProfileOrigin::Predefined));
        assert_eq!(status.profile.as_deref(), Some("BP7X_1820"));

        let status = BatteryProfileStatus::decode(0x0E, PROFILES_V14);
        assert_eq!(status.profile.as_deref(), Some("UNKNOWN"));

        let status = BatteryProfileStatus::decode(0xF0, PROFILES_V14);
        assert_eq!(status.validity, ProfileValidity::DataWriteNotCompleted);
        assert_eq!(status.profile, None);

        let status = BatteryProfileStatus::decode(0x5F, PROFILES_V14);
        assert_eq!(status.validity, ProfileValidity::Invalid);
        assert_eq!(status.source, Some(ProfileSource::DipSwitch));
        assert_eq!(status.origin, Some(ProfileOrigin::Custom));
        assert_eq!(status.profile.as_deref(), Some("CUSTOM"));

        assert_eq!(
            BatteryProfileStatus::decode(0x00, PROFILES_V13).profile.as_deref(),
            Some("BP6X_1400")
        );
    }

    #[test]
    fn test_battery_profile_decode() {
        let d = [28, 7, 5, 0, 34, 150, 1, 10, 45, 59, 52, 13, 232, 3];
        let profile = BatteryProfile::decode(&d).unwrap().unwrap();
        assert_eq!(profile.capacity, 1820);
        assert_eq!(profile.charge_current, 925);
        assert_eq!(profile.termination_current, 50);
        assert_eq!(profile.regulation_voltage, 4180);
        assert_eq!(profile.cutoff_voltage, 3000);
        assert_eq!(
            (profile.temp_cold, profile.temp_cool, profile.temp_warm, profile.temp_hot),
            (1, 10, 45, 59)
        );
        assert_eq!(profile.ntc_b, 3380);
        assert_eq!(profile.ntc_resistance, 10000);
        assert_eq!(profile.encode().unwrap(), d.to_vec());

        assert_eq!(BatteryProfile::decode(&[0; 14]).unwrap(), None);
    }

    #[test]
    fn test_battery_profile_capacity_scaling() {
        let d = [28, 7, 5, 0, 34, 150, 1, 10, 45, 59, 52, 13, 232, 3];
        let mut profile = BatteryProfile::decode(&d).unwrap().unwrap();

        profile.capacity = u32::MAX;
        assert_eq!(&profile.encode().unwrap()[..2], &[0xFF, 0xFF]);

        profile.capacity = 12_000 << 3;
        let bytes = profile.encode().unwrap();
        assert_eq!(BatteryProfile::decode(&bytes).unwrap().unwrap().capacity, 12_000 << 3);

        profile.capacity = 1820;
        profile.charge_current = 500;
        assert_eq!(profile.encode().unwrap_err().kind(), ErrorKind::BadArgument);
    }

    #[test]
    fn test_battery_ext_profile_decode() {
        let d = [
            0, 65, 14, 216, 14, 237, 15, 164, 81, 20, 80, 232, 78, 255, 255, 255, 255,
        ];
        let ext = BatteryExtProfile::decode(&d).unwrap().unwrap();
        assert_eq!(ext.chemistry, BatteryChemistry::LiPo);
        assert_eq!((ext.ocv10, ext.ocv50, ext.ocv90), (3649, 3800, 4077));
        assert_eq!((ext.r10, ext.r50, ext.r90), (209.0, 205.0, 202.0));
        assert_eq!(ext.encode().unwrap(), d.to_vec());

        let mut unknown = d;
        unknown[0] = 2;
        let ext = BatteryExtProfile::decode(&unknown).unwrap().unwrap();
        assert_eq!(ext.chemistry, BatteryChemistry::Unknown);
        assert_eq!(ext.encode().unwrap_err().kind(), ErrorKind::BadArgument);

        assert_eq!(BatteryExtProfile::decode(&[0; 17]).unwrap(), None);
    }

    #[test]
    fn test_power_inputs_decode() {
        let stored = PowerInputsConfig::from_byte(0x0B);
        let config = stored.value;
        assert!(!stored.non_volatile);
        assert_eq!(config.precedence, PowerSourcePrecedence::Gpio5v);
        assert!(config.gpio_in_enabled);
        assert!(!config.no_battery_turn_on);
        assert_eq!(config.usb_micro_current_limit, UsbMicroCurrentLimit::Limit2500mA);
        assert_eq!(config.usb_micro_dpm.to_string(), "4.20V");
        assert_eq!(config.to_byte(false), 0x0B);
        assert_eq!(config.to_byte(true), 0x8B);
    }

    #[test]
    fn test_usb_micro_parsing() {
        assert_eq!("4.76V".parse::<UsbMicroDpm>().unwrap().step(), 7);
        assert_eq!("4.28v".parse::<UsbMicroDpm>().unwrap().step(), 1);
        assert_eq!(
            "1.1V".parse::<UsbMicroDpm>().unwrap_err().kind(),
            ErrorKind::InvalidUsbMicroDpm
        );
        assert_eq!(
            "3A".parse::<UsbMicroCurrentLimit>().unwrap_err().kind(),
            ErrorKind::InvalidUsbMicroCurrentLimit
        );
        assert_eq!(
            "1.5A".parse::<UsbMicroCurrentLimit>().unwrap(),
            UsbMicroCurrentLimit::Limit1500mA
        );
    }

    #[test]
    fn test_button_function_table() {
        assert_eq!(ButtonFunction::from_raw(0x01), ButtonFunction::HardPowerOn);
        assert_eq!(ButtonFunction::from_raw(0x11), ButtonFunction::SysHalt);
        assert_eq!(ButtonFunction::from_raw(0x21).to_string(), "USER_FUNC1");
        assert_eq!(ButtonFunction::from_raw(0x2F).to_string(), "USER_FUNC15");
        assert_eq!(ButtonFunction::from_raw(0x1F), ButtonFunction::Unknown);
        assert_eq!(ButtonFunction::from_raw(0xF0), ButtonFunction::Unknown);
        for func in ButtonFunction::all() {
            let raw = func.raw().unwrap();
            assert_eq!(ButtonFunction::from_raw(raw), func);
            assert_eq!(func.to_string().parse::<ButtonFunction>().unwrap(), func);
        }
        assert!("USER_FUNC16".parse::<ButtonFunction>().is_err());
    }

    #[test]
    fn test_button_config_decode() {
        let d = [0, 0, 0, 0, 1, 8, 0, 0, 17, 100, 2, 200];
        let config = ButtonConfig::decode(&d);
        assert_eq!(config.press, ButtonAction::new(ButtonFunction::NoFunc, 0));
        assert_eq!(
            config.single_press,
            ButtonAction::new(ButtonFunction::HardPowerOn, 800)
        );
        assert_eq!(
            config.long_press1,
            ButtonAction::new(ButtonFunction::SysHalt, 10000)
        );
        assert_eq!(
            config.long_press2,
            ButtonAction::new(ButtonFunction::HardPowerOff, 20000)
        );
        assert_eq!(config.encode().unwrap(), d.to_vec());

        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["LONG_PRESS1"]["function"], "SYS_FUNC_HALT");
        assert_eq!(json["SINGLE_PRESS"]["parameter"], 800);
    }

    #[test]
    fn test_io_config_decode() {
        let d = [128, 53, 170, 178, 201];
        let stored = IoConfig::decode(IoPin::Io1, &d).unwrap();
        assert!(stored.non_volatile);
        assert_eq!(stored.value.mode, IoMode::NotUsed);
        assert_eq!(stored.value.pull, IoPull::NoPull);
        assert_eq!(
            stored.value.parameter,
            IoParameter::Wakeup {
                wakeup: IoWakeup::FallingEdge
            }
        );

        let pwm = IoConfig::decode(IoPin::Io1, &[0x05, 53, 170, 178, 201]).unwrap().value;
        assert_eq!(pwm.mode, IoMode::PwmOutPushPull);
        assert_eq!(
            pwm.parameter,
            IoParameter::Pwm {
                period_us: 87148,
                duty_cycle: 78.0
            }
        );

        let out = IoConfig::decode(IoPin::Io1, &[0x03, 53, 170, 178, 201]).unwrap().value;
        assert_eq!(out.parameter, IoParameter::Value { value: 53 });

        let err = IoConfig::decode(IoPin::Io1, &[0x07, 53, 0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownConfig);
        let err = IoConfig::decode(IoPin::Io1, &[0x30, 53, 0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownConfig);
    }

    #[test]
    fn test_io2_mode_table_shifts() {
        let config = IoConfig::decode(IoPin::Io2, &[0x01, 0, 0, 0, 0]).unwrap().value;
        assert_eq!(config.mode, IoMode::DigitalIn);
        let config = IoConfig::decode(IoPin::Io2, &[0x04, 0x0F, 0, 0xFF, 0xFF]).unwrap().value;
        assert_eq!(config.mode, IoMode::PwmOutPushPull);
        assert_eq!(
            config.encode(IoPin::Io2, false).unwrap(),
            vec![0x04, 0x0F, 0, 0xFF, 0xFF]
        );
        assert!(IoConfig::decode(IoPin::Io2, &[0x06, 0, 0, 0, 0]).is_err());

        let analog = IoConfig {
            mode: IoMode::AnalogIn,
            pull: IoPull::NoPull,
            parameter: IoParameter::Wakeup {
                wakeup: IoWakeup::NoWakeup,
            },
        };
        assert_eq!(
            analog.encode(IoPin::Io2, false).unwrap_err().kind(),
            ErrorKind::InvalidMode
        );
        assert_eq!(analog.encode(IoPin::Io1, false).unwrap(), vec![1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_io_config_encode_validation() {
        let pwm = |period_us, duty_cycle| IoConfig {
            mode: IoMode::PwmOutPushPull,
            pull: IoPull::NoPull,
            parameter: IoParameter::Pwm {
                period_us,
                duty_cycle,
            },
        };
        assert_eq!(
            pwm(87148, 78.0).encode(IoPin::Io1, false).unwrap(),
            vec![0x05, 53, 170, 0xAD, 0xC7]
        );
        assert_eq!(
            pwm(1, 50.0).encode(IoPin::Io1, false).unwrap_err().kind(),
            ErrorKind::InvalidPeriod
        );
        assert_eq!(
            pwm(87148, -1.0).encode(IoPin::Io1, false).unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        let mismatched = IoConfig {
            mode: IoMode::DigitalIn,
            pull: IoPull::PullUp,
            parameter: IoParameter::Value { value: 1 },
        };
        assert_eq!(
            mismatched.encode(IoPin::Io1, false).unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        assert_eq!("pushpull".parse::<IoMode>().unwrap_err().kind(), ErrorKind::InvalidMode);
        assert_eq!("UP".parse::<IoPull>().unwrap_err().kind(), ErrorKind::InvalidPull);
    }

    #[test]
    fn test_device_config_reads() {
        let (sim, pj) = simulated();
        let config = pj.config();
        assert_eq!(config.get_charging_config().unwrap(), Stored::new(true, false));
        assert_eq!(
            config.get_battery_profile_status().unwrap().profile.as_deref(),
            Some("BP7X_1820")
        );
        assert_eq!(config.get_battery_temp_sense().unwrap(), TempSense::OnBoard);
        assert_eq!(config.get_rsoc_estimation().unwrap(), RsocEstimation::AutoDetect);
        assert_eq!(config.get_run_pin_config().unwrap(), RunPinConfig::NotInstalled);
        assert_eq!(
            config.get_power_regulator_mode().unwrap(),
            PowerRegulatorMode::PowerSourceDetection
        );
        let led = config.get_led_config(Led::D1).unwrap();
        assert_eq!(led.function, LedFunction::ChargeStatus);
        assert_eq!(led.color, Rgb::new(60, 60, 100));
        assert_eq!(config.get_address(1).unwrap(), 0x14);
        assert_eq!(config.get_address(2).unwrap(), 0x68);
        assert!(config.get_id_eeprom_write_protect().unwrap());
        assert_eq!(config.get_id_eeprom_address().unwrap(), 0x50);

        sim.set_register(cmd::BATTERY_TEMP_SENSE_CONFIG, &[0x04]);
        assert_eq!(
            config.get_battery_temp_sense().unwrap_err().kind(),
            ErrorKind::UnknownData
        );
        sim.set_register(cmd::BATTERY_TEMP_SENSE_CONFIG, &[0x20]);
        assert_eq!(
            config.get_rsoc_estimation().unwrap_err().kind(),
            ErrorKind::UnknownData
        );
        sim.set_register(cmd::LED_CONFIGURATION, &[0x05, 0, 0, 0]);
        assert_eq!(
            config.get_led_config(Led::D1).unwrap_err().kind(),
            ErrorKind::UnknownConfig
        );
        sim.set_register(cmd::POWER_REGULATOR_CONFIG, &[0x05]);
        assert_eq!(
            config.get_power_regulator_mode().unwrap_err().kind(),
            ErrorKind::UnknownData
        );
    }

    #[test]
    fn test_shared_byte_setters_preserve_other_field() {
        let (sim, pj) = simulated();
        sim.set_register(cmd::BATTERY_TEMP_SENSE_CONFIG, &[0x12]);
        pj.config().set_battery_temp_sense(TempSense::Ntc).unwrap();
        assert_eq!(sim.register(cmd::BATTERY_TEMP_SENSE_CONFIG), Some(vec![0x11]));
        pj.config()
            .set_rsoc_estimation(RsocEstimation::AutoDetect)
            .unwrap();
        assert_eq!(sim.register(cmd::BATTERY_TEMP_SENSE_CONFIG), Some(vec![0x01]));

        let writes = sim.write_count();
        pj.config().set_battery_temp_sense(TempSense::Ntc).unwrap();
        assert_eq!(sim.write_count(), writes);
    }

    #[test]
    fn test_set_battery_profile() {
        let (sim, pj) = simulated();
        let config = pj.config();
        config.set_battery_profile("PJLIPO_2500").unwrap();
        assert_eq!(sim.register(cmd::BATTERY_PROFILE_ID), Some(vec![11]));
        config.set_battery_profile(PROFILE_DEFAULT).unwrap();
        assert_eq!(sim.register(cmd::BATTERY_PROFILE_ID), Some(vec![0xFF]));
        config.set_battery_profile(PROFILE_CUSTOM).unwrap();
        assert_eq!(sim.register(cmd::BATTERY_PROFILE_ID), Some(vec![0x0F]));

        let reads = sim.read_count();
        let err = config.set_battery_profile("wrong_profile").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
        assert_eq!(sim.read_count(), reads);

        // Legacy names are unknown to 1.6 firmware
        let err = config.set_battery_profile("LIPO8047109").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
    }

    #[test]
    fn test_verified_config_writes() {
        let (sim, pj) = simulated();
        let config = pj.config();
        let profile = config.get_battery_profile().unwrap().unwrap();
        config.set_custom_battery_profile(&profile).unwrap();
        let ext = config.get_battery_ext_profile().unwrap().unwrap();
        config.set_custom_battery_ext_profile(&ext).unwrap();

        let io = IoConfig {
            mode: IoMode::DigitalOutPushPull,
            pull: IoPull::NoPull,
            parameter: IoParameter::Value { value: 1 },
        };
        config.set_io_config(IoPin::Io1, &io, true).unwrap();
        let stored = config.get_io_config(IoPin::Io1).unwrap();
        assert!(stored.non_volatile);
        assert_eq!(stored.value, io);

        let buttons = config.get_button_config(Button::Sw2).unwrap();
        assert_eq!(buttons.single_press.function, ButtonFunction::User(1));
        config.set_button_config(Button::Sw2, &buttons).unwrap();

        sim.freeze_register(cmd::RUN_PIN_CONFIG);
        let err = config.set_run_pin_config(RunPinConfig::Installed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailed);
    }

    #[test]
    fn test_address_validation() {
        let (sim, pj) = simulated();
        let config = pj.config();
        assert_eq!(config.get_address(3).unwrap_err().kind(), ErrorKind::BadArgument);
        assert_eq!(
            config.set_address(1, 0x80).unwrap_err().kind(),
            ErrorKind::BadArgument
        );
        assert_eq!(
            config.set_id_eeprom_address(0x51).unwrap_err().kind(),
            ErrorKind::BadArgument
        );
        assert_eq!(sim.read_count() + sim.write_count(), 0);
        config.set_id_eeprom_address(0x52).unwrap();
        assert_eq!(config.get_id_eeprom_address().unwrap(), 0x52);
    }

    #[test]
    fn test_reset_to_default_restores_image() {
        let (sim, pj) = simulated();
        pj.config().set_run_pin_config(RunPinConfig::Installed).unwrap();
        pj.config().reset_to_default().unwrap();
        assert_eq!(sim.register(cmd::RUN_PIN_CONFIG), Some(vec![0]));
        pj.config().run_test_calibration().unwrap();
        assert_eq!(
            sim.write_log().last(),
            Some(&(cmd::RUN_TEST_CALIBRATION, magic::RUN_TEST_CALIBRATION.to_vec()))
        );
    }
}
