//! Status group: telemetry, button and fault events, LEDs and IO pins

use serde::Serialize;
use tracing::debug;

use pijuice_transport::protocol::cmd;

use crate::codec::{bit, duty_from_raw, duty_to_raw, le_i16, le_u16, wire_enum};
use crate::error::{ErrorKind, PiJuiceError};
use crate::{PiJuice, Result};

wire_enum! {
    /// Battery state reported in bits 2-3 of the status byte
    pub enum BatteryState (BadArgument) {
        Normal = 0 => "NORMAL",
        ChargingFromIn = 1 => "CHARGING_FROM_IN",
        ChargingFrom5vIo = 2 => "CHARGING_FROM_5V_IO",
        NotPresent = 3 => "NOT_PRESENT",
    }
}

wire_enum! {
    /// State of one power input
    pub enum PowerInputState (BadArgument) {
        NotPresent = 0 => "NOT_PRESENT",
        Bad = 1 => "BAD",
        Weak = 2 => "WEAK",
        Present = 3 => "PRESENT",
    }
}

/// Decoded STATUS register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub is_fault: bool,
    pub is_button: bool,
    pub battery: BatteryState,
    pub power_input: PowerInputState,
    pub power_input_5v_io: PowerInputState,
}

impl Status {
    pub fn from_byte(d: u8) -> Self {
        Self {
            is_fault: bit!(d, 0),
            is_button: bit!(d, 1),
            battery: BatteryState::ALL[usize::from((d >> 2) & 0x03)],
            power_input: PowerInputState::ALL[usize::from((d >> 4) & 0x03)],
            power_input_5v_io: PowerInputState::ALL[usize::from((d >> 6) & 0x03)],
        }
    }

    pub fn to_byte(&self) -> u8 {
        u8::from(self.is_fault)
            | u8::from(self.is_button) << 1
            | self.battery.raw() << 2
            | self.power_input.raw() << 4
            | self.power_input_5v_io.raw() << 6
    }

    /// True when either input is fully present
    pub fn is_powered(&self) -> bool {
        self.power_input == PowerInputState::Present
            || self.power_input_5v_io == PowerInputState::Present
    }
}

wire_enum! {
    pub enum ChargingTemperatureFault (BadArgument) {
        Normal = 0 => "NORMAL",
        Suspend = 1 => "SUSPEND",
        Cool = 2 => "COOL",
        Warm = 3 => "WARM",
    }
}

wire_enum! {
    /// Latched fault flags; the value is the bit position in FAULT_EVENT
    pub enum FaultFlag (BadArgument) {
        ButtonPowerOff = 0 => "button_power_off",
        ForcedPowerOff = 1 => "forced_power_off",
        ForcedSysPowerOff = 2 => "forced_sys_power_off",
        WatchdogReset = 3 => "watchdog_reset",
        BatteryProfileInvalid = 5 => "battery_profile_invalid",
    }
}

impl FaultFlag {
    fn mask(self) -> u8 {
        1 << self.raw()
    }
}

/// Decoded FAULT_EVENT register
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FaultStatus {
    pub flags: Vec<FaultFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_temperature_fault: Option<ChargingTemperatureFault>,
}

impl FaultStatus {
    pub fn from_byte(d: u8) -> Self {
        let flags = FaultFlag::ALL
            .iter()
            .copied()
            .filter(|f| d & f.mask() != 0)
            .collect();
        let temp = (d >> 6) & 0x03;
        Self {
            flags,
            charging_temperature_fault: (temp != 0)
                .then(|| ChargingTemperatureFault::ALL[usize::from(temp)]),
        }
    }

    pub fn has(&self, flag: FaultFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_clear(&self) -> bool {
        self.flags.is_empty() && self.charging_temperature_fault.is_none()
    }
}

wire_enum! {
    pub enum ButtonEvent (BadArgument) {
        NoEvent = 0 => "NO_EVENT",
        Press = 1 => "PRESS",
        Release = 2 => "RELEASE",
        SinglePress = 3 => "SINGLE_PRESS",
        DoublePress = 4 => "DOUBLE_PRESS",
        LongPress1 = 5 => "LONG_PRESS1",
        LongPress2 = 6 => "LONG_PRESS2",
        Unknown = 15 => "UNKNOWN",
    }
}

impl ButtonEvent {
    fn from_nibble(nibble: u8) -> Self {
        Self::from_raw(nibble & 0x0F).unwrap_or(Self::Unknown)
    }
}

wire_enum! {
    pub enum Button (BadArgument) {
        Sw1 = 0 => "SW1",
        Sw2 = 1 => "SW2",
        Sw3 = 2 => "SW3",
    }
}

/// Pending events for all three buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonEvents {
    pub sw1: ButtonEvent,
    pub sw2: ButtonEvent,
    pub sw3: ButtonEvent,
}

impl ButtonEvents {
    pub fn from_bytes(d: &[u8]) -> Self {
        Self {
            sw1: ButtonEvent::from_nibble(d[0]),
            sw2: ButtonEvent::from_nibble(d[0] >> 4),
            sw3: ButtonEvent::from_nibble(d[1]),
        }
    }

    pub fn get(&self, button: Button) -> ButtonEvent {
        match button {
            Button::Sw1 => self.sw1,
            Button::Sw2 => self.sw2,
            Button::Sw3 => self.sw3,
        }
    }

    /// Buttons that currently report something other than NO_EVENT
    pub fn pending(&self) -> impl Iterator<Item = (Button, ButtonEvent)> + '_ {
        Button::ALL
            .iter()
            .map(|b| (*b, self.get(*b)))
            .filter(|(_, e)| *e != ButtonEvent::NoEvent)
    }
}

wire_enum! {
    pub enum Led (BadArgument) {
        D1 = 0 => "D1",
        D2 = 1 => "D2",
    }
}

wire_enum! {
    /// User-accessible IO pin on the HAT header
    pub enum IoPin (BadArgument) {
        Io1 = 1 => "IO1",
        Io2 = 2 => "IO2",
    }
}

impl IoPin {
    /// Pin by its number, 1 or 2
    pub fn from_number(number: u8) -> Result<Self> {
        Self::from_raw(number)
            .ok_or_else(|| PiJuiceError::BadArgument(format!("no IO pin {number}")))
    }

    pub(crate) fn register(self, base: u8) -> u8 {
        base + (self.raw() - 1) * 5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn from_slice(d: &[u8]) -> Self {
        Self::new(d[0], d[1], d[2])
    }

    fn bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Two-phase blink pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedBlink {
    /// Repetitions, 255 blinks until changed
    pub count: u8,
    pub rgb1: Rgb,
    pub period1_ms: u16,
    pub rgb2: Rgb,
    pub period2_ms: u16,
}

impl LedBlink {
    /// Longest period one phase can last
    pub const MAX_PERIOD_MS: u16 = 2550;

    pub fn from_bytes(d: &[u8]) -> Self {
        Self {
            count: d[0],
            rgb1: Rgb::from_slice(&d[1..4]),
            period1_ms: u16::from(d[4]) * 10,
            rgb2: Rgb::from_slice(&d[5..8]),
            period2_ms: u16::from(d[8]) * 10,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let period = |ms: u16| {
            u8::try_from(ms / 10)
                .ok()
                .filter(|_| ms <= Self::MAX_PERIOD_MS)
                .ok_or_else(|| {
                    PiJuiceError::invalid(
                        ErrorKind::InvalidPeriod,
                        format!("blink period {ms} ms exceeds {} ms", Self::MAX_PERIOD_MS),
                    )
                })
        };
        let mut out = vec![self.count];
        out.extend(self.rgb1.bytes());
        out.push(period(self.period1_ms)?);
        out.extend(self.rgb2.bytes());
        out.push(period(self.period2_ms)?);
        Ok(out)
    }
}

/// Status command group
pub struct StatusCommands<'a> {
    pj: &'a PiJuice,
}

impl<'a> StatusCommands<'a> {
    pub(crate) fn new(pj: &'a PiJuice) -> Self {
        Self { pj }
    }

    // === Status and charge ===

    pub fn get_status(&self) -> Result<Status> {
        let d = self.pj.read(cmd::STATUS)?;
        Ok(Status::from_byte(d[0]))
    }

    /// Battery charge in percent
    pub fn get_charge_level(&self) -> Result<u8> {
        Ok(self.pj.read(cmd::CHARGE_LEVEL)?[0])
    }

    // === Faults and buttons ===

    pub fn get_fault_status(&self) -> Result<FaultStatus> {
        let d = self.pj.read(cmd::FAULT_EVENT)?;
        Ok(FaultStatus::from_byte(d[0]))
    }

    /// Clear the listed fault flags; other flags are left untouched
    pub fn reset_fault_flags(&self, flags: &[FaultFlag]) -> Result<()> {
        let mask = flags.iter().fold(0xFF, |m, f| m & !f.mask());
        debug!("Clearing fault flags with mask 0x{:02X}", mask);
        self.pj.write(cmd::FAULT_EVENT, &[mask])
    }

    pub fn get_button_events(&self) -> Result<ButtonEvents> {
        let d = self.pj.read(cmd::BUTTON_EVENT)?;
        Ok(ButtonEvents::from_bytes(&d))
    }

    /// Acknowledge the pending event of one button
    pub fn accept_button_event(&self, button: Button) -> Result<()> {
        let mask = match button {
            Button::Sw1 => [0xF0, 0xFF],
            Button::Sw2 => [0x0F, 0xFF],
            Button::Sw3 => [0xFF, 0xF0],
        };
        self.pj.write(cmd::BUTTON_EVENT, &mask)
    }

    // === Battery and IO telemetry ===

    /// Battery temperature in °C
    pub fn get_battery_temperature(&self) -> Result<i8> {
        let d = self.pj.read(cmd::BATTERY_TEMPERATURE)?;
        Ok(i8::from_le_bytes([d[0]]))
    }

    /// Battery voltage in mV
    pub fn get_battery_voltage(&self) -> Result<u16> {
        Ok(le_u16(&self.pj.read(cmd::BATTERY_VOLTAGE)?, 0))
    }

    /// Battery current in mA, negative while charging
    pub fn get_battery_current(&self) -> Result<i16> {
        Ok(le_i16(&self.pj.read(cmd::BATTERY_CURRENT)?, 0))
    }

    /// 5V GPIO rail voltage in mV
    pub fn get_io_voltage(&self) -> Result<u16> {
        Ok(le_u16(&self.pj.read(cmd::IO_VOLTAGE)?, 0))
    }

    /// 5V GPIO rail current in mA
    pub fn get_io_current(&self) -> Result<i16> {
        Ok(le_i16(&self.pj.read(cmd::IO_CURRENT)?, 0))
    }

    // === LEDs ===

    pub fn get_led_state(&self, led: Led) -> Result<Rgb> {
        let d = self.pj.read(cmd::LED_STATE + led.raw())?;
        Ok(Rgb::from_slice(&d))
    }

    pub fn set_led_state(&self, led: Led, rgb: Rgb) -> Result<()> {
        self.pj.write(cmd::LED_STATE + led.raw(), &rgb.bytes())
    }

    pub fn get_led_blink(&self, led: Led) -> Result<LedBlink> {
        let d = self.pj.read(cmd::LED_BLINK + led.raw())?;
        Ok(LedBlink::from_bytes(&d))
    }

    /// Start a blink pattern; the count runs down on the device, so no read-back
    pub fn set_led_blink(&self, led: Led, blink: &LedBlink) -> Result<()> {
        let payload = blink.to_bytes()?;
        self.pj.write(cmd::LED_BLINK + led.raw(), &payload)
    }

    // === IO pins ===

    pub fn get_io_digital_input(&self, pin: IoPin) -> Result<bool> {
        let d = self.pj.read(pin.register(cmd::IO_PIN_ACCESS))?;
        Ok(d[0] == 1)
    }

    pub fn get_io_digital_output(&self, pin: IoPin) -> Result<bool> {
        let d = self.pj.read(pin.register(cmd::IO_PIN_ACCESS))?;
        Ok(d[1] == 1)
    }

    pub fn set_io_digital_output(&self, pin: IoPin, value: bool) -> Result<()> {
        let level = u8::from(value);
        self.pj
            .write_verified_with(pin.register(cmd::IO_PIN_ACCESS), &[0, level], |rb| {
                rb.get(1) == Some(&level)
            })
    }

    /// Analog input in mV
    pub fn get_io_analog_input(&self, pin: IoPin) -> Result<u16> {
        Ok(le_u16(&self.pj.read(pin.register(cmd::IO_PIN_ACCESS))?, 0))
    }

    /// PWM duty cycle in percent
    pub fn get_io_pwm(&self, pin: IoPin) -> Result<f32> {
        let d = self.pj.read(pin.register(cmd::IO_PIN_ACCESS))?;
        Ok(duty_from_raw(le_u16(&d, 0)))
    }

    pub fn set_io_pwm(&self, pin: IoPin, duty_cycle: f32) -> Result<()> {
        if duty_cycle.is_nan() {
            return Err(PiJuiceError::BadArgument("duty cycle is not a number".into()));
        }
        if !(0.0..=100.0).contains(&duty_cycle) {
            return Err(PiJuiceError::invalid(
                ErrorKind::InvalidDutyCycle,
                format!("{duty_cycle} is outside 0..=100"),
            ));
        }
        let raw = duty_to_raw(duty_cycle).to_le_bytes();
        self.pj
            .write_verified(pin.register(cmd::IO_PIN_ACCESS), &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::simulated;

    #[test]
    fn test_status_byte_decode() {
        let status = Status::from_byte(0b1100_0011);
        assert!(status.is_fault);
        assert!(status.is_button);
        assert_eq!(status.battery, BatteryState::Normal);
        assert_eq!(status.power_input, PowerInputState::NotPresent);
        assert_eq!(status.power_input_5v_io, PowerInputState::Present);
        assert!(status.is_powered());
        assert_eq!(status.to_byte(), 0b1100_0011);
    }

    #[test]
    fn test_status_byte_all_values_round_trip() {
        for d in 0..=u8::MAX {
            assert_eq!(Status::from_byte(d).to_byte(), d);
        }
        assert!(!Status::from_byte(0b1010_0000).is_powered());
    }

    #[test]
    fn test_fault_status_decode() {
        let faults = FaultStatus::from_byte(0x0F);
        assert_eq!(faults.flags.len(), 4);
        assert!(faults.has(FaultFlag::WatchdogReset));
        assert!(!faults.has(FaultFlag::BatteryProfileInvalid));
        assert_eq!(faults.charging_temperature_fault, None);

        let faults = FaultStatus::from_byte(0xA0);
        assert_eq!(faults.flags, vec![FaultFlag::BatteryProfileInvalid]);
        assert_eq!(
            faults.charging_temperature_fault,
            Some(ChargingTemperatureFault::Cool)
        );
        assert!(FaultStatus::from_byte(0).is_clear());
    }

    #[test]
    fn test_button_events_decode() {
        let events = ButtonEvents::from_bytes(&[0x53, 0x09]);
        assert_eq!(events.sw1, ButtonEvent::SinglePress);
        assert_eq!(events.sw2, ButtonEvent::LongPress1);
        assert_eq!(events.sw3, ButtonEvent::Unknown);
        assert_eq!(events.pending().count(), 3);
        assert_eq!(ButtonEvents::from_bytes(&[0, 0]).pending().count(), 0);
    }

    #[test]
    fn test_led_blink_encoding() {
        let blink = LedBlink {
            count: 255,
            rgb1: Rgb::new(200, 0, 0),
            period1_ms: 500,
            rgb2: Rgb::new(0, 0, 0),
            period2_ms: 2550,
        };
        let bytes = blink.to_bytes().unwrap();
        assert_eq!(bytes, vec![255, 200, 0, 0, 50, 0, 0, 0, 255]);
        assert_eq!(LedBlink::from_bytes(&bytes), blink);

        let too_long = LedBlink {
            period2_ms: 2560,
            ..blink
        };
        assert_eq!(
            too_long.to_bytes().unwrap_err().kind(),
            ErrorKind::InvalidPeriod
        );
    }

    #[test]
    fn test_telemetry_from_device() {
        let (sim, pj) = simulated();
        let status = pj.status();
        assert_eq!(status.get_charge_level().unwrap(), 82);
        assert_eq!(status.get_battery_voltage().unwrap(), 4020);
        assert_eq!(status.get_io_voltage().unwrap(), 5170);
        assert_eq!(status.get_io_current().unwrap(), -1134);
        assert_eq!(status.get_battery_current().unwrap(), 12);
        assert_eq!(status.get_battery_temperature().unwrap(), 48);

        sim.set_register(cmd::BATTERY_TEMPERATURE, &[0xB0, 0]);
        assert_eq!(status.get_battery_temperature().unwrap(), -80);
        sim.set_register(cmd::BATTERY_TEMPERATURE, &[0x80, 0]);
        assert_eq!(status.get_battery_temperature().unwrap(), -128);
        sim.set_register(cmd::BATTERY_CURRENT, &[12, 0x80]);
        assert_eq!(status.get_battery_current().unwrap(), -32756);
    }

    #[test]
    fn test_accept_button_event_clears_one_button() {
        let (sim, pj) = simulated();
        sim.set_register(cmd::BUTTON_EVENT, &[0x31, 0x04]);
        pj.status().accept_button_event(Button::Sw2).unwrap();
        let events = pj.status().get_button_events().unwrap();
        assert_eq!(events.sw1, ButtonEvent::Press);
        assert_eq!(events.sw2, ButtonEvent::NoEvent);
        assert_eq!(events.sw3, ButtonEvent::DoublePress);
    }

    #[test]
    fn test_reset_fault_flags_mask() {
        let (sim, pj) = simulated();
        pj.status()
            .reset_fault_flags(&[FaultFlag::ButtonPowerOff, FaultFlag::WatchdogReset])
            .unwrap();
        assert_eq!(sim.write_log(), vec![(cmd::FAULT_EVENT, vec![0xF6])]);
        assert_eq!(sim.register(cmd::FAULT_EVENT), Some(vec![0x06]));
    }

    #[test]
    fn test_io_pwm() {
        let (sim, pj) = simulated();
        let status = pj.status();
        status.set_io_pwm(IoPin::Io1, 78.0).unwrap();
        assert_eq!(status.get_io_pwm(IoPin::Io1).unwrap(), 78.0);
        status.set_io_pwm(IoPin::Io2, 100.0).unwrap();
        assert_eq!(sim.register(cmd::IO_PIN_ACCESS + 5), Some(vec![0xFF, 0xFF]));

        let writes = sim.write_count();
        let err = status.set_io_pwm(IoPin::Io1, 100.5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDutyCycle);
        let err = status.set_io_pwm(IoPin::Io1, f32::NAN).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
        assert_eq!(sim.write_count(), writes);
    }

    #[test]
    fn test_io_digital_output() {
        let (sim, pj) = simulated();
        pj.status().set_io_digital_output(IoPin::Io2, true).unwrap();
        assert_eq!(sim.register(cmd::IO_PIN_ACCESS + 5), Some(vec![0, 1]));
        assert!(pj.status().get_io_digital_output(IoPin::Io2).unwrap());
        assert!(!pj.status().get_io_digital_input(IoPin::Io2).unwrap());
    }

    #[test]
    fn test_channel_names_parse() {
        assert_eq!("sw3".parse::<Button>().unwrap(), Button::Sw3);
        assert_eq!(
            "SW9".parse::<Button>().unwrap_err().kind(),
            ErrorKind::BadArgument
        );
        assert_eq!("D2".parse::<Led>().unwrap(), Led::D2);
        assert_eq!(IoPin::from_number(2).unwrap(), IoPin::Io2);
        assert_eq!(IoPin::from_number(3).unwrap_err().kind(), ErrorKind::BadArgument);
        assert_eq!(IoPin::Io2.register(cmd::IO_CONFIGURATION), 0x77);
    }
}
