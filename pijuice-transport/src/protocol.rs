//! Protocol constants and utilities for PiJuice HAT communication
//!
//! Every frame exchanged with the HAT is `[payload..., checksum]` where the
//! checksum is `0xFF` XOR-ed with each payload byte.

/// Command registers
pub mod cmd {
    // Status group (0x40 - 0x4F, 0x66 - 0x69, 0x75 - 0x7B)
    pub const STATUS: u8 = 0x40;
    pub const CHARGE_LEVEL: u8 = 0x41;
    pub const FAULT_EVENT: u8 = 0x44;
    pub const BUTTON_EVENT: u8 = 0x45;
    pub const BATTERY_TEMPERATURE: u8 = 0x47;
    pub const BATTERY_VOLTAGE: u8 = 0x49;
    pub const BATTERY_CURRENT: u8 = 0x4B;
    pub const IO_VOLTAGE: u8 = 0x4D;
    pub const IO_CURRENT: u8 = 0x4F;
    /// LED D1 state; D2 is at +1
    pub const LED_STATE: u8 = 0x66;
    /// LED D1 blink pattern; D2 is at +1
    pub const LED_BLINK: u8 = 0x68;
    /// IO1 pin access; IO2 is at +5
    pub const IO_PIN_ACCESS: u8 = 0x75;

    // Config group
    pub const CHARGING_CONFIG: u8 = 0x51;
    pub const BATTERY_PROFILE_ID: u8 = 0x52;
    pub const BATTERY_PROFILE: u8 = 0x53;
    pub const BATTERY_EXT_PROFILE: u8 = 0x54;
    pub const BATTERY_TEMP_SENSE_CONFIG: u8 = 0x5D;
    pub const POWER_INPUTS_CONFIG: u8 = 0x5E;
    pub const RUN_PIN_CONFIG: u8 = 0x5F;
    pub const POWER_REGULATOR_CONFIG: u8 = 0x60;
    /// LED D1 configuration; D2 is at +1
    pub const LED_CONFIGURATION: u8 = 0x6A;
    /// SW1 configuration; SW2 and SW3 follow
    pub const BUTTON_CONFIGURATION: u8 = 0x6E;
    /// IO1 configuration; IO2 is at +5
    pub const IO_CONFIGURATION: u8 = 0x72;
    /// Primary slave address; the RTC slave is at +1
    pub const I2C_ADDRESS: u8 = 0x7C;
    pub const ID_EEPROM_WRITE_PROTECT: u8 = 0x7E;
    pub const ID_EEPROM_ADDRESS: u8 = 0x7F;
    pub const RESET_TO_DEFAULT: u8 = 0xF0;
    pub const RUN_TEST_CALIBRATION: u8 = 0xF8;
    pub const FIRMWARE_VERSION: u8 = 0xFD;

    // Power group
    pub const WATCHDOG_ACTIVATION: u8 = 0x61;
    pub const POWER_OFF: u8 = 0x62;
    pub const WAKEUP_ON_CHARGE: u8 = 0x63;
    pub const SYSTEM_POWER_SWITCH: u8 = 0x64;

    // RTC / alarm group
    pub const RTC_TIME: u8 = 0xB0;
    pub const RTC_ALARM: u8 = 0xB9;
    pub const RTC_CTRL_STATUS: u8 = 0xC2;

    // Diagnostics
    pub const LOGGING: u8 = 0xF6;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            STATUS => "STATUS",
            CHARGE_LEVEL => "CHARGE_LEVEL",
            FAULT_EVENT => "FAULT_EVENT",
            BUTTON_EVENT => "BUTTON_EVENT",
            BATTERY_TEMPERATURE => "BATTERY_TEMPERATURE",
            BATTERY_VOLTAGE => "BATTERY_VOLTAGE",
            BATTERY_CURRENT => "BATTERY_CURRENT",
            IO_VOLTAGE => "IO_VOLTAGE",
            IO_CURRENT => "IO_CURRENT",
            0x66 | 0x67 => "LED_STATE",
            0x68 | 0x69 => "LED_BLINK",
            0x75 | 0x7A => "IO_PIN_ACCESS",
            CHARGING_CONFIG => "CHARGING_CONFIG",
            BATTERY_PROFILE_ID => "BATTERY_PROFILE_ID",
            BATTERY_PROFILE => "BATTERY_PROFILE",
            BATTERY_EXT_PROFILE => "BATTERY_EXT_PROFILE",
            BATTERY_TEMP_SENSE_CONFIG => "BATTERY_TEMP_SENSE_CONFIG",
            POWER_INPUTS_CONFIG => "POWER_INPUTS_CONFIG",
            RUN_PIN_CONFIG => "RUN_PIN_CONFIG",
            POWER_REGULATOR_CONFIG => "POWER_REGULATOR_CONFIG",
            0x6A | 0x6B => "LED_CONFIGURATION",
            0x6E..=0x70 => "BUTTON_CONFIGURATION",
            0x72 | 0x77 => "IO_CONFIGURATION",
            0x7C | 0x7D => "I2C_ADDRESS",
            ID_EEPROM_WRITE_PROTECT => "ID_EEPROM_WRITE_PROTECT",
            ID_EEPROM_ADDRESS => "ID_EEPROM_ADDRESS",
            RESET_TO_DEFAULT => "RESET_TO_DEFAULT",
            RUN_TEST_CALIBRATION => "RUN_TEST_CALIBRATION",
            FIRMWARE_VERSION => "FIRMWARE_VERSION",
            WATCHDOG_ACTIVATION => "WATCHDOG_ACTIVATION",
            POWER_OFF => "POWER_OFF",
            WAKEUP_ON_CHARGE => "WAKEUP_ON_CHARGE",
            SYSTEM_POWER_SWITCH => "SYSTEM_POWER_SWITCH",
            RTC_TIME => "RTC_TIME",
            RTC_ALARM => "RTC_ALARM",
            RTC_CTRL_STATUS => "RTC_CTRL_STATUS",
            LOGGING => "LOGGING",
            _ => "UNKNOWN",
        }
    }

    /// Fixed payload length (without checksum) read from a register
    pub fn read_len(cmd: u8) -> Option<usize> {
        let len = match cmd {
            STATUS | CHARGE_LEVEL | FAULT_EVENT => 1,
            BUTTON_EVENT | BATTERY_TEMPERATURE | BATTERY_VOLTAGE | BATTERY_CURRENT => 2,
            IO_VOLTAGE | IO_CURRENT => 2,
            0x66 | 0x67 => 3,
            0x68 | 0x69 => 9,
            0x75 | 0x7A => 2,
            CHARGING_CONFIG | BATTERY_PROFILE_ID => 1,
            BATTERY_PROFILE => 14,
            BATTERY_EXT_PROFILE => 17,
            BATTERY_TEMP_SENSE_CONFIG | POWER_INPUTS_CONFIG | RUN_PIN_CONFIG => 1,
            POWER_REGULATOR_CONFIG => 1,
            0x6A | 0x6B => 4,
            0x6E..=0x70 => 12,
            0x72 | 0x77 => 5,
            0x7C | 0x7D | ID_EEPROM_WRITE_PROTECT | ID_EEPROM_ADDRESS => 1,
            RESET_TO_DEFAULT => 4,
            FIRMWARE_VERSION => 2,
            WATCHDOG_ACTIVATION => 2,
            POWER_OFF | WAKEUP_ON_CHARGE | SYSTEM_POWER_SWITCH => 1,
            RTC_TIME | RTC_ALARM => 9,
            RTC_CTRL_STATUS => 2,
            LOGGING => super::log::ENTRY_DATA_LEN,
            _ => return None,
        };
        Some(len)
    }
}

/// Sub-commands and layout of the diagnostic logging register
pub mod log {
    /// Select log-read mode and rewind to the oldest entry
    pub const LOG_READ: u8 = 0x00;
    /// Write the enable mask (second byte)
    pub const LOG_SET_CONFIG: u8 = 0x01;
    /// Select config-read mode for the next read
    pub const LOG_GET_CONFIG: u8 = 0x02;
    /// Data bytes per entry, checksum excluded
    pub const ENTRY_DATA_LEN: usize = 31;
    /// Ring capacity in entries
    pub const CAPACITY: usize = 64;
    /// Bits that may be set in the enable mask
    pub const CONFIG_MASK: u8 = 0x7F;
}

/// Magic payloads for destructive commands
pub mod magic {
    pub const RESET_TO_DEFAULT: [u8; 4] = [0xAA, 0x55, 0x0A, 0xA3];
    pub const RUN_TEST_CALIBRATION: [u8; 4] = [0x55, 0x26, 0xA0, 0x2B];
}

/// Bus timing defaults
pub mod timing {
    /// Attempts per command before giving up
    pub const MAX_TRIES: u32 = 5;
    /// First retry delay
    pub const BACKOFF_MS: u64 = 100;
    /// Added per subsequent retry
    pub const BACKOFF_STEP_MS: u64 = 100;
    /// Upper bound for a single retry delay
    pub const MAX_BACKOFF_MS: u64 = 500;
    /// Extra pause after a bus exception, once per command
    pub const IO_COOLDOWN_MS: u64 = 4000;
    /// A transfer slower than this means the device is still busy
    pub const TRANSFER_TIMEOUT_MS: u64 = 100;
    /// Pause between a write and its verification read-back
    pub const SETTLE_MS: u64 = 20;
}

/// Default 7-bit address of the HAT microcontroller
pub const DEFAULT_ADDRESS: u8 = 0x14;
/// Default bus on a Raspberry Pi header
pub const DEFAULT_BUS: u8 = 1;

/// Compute the frame checksum over a payload
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0xFF, |fcs, b| fcs ^ b)
}

/// Build a wire frame: payload followed by its checksum
pub fn append_checksum(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload);
    frame.push(checksum(payload));
    frame
}

/// Check the trailing checksum byte of a frame
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((fcs, payload)) => checksum(payload) == *fcs,
        None => false,
    }
}

/// Validate a received frame and return its payload
///
/// Some firmware revisions drop bit 7 of the first payload byte after the
/// checksum has been computed. When the frame only verifies with that bit
/// restored, the corrected payload is returned.
pub fn verify_frame(frame: &[u8]) -> Option<Vec<u8>> {
    let (fcs, payload) = frame.split_last()?;
    if checksum(payload) == *fcs {
        return Some(payload.to_vec());
    }
    let mut restored = payload.to_vec();
    let first = restored.first_mut()?;
    *first |= 0x80;
    if checksum(&restored) == *fcs {
        Some(restored)
    } else {
        None
    }
}
