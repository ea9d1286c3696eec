//! In-memory simulated HAT
//!
//! `SimulatedTransport` holds a register file preloaded with the image of a
//! HAT running firmware 1.6 and answers reads and writes the way the device
//! does. Faults are injected per instance so every test builds its own bus.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::{self, cmd, log, DEFAULT_ADDRESS, DEFAULT_BUS};
use crate::types::{BusAddress, TransportDeviceInfo, TransportType};
use crate::Transport;

const STATUS_FAULT: u8 = 0b0000_0001;
const STATUS_BUTTON: u8 = 0b0000_0010;

/// Register image of a freshly booted HAT
const DEFAULT_IMAGE: &[(u8, &[u8])] = &[
    (cmd::STATUS, &[0xC3]),
    (cmd::CHARGE_LEVEL, &[82]),
    (cmd::FAULT_EVENT, &[0x0F]),
    (cmd::BUTTON_EVENT, &[0x01, 0x00]),
    (cmd::BATTERY_TEMPERATURE, &[48, 255]),
    (cmd::BATTERY_VOLTAGE, &[180, 15]),
    (cmd::BATTERY_CURRENT, &[12, 0]),
    (cmd::IO_VOLTAGE, &[50, 20]),
    (cmd::IO_CURRENT, &[146, 251]),
    (cmd::CHARGING_CONFIG, &[0x01]),
    (cmd::BATTERY_PROFILE_ID, &[0x01]),
    (
        cmd::BATTERY_PROFILE,
        &[28, 7, 5, 0, 34, 150, 1, 10, 45, 59, 52, 13, 232, 3],
    ),
    (
        cmd::BATTERY_EXT_PROFILE,
        &[
            0, 65, 14, 216, 14, 237, 15, 164, 81, 20, 80, 232, 78, 255, 255, 255, 255,
        ],
    ),
    (cmd::BATTERY_TEMP_SENSE_CONFIG, &[0x02]),
    (cmd::POWER_INPUTS_CONFIG, &[0x0B]),
    (cmd::RUN_PIN_CONFIG, &[0x00]),
    (cmd::POWER_REGULATOR_CONFIG, &[0x00]),
    (cmd::WATCHDOG_ACTIVATION, &[0, 0]),
    (cmd::POWER_OFF, &[0xFF]),
    (cmd::WAKEUP_ON_CHARGE, &[0x98]),
    (cmd::SYSTEM_POWER_SWITCH, &[0x00]),
    (cmd::LED_STATE, &[0, 60, 100]),
    (cmd::LED_STATE + 1, &[0, 15, 0]),
    (cmd::LED_BLINK, &[0; 9]),
    (cmd::LED_BLINK + 1, &[0; 9]),
    (cmd::LED_CONFIGURATION, &[1, 60, 60, 100]),
    (cmd::LED_CONFIGURATION + 1, &[3, 9, 0, 0]),
    (
        cmd::BUTTON_CONFIGURATION,
        &[0, 0, 0, 0, 1, 8, 0, 0, 17, 100, 2, 200],
    ),
    (
        cmd::BUTTON_CONFIGURATION + 1,
        &[0, 0, 0, 0, 33, 4, 34, 6, 0, 0, 0, 0],
    ),
    (
        cmd::BUTTON_CONFIGURATION + 2,
        &[35, 0, 36, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ),
    (cmd::IO_CONFIGURATION, &[128, 53, 170, 178, 201]),
    (cmd::IO_CONFIGURATION + 5, &[0, 0, 0, 0, 0]),
    (cmd::IO_PIN_ACCESS, &[117, 53]),
    (cmd::IO_PIN_ACCESS + 5, &[122, 53]),
    (cmd::I2C_ADDRESS, &[0x14]),
    (cmd::I2C_ADDRESS + 1, &[0x68]),
    (cmd::ID_EEPROM_WRITE_PROTECT, &[0x01]),
    (cmd::ID_EEPROM_ADDRESS, &[0x50]),
    (cmd::RTC_TIME, &[0x53, 0x19, 0x19, 1, 0x18, 0x12, 0x22, 240, 0]),
    (cmd::RTC_ALARM, &[0, 0, 0, 0, 255, 255, 255, 0, 255]),
    (cmd::RTC_CTRL_STATUS, &[0, 0]),
    (cmd::FIRMWARE_VERSION, &[0x16, 0x00]),
];

/// Default diagnostic ring: one entry of each event type
const DEFAULT_LOG: &[[u8; 8]] = &[
    [0, 6, 0x40, 0x47, 0x14, 4, 0x07, 0x12],
    [1, 4, 0x40, 0x47, 0x14, 4, 0x08, 0x12],
    [2, 5, 0x40, 0x47, 0x14, 4, 0x09, 0x12],
    [3, 7, 0x40, 0x47, 0x14, 4, 0x10, 0x12],
    [4, 8, 0x40, 0x47, 0x14, 4, 0x11, 0x12],
    [5, 10, 0x40, 0x47, 0x14, 4, 0x12, 0x12],
];

/// Shared tail of the default log entries (year, subsecond, payload)
const DEFAULT_LOG_TAIL: [u8; 23] = [
    0x22, 235, 1, 200, 9, 240, 0, 194, 52, 161, 15, 64, 20, 124, 1, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Default enable mask of the diagnostic log
const DEFAULT_LOG_CONFIG: u8 = 0x42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogMode {
    Entries,
    Config,
}

struct SimState {
    registers: HashMap<u8, Vec<u8>>,
    log_entries: Vec<Vec<u8>>,
    log_mode: LogMode,
    log_index: usize,
    log_config: u8,
    // Fault injection
    failing_reads: u32,
    failing_writes: u32,
    corrupt_next_read: bool,
    checksum_corruption: bool,
    recoverable_checksum: bool,
    delays: HashMap<u8, (u32, Duration)>,
    frozen: HashSet<u8>,
    // Observation
    reads: usize,
    writes: usize,
    write_log: Vec<(u8, Vec<u8>)>,
}

impl SimState {
    fn fresh() -> Self {
        Self {
            registers: DEFAULT_IMAGE
                .iter()
                .map(|(reg, data)| (*reg, data.to_vec()))
                .collect(),
            log_entries: default_log_entries(),
            log_mode: LogMode::Entries,
            log_index: 0,
            log_config: DEFAULT_LOG_CONFIG,
            failing_reads: 0,
            failing_writes: 0,
            corrupt_next_read: false,
            checksum_corruption: false,
            recoverable_checksum: false,
            delays: HashMap::new(),
            frozen: HashSet::new(),
            reads: 0,
            writes: 0,
            write_log: Vec::new(),
        }
    }

    fn delay_for(&mut self, register: u8) -> Option<Duration> {
        let (remaining, duration) = self.delays.get_mut(&register)?;
        let duration = *duration;
        *remaining -= 1;
        if *remaining == 0 {
            self.delays.remove(&register);
        }
        Some(duration)
    }

    fn status_flag(&mut self, flag: u8, set: bool) {
        if let Some(status) = self.registers.get_mut(&cmd::STATUS) {
            if set {
                status[0] |= flag;
            } else {
                status[0] &= !flag;
            }
        }
    }

    fn read_payload(&mut self, register: u8, len: usize) -> Vec<u8> {
        let mut payload = if register == cmd::LOGGING {
            let data = match self.log_mode {
                LogMode::Entries => {
                    let entry = self
                        .log_entries
                        .get(self.log_index)
                        .cloned()
                        .unwrap_or_default();
                    self.log_index += 1;
                    entry
                }
                LogMode::Config => vec![0, 0, 1, self.log_config],
            };
            self.log_mode = LogMode::Entries;
            data
        } else {
            self.registers.get(&register).cloned().unwrap_or_default()
        };
        payload.resize(len, 0);
        payload
    }

    fn apply_write(&mut self, register: u8, payload: &[u8]) {
        match register {
            cmd::LOGGING => match payload.first().copied() {
                Some(log::LOG_READ) => {
                    self.log_mode = LogMode::Entries;
                    self.log_index = 0;
                }
                Some(log::LOG_SET_CONFIG) => {
                    self.log_config = payload.get(1).copied().unwrap_or(0) & log::CONFIG_MASK;
                    self.log_mode = LogMode::Entries;
                }
                Some(log::LOG_GET_CONFIG) => self.log_mode = LogMode::Config,
                _ => {}
            },
            cmd::BUTTON_EVENT | cmd::FAULT_EVENT => {
                if let Some(current) = self.registers.get_mut(&register) {
                    for (byte, mask) in current.iter_mut().zip(payload) {
                        *byte &= mask;
                    }
                }
                let cleared = self
                    .registers
                    .get(&register)
                    .is_some_and(|d| d.iter().all(|b| *b == 0));
                if cleared {
                    let flag = if register == cmd::BUTTON_EVENT {
                        STATUS_BUTTON
                    } else {
                        STATUS_FAULT
                    };
                    self.status_flag(flag, false);
                }
            }
            cmd::RESET_TO_DEFAULT => {
                if payload == protocol::magic::RESET_TO_DEFAULT {
                    let fresh = SimState::fresh();
                    self.registers = fresh.registers;
                }
            }
            cmd::RUN_TEST_CALIBRATION => {}
            _ => {
                self.registers.insert(register, payload.to_vec());
            }
        }
    }
}

fn default_log_entries() -> Vec<Vec<u8>> {
    DEFAULT_LOG
        .iter()
        .map(|head| {
            let mut entry = head.to_vec();
            entry.extend_from_slice(&DEFAULT_LOG_TAIL);
            entry
        })
        .collect()
}

/// Simulated HAT behind the [`Transport`] trait
pub struct SimulatedTransport {
    state: Mutex<SimState>,
    info: TransportDeviceInfo,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    /// Simulated HAT at the default bus and address
    pub fn new() -> Self {
        Self::at(BusAddress::new(DEFAULT_BUS, DEFAULT_ADDRESS))
    }

    /// Simulated HAT reporting itself at `location`
    pub fn at(location: BusAddress) -> Self {
        Self {
            state: Mutex::new(SimState::fresh()),
            info: TransportDeviceInfo::new(location, TransportType::Simulated),
        }
    }

    // === Fault injection ===

    /// The next read raises a bus error
    pub fn fail_next_read(&self) {
        self.fail_reads(1);
    }

    /// The next `count` reads raise bus errors
    pub fn fail_reads(&self, count: u32) {
        self.state.lock().failing_reads = count;
    }

    /// The next write raises a bus error
    pub fn fail_next_write(&self) {
        self.fail_writes(1);
    }

    /// The next `count` writes raise bus errors
    pub fn fail_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }

    /// The next read returns a well-formed frame whose first byte is inverted
    pub fn corrupt_next_read(&self) {
        self.state.lock().corrupt_next_read = true;
    }

    /// While enabled every read carries an inverted checksum
    pub fn set_checksum_corruption(&self, enabled: bool) {
        self.state.lock().checksum_corruption = enabled;
    }

    /// While enabled the device clears bit 7 of the first byte after
    /// computing the checksum
    pub fn set_recoverable_checksum(&self, enabled: bool) {
        self.state.lock().recoverable_checksum = enabled;
    }

    /// The next `count` transfers on `register` take `duration`
    pub fn add_command_delay(&self, register: u8, count: u32, duration: Duration) {
        if count > 0 {
            self.state.lock().delays.insert(register, (count, duration));
        }
    }

    /// Writes to `register` are acknowledged but have no effect
    pub fn freeze_register(&self, register: u8) {
        self.state.lock().frozen.insert(register);
    }

    // === Inspection ===

    /// Current payload of a register
    pub fn register(&self, register: u8) -> Option<Vec<u8>> {
        self.state.lock().registers.get(&register).cloned()
    }

    /// Overwrite a register payload; event registers update the status flags
    pub fn set_register(&self, register: u8, payload: &[u8]) {
        let mut state = self.state.lock();
        state.registers.insert(register, payload.to_vec());
        match register {
            cmd::BUTTON_EVENT => state.status_flag(STATUS_BUTTON, true),
            cmd::FAULT_EVENT => {
                let faulty = payload.first().is_some_and(|b| *b != 0);
                state.status_flag(STATUS_FAULT, faulty);
            }
            _ => {}
        }
    }

    /// Replace the diagnostic ring (entries without checksum)
    pub fn set_log_entries(&self, entries: Vec<Vec<u8>>) {
        let mut state = self.state.lock();
        state.log_entries = entries;
        state.log_index = 0;
    }

    /// Current diagnostic enable mask
    pub fn log_config(&self) -> u8 {
        self.state.lock().log_config
    }

    /// Set power input presence in the status register
    pub fn set_power_inputs(&self, usb_micro: bool, gpio_5v: bool) {
        let mut state = self.state.lock();
        if let Some(status) = state.registers.get_mut(&cmd::STATUS) {
            status[0] &= 0x0F;
            if usb_micro {
                status[0] |= 0x30;
            }
            if gpio_5v {
                status[0] |= 0xC0;
            }
        }
    }

    /// Set the battery charge level
    pub fn set_charge_level(&self, percent: u8) {
        self.state
            .lock()
            .registers
            .insert(cmd::CHARGE_LEVEL, vec![percent]);
    }

    /// Advance the RTC by whole seconds (24-hour clock, day carry only)
    pub fn tick(&self, seconds: u32) {
        let mut state = self.state.lock();
        let Some(rtc) = state.registers.get_mut(&cmd::RTC_TIME) else {
            return;
        };
        let from_bcd = |b: u8| u32::from((b >> 4) * 10 + (b & 0x0F));
        let to_bcd = |v: u32| (((v / 10) << 4) | (v % 10)) as u8;
        let total = from_bcd(rtc[0] & 0x7F)
            + from_bcd(rtc[1] & 0x7F) * 60
            + from_bcd(rtc[2] & 0x3F) * 3600
            + seconds;
        rtc[0] = to_bcd(total % 60);
        rtc[1] = to_bcd(total / 60 % 60);
        rtc[2] = to_bcd(total / 3600 % 24);
        let days = total / 86_400;
        if days > 0 {
            rtc[4] = to_bcd(from_bcd(rtc[4]) + days);
            rtc[3] = ((u32::from(rtc[3] & 0x07).saturating_sub(1) + days) % 7 + 1) as u8;
        }
    }

    /// Number of read transfers attempted
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Number of write transfers attempted
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Accepted writes in order, payload only
    pub fn write_log(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().write_log.clone()
    }
}

impl Transport for SimulatedTransport {
    fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(TransportError::io(register, "simulated read failure"));
        }
        if let Some(delay) = state.delay_for(register) {
            std::thread::sleep(delay);
        }

        let mut payload = state.read_payload(register, len.saturating_sub(1));
        if state.corrupt_next_read {
            state.corrupt_next_read = false;
            if let Some(first) = payload.first_mut() {
                *first = !*first;
            }
        }
        let mut fcs = protocol::checksum(&payload);
        if state.checksum_corruption {
            fcs = !fcs;
        }
        let mut frame = payload;
        frame.push(fcs);
        if state.recoverable_checksum && frame[0] & 0x80 != 0 {
            frame[0] &= 0x7F;
        }
        Ok(frame)
    }

    fn write(&self, register: u8, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.writes += 1;
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(TransportError::io(register, "simulated write failure"));
        }
        if let Some(delay) = state.delay_for(register) {
            std::thread::sleep(delay);
        }

        let Some(payload) = protocol::verify_frame(data) else {
            debug!("Simulated HAT dropped frame with bad checksum on 0x{register:02X}");
            return Ok(());
        };
        state.write_log.push((register, payload.clone()));
        if state.frozen.contains(&register) {
            return Ok(());
        }
        state.apply_write(register, &payload);
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{append_checksum, verify_checksum};

    #[test]
    fn test_reads_carry_valid_checksum() {
        let sim = SimulatedTransport::new();
        let frame = sim.read(cmd::FIRMWARE_VERSION, 3).unwrap();
        assert_eq!(frame, vec![0x16, 0x00, 0xE9]);
        assert!(verify_checksum(&sim.read(cmd::BATTERY_PROFILE, 15).unwrap()));
    }

    #[test]
    fn test_fault_injection_is_one_shot() {
        let sim = SimulatedTransport::new();
        sim.fail_next_read();
        assert!(sim.read(cmd::STATUS, 2).is_err());
        assert!(sim.read(cmd::STATUS, 2).is_ok());
        assert_eq!(sim.read_count(), 2);
    }

    #[test]
    fn test_corrupt_read_is_well_formed() {
        let sim = SimulatedTransport::new();
        sim.corrupt_next_read();
        let frame = sim.read(cmd::CHARGE_LEVEL, 2).unwrap();
        assert!(verify_checksum(&frame));
        assert_eq!(frame[0], !82u8);
    }

    #[test]
    fn test_button_event_write_clears_status_flag() {
        let sim = SimulatedTransport::new();
        sim.write(cmd::BUTTON_EVENT, &append_checksum(&[0xF0, 0xFF]))
            .unwrap();
        assert_eq!(sim.register(cmd::BUTTON_EVENT), Some(vec![0, 0]));
        assert_eq!(sim.register(cmd::STATUS), Some(vec![0xC1]));
    }

    #[test]
    fn test_bad_checksum_write_ignored() {
        let sim = SimulatedTransport::new();
        sim.write(cmd::POWER_OFF, &[5, 0]).unwrap();
        assert_eq!(sim.register(cmd::POWER_OFF), Some(vec![0xFF]));
        assert!(sim.write_log().is_empty());
    }

    #[test]
    fn test_log_config_mode() {
        let sim = SimulatedTransport::new();
        sim.write(cmd::LOGGING, &append_checksum(&[log::LOG_GET_CONFIG]))
            .unwrap();
        let frame = sim.read(cmd::LOGGING, 32).unwrap();
        assert_eq!(&frame[..4], &[0, 0, 1, 0x42]);
        // Mode falls back to entries after one config read
        let frame = sim.read(cmd::LOGGING, 32).unwrap();
        assert_eq!(frame[1], 6);
    }

    #[test]
    fn test_tick_carries_minutes() {
        let sim = SimulatedTransport::new();
        sim.tick(10);
        let rtc = sim.register(cmd::RTC_TIME).unwrap();
        assert_eq!(&rtc[..3], &[0x03, 0x20, 0x19]);
    }
}
