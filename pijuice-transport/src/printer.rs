//! PrinterTransport middleware for monitoring bus traffic
//!
//! This module provides a middleware that wraps any Transport implementation
//! and prints every frame passing through it to stderr.
//!
//! # Example
//!
//! ```ignore
//! use pijuice_transport::{open_bus, BusAddress, PrinterConfig, PrinterTransport};
//!
//! let transport = open_bus(BusAddress::new(1, 0x14))?;
//! let config = PrinterConfig::default().with_hex(true);
//! let monitored = PrinterTransport::wrap(transport, config);
//! // Now all reads/writes will be printed
//! ```

use std::str::FromStr;
use std::sync::Arc;

use crossterm::style::Stylize;

use crate::protocol::{self, cmd};
use crate::{BoxedTransport, Transport, TransportDeviceInfo, TransportError};

/// Packet filter for selective display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PacketFilter {
    #[default]
    All,
    Reads,
    Writes,
    Cmd(u8),
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "reads" | "read" => Ok(Self::Reads),
            "writes" | "write" => Ok(Self::Writes),
            s if s.starts_with("cmd=") || s.starts_with("0x") => {
                let hex_str = s.strip_prefix("cmd=").unwrap_or(s);
                let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
                u8::from_str_radix(hex_str, 16)
                    .map(Self::Cmd)
                    .map_err(|e| format!("Invalid command byte: {}", e))
            }
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// Configuration for the PrinterTransport
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show raw hex dump of the whole frame
    pub show_hex: bool,
    /// Filter for selective display
    pub filter: PacketFilter,
}

impl PrinterConfig {
    /// Create config with hex output setting
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }

    /// Create config with filter
    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Transport middleware that prints all frames
pub struct PrinterTransport {
    inner: BoxedTransport,
    config: PrinterConfig,
}

impl PrinterTransport {
    /// Wrap a transport with printing middleware
    pub fn wrap(transport: BoxedTransport, config: PrinterConfig) -> BoxedTransport {
        Arc::new(Self {
            inner: transport,
            config,
        })
    }

    fn should_show(&self, register: u8, is_write: bool) -> bool {
        match &self.config.filter {
            PacketFilter::All => true,
            PacketFilter::Reads => !is_write,
            PacketFilter::Writes => is_write,
            PacketFilter::Cmd(c) => *c == register,
        }
    }

    /// Print a frame written to the device
    fn print_write(&self, register: u8, frame: &[u8]) {
        if !self.should_show(register, true) {
            return;
        }
        let payload = frame.split_last().map(|(_, p)| p).unwrap_or_default();
        eprintln!(
            "{} {}  0x{:02x} {} {:02x?}",
            ">>>".cyan(),
            "CMD".cyan().bold(),
            register,
            cmd::name(register).yellow(),
            payload
        );
        if self.config.show_hex {
            eprintln!("    {}  {:02x?}", "HEX".dim(), frame);
        }
    }

    /// Print a frame read from the device
    fn print_read(&self, register: u8, frame: &[u8]) {
        if !self.should_show(register, false) {
            return;
        }
        let payload = frame.split_last().map(|(_, p)| p).unwrap_or_default();
        if protocol::verify_checksum(frame) {
            eprintln!(
                "{} {}  0x{:02x} {} {:02x?}",
                "<<<".green(),
                "RSP".green().bold(),
                register,
                cmd::name(register).yellow(),
                payload
            );
        } else {
            eprintln!(
                "{} {}  0x{:02x} {} {} {:02x?}",
                "<<<".green(),
                "RSP".green().bold(),
                register,
                cmd::name(register).yellow(),
                "BAD FCS".red().bold(),
                payload
            );
        }
        if self.config.show_hex {
            eprintln!("    {}  {:02x?}", "HEX".dim(), frame);
        }
    }

    /// Print a failed transfer
    fn print_error(&self, register: u8, is_write: bool, err: &TransportError) {
        if !self.should_show(register, is_write) {
            return;
        }
        let arrow = if is_write { ">>>" } else { "<<<" };
        eprintln!(
            "{} {}  0x{:02x} {} {}",
            arrow.red(),
            "ERR".red().bold(),
            register,
            cmd::name(register).yellow(),
            err
        );
    }
}

impl Transport for PrinterTransport {
    fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        match self.inner.read(register, len) {
            Ok(frame) => {
                self.print_read(register, &frame);
                Ok(frame)
            }
            Err(e) => {
                self.print_error(register, false, &e);
                Err(e)
            }
        }
    }

    fn write(&self, register: u8, data: &[u8]) -> Result<(), TransportError> {
        self.print_write(register, data);
        self.inner.write(register, data).inspect_err(|e| {
            self.print_error(register, true, e);
        })
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedTransport;

    #[test]
    fn test_packet_filter_parse() {
        assert_eq!("all".parse::<PacketFilter>().unwrap(), PacketFilter::All);
        assert_eq!("".parse::<PacketFilter>().unwrap(), PacketFilter::All);
        assert_eq!("reads".parse::<PacketFilter>().unwrap(), PacketFilter::Reads);
        assert_eq!("WRITE".parse::<PacketFilter>().unwrap(), PacketFilter::Writes);
        assert_eq!(
            "cmd=0x40".parse::<PacketFilter>().unwrap(),
            PacketFilter::Cmd(0x40)
        );
        assert_eq!("0xb9".parse::<PacketFilter>().unwrap(), PacketFilter::Cmd(0xB9));
        assert!("cmd=zz".parse::<PacketFilter>().is_err());
        assert!("bogus".parse::<PacketFilter>().is_err());
    }

    #[test]
    fn test_filter_selects_direction() {
        let printer = PrinterTransport {
            inner: Arc::new(SimulatedTransport::new()),
            config: PrinterConfig::default().with_filter(PacketFilter::Writes),
        };
        assert!(printer.should_show(cmd::STATUS, true));
        assert!(!printer.should_show(cmd::STATUS, false));
    }

    #[test]
    fn test_wrapped_transport_passes_frames_through() {
        let sim = Arc::new(SimulatedTransport::new());
        let printer = PrinterTransport::wrap(sim.clone(), PrinterConfig::default());
        let frame = printer.read(cmd::FIRMWARE_VERSION, 3).unwrap();
        assert_eq!(frame, vec![0x16, 0x00, 0xE9]);
        printer
            .write(cmd::POWER_OFF, &protocol::append_checksum(&[10]))
            .unwrap();
        assert_eq!(sim.register(cmd::POWER_OFF), Some(vec![10]));
        assert_eq!(printer.device_info().location.address, 0x14);
    }
}
