// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a byte given in decimal or 0x-prefixed hex
pub fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte {s:?}: {e}"))
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "enable" => Ok(true),
        "off" | "false" | "0" | "disable" => Ok(false),
        _ => Err(format!("expected on or off, got {s:?}")),
    }
}

#[derive(Parser)]
#[command(name = "pijups")]
#[command(author, version, about = "PiJuice UPS HAT host tool")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/pijups/pijups.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// I2C bus number (overrides the config file)
    #[arg(long, global = true)]
    pub bus: Option<u8>,

    /// Device address, decimal or 0x-prefixed (overrides the config file)
    #[arg(long, global = true, value_parser = parse_byte)]
    pub address: Option<u8>,

    /// Talk to an in-memory simulated HAT instead of the bus
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Print every bus frame
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump of monitored frames
    #[arg(long, global = true)]
    pub hex: bool,

    /// Filter monitored frames (all, reads, writes, cmd=0xNN)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Status Commands ===
    /// Show status flags, charge level and power inputs
    #[command(visible_alias = "s")]
    Status,

    /// Show battery and GPIO power telemetry
    #[command(visible_aliases = ["bat", "b"])]
    Battery,

    /// Show fault flags
    Faults {
        /// Clear the reported flags afterwards
        #[arg(long)]
        reset: bool,
    },

    /// Show pending button events
    Buttons {
        /// Acknowledge the events of all buttons
        #[arg(long)]
        accept: bool,
    },

    /// Show IO pin configuration and levels
    Io {
        /// Pin number (1 or 2); both when omitted
        pin: Option<u8>,
    },

    // === Configuration Commands ===
    /// Show firmware version
    #[command(visible_aliases = ["version", "ver"])]
    Firmware,

    /// Show battery profile status and data
    #[command(visible_alias = "p")]
    Profile,

    /// Select a battery profile (DEFAULT, CUSTOM or a profile name)
    SetProfile { name: String },

    /// List host-configurable settings with current and allowed values
    Settings,

    /// Change a setting listed by `settings`
    Set {
        /// Setting key, e.g. run_pin
        key: String,
        /// New value; multi-value settings take a ;-separated list
        value: String,
    },

    // === RTC Commands ===
    /// Show the RTC time
    #[command(visible_alias = "t")]
    Time,

    /// Set the RTC to the host's current UTC time
    SyncTime,

    /// Show the wake-up alarm
    Alarm,

    /// Program the wake-up alarm
    SetAlarm {
        /// Second to fire at; every second when omitted
        #[arg(long)]
        second: Option<u8>,
        /// Minute to fire at
        #[arg(long, conflicts_with = "minute_period")]
        minute: Option<u8>,
        /// Fire every N minutes instead
        #[arg(long)]
        minute_period: Option<u8>,
        /// Hour spec: N, "N AM", "a;b;...", or EVERY_HOUR
        #[arg(long, default_value = "EVERY_HOUR")]
        hour: String,
        /// Day of month, or EVERY_DAY
        #[arg(long, conflicts_with = "weekday")]
        day: Option<String>,
        /// Weekday spec: N, "a;b;...", or EVERY_DAY (1 = Sunday)
        #[arg(long)]
        weekday: Option<String>,
    },

    /// Show or change alarm wake-up
    Wakeup {
        /// on or off
        #[arg(value_parser = parse_on_off)]
        enable: Option<bool>,
        /// Clear the alarm flag
        #[arg(long)]
        clear_flag: bool,
    },

    // === LED Commands ===
    /// Show LED configuration, colour and blink pattern
    #[command(visible_alias = "l")]
    Led,

    /// Set an LED colour; with --function also its configuration
    SetLed {
        /// D1 or D2
        led: String,
        r: u8,
        g: u8,
        b: u8,
        /// NOT_USED, CHARGE_STATUS, ON_OFF_STATUS or USER_LED
        #[arg(long)]
        function: Option<String>,
    },

    // === Power Commands ===
    /// Show power-off timer, wake-on-charge, watchdog and power switch
    Power,

    /// Arm or cancel the delayed power-off
    SetPowerOff {
        /// Seconds until power is cut (0-254)
        #[arg(required_unless_present = "cancel")]
        delay: Option<u8>,
        #[arg(long)]
        cancel: bool,
    },

    /// Set the wake-on-charge level (percent or DISABLED)
    SetWakeOnCharge {
        value: String,
        /// Persist across HAT power cycles
        #[arg(long)]
        non_volatile: bool,
    },

    /// Set the watchdog timeout in minutes (0 disables)
    SetWatchdog {
        minutes: u32,
        /// Persist across HAT power cycles
        #[arg(long)]
        non_volatile: bool,
    },

    // === Diagnostic Log Commands ===
    /// Read the diagnostic event log
    Log,

    /// Show which events are logged
    LogConfig,

    /// Select the logged events
    SetLogConfig {
        /// Event names (OTHER, 5VREG_ON, 5VREG_OFF, WAKEUP_EVT, ALARM_EVT, MCU_RESET)
        flags: Vec<String>,
    },

    // === Host Commands ===
    /// Arm wake-on-charge and the delayed power-off, then signal shutdown
    Shutdown {
        /// Seconds until power is cut (default from config)
        #[arg(long)]
        delay: Option<u8>,
        /// Wake when charge rises this many percent; negative disables
        #[arg(long, allow_hyphen_values = true)]
        wakeon_delta: Option<i32>,
    },

    /// Search I2C buses for HATs
    Scan {
        /// Buses to search (default 1 and 2)
        #[arg(long = "search-bus")]
        buses: Vec<u8>,
        /// Addresses to try (default 0x00-0x7F)
        #[arg(long = "search-address", value_parser = parse_byte)]
        addresses: Vec<u8>,
    },

    /// Poll status every scan interval until interrupted
    Watch,

    /// Configuration file commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("0x14"), Ok(0x14));
        assert_eq!(parse_byte("20"), Ok(20));
        assert!(parse_byte("0x100").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pijups", "status", "--address", "0x15", "--json"]).unwrap();
        assert_eq!(cli.address, Some(0x15));
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn test_set_alarm_args() {
        let cli = Cli::try_parse_from([
            "pijups",
            "set-alarm",
            "--minute",
            "30",
            "--hour",
            "7 AM",
            "--weekday",
            "2;3;4;5;6",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::SetAlarm {
                second,
                minute,
                hour,
                weekday,
                ..
            }) => {
                assert_eq!(second, None);
                assert_eq!(minute, Some(30));
                assert_eq!(hour, "7 AM");
                assert_eq!(weekday.as_deref(), Some("2;3;4;5;6"));
            }
            _ => panic!("expected set-alarm"),
        }
        assert!(Cli::try_parse_from(["pijups", "set-alarm", "--day", "1", "--weekday", "2"]).is_err());
    }

    #[test]
    fn test_shutdown_negative_delta() {
        let cli = Cli::try_parse_from(["pijups", "shutdown", "--wakeon-delta", "-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Shutdown {
                wakeon_delta: Some(-1),
                delay: None
            })
        ));
    }

    #[test]
    fn test_wakeup_on_off() {
        let cli = Cli::try_parse_from(["pijups", "wakeup", "off"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Wakeup {
                enable: Some(false),
                clear_flag: false
            })
        ));
    }
}
