//! TOML configuration for the host tool

use std::path::{Path, PathBuf};
use std::time::Duration;

use pijuice_transport::protocol::{DEFAULT_ADDRESS, DEFAULT_BUS};
use pijuice_transport::{BusAddress, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Overrides for the bus retry policy; unset fields keep the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_tries: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub backoff_step_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub io_cooldown_ms: Option<u64>,
    /// 0 disables the busy-device timeout
    pub transfer_timeout_ms: Option<u64>,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(tries) = self.max_tries {
            policy.max_tries = tries.max(1);
        }
        if let Some(ms) = self.backoff_ms {
            policy.backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backoff_step_ms {
            policy.backoff_step = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_backoff_ms {
            policy.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.io_cooldown_ms {
            policy.io_cooldown = Duration::from_millis(ms);
        }
        if let Some(ms) = self.transfer_timeout_ms {
            policy.transfer_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        policy
    }
}

/// Host tool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// I2C bus number
    #[serde(default = "default_bus")]
    pub bus: u8,
    /// 7-bit device address
    #[serde(default = "default_address")]
    pub address: u8,
    /// Status polling period; also the status cache lifetime
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Delay between the shutdown request and the HAT cutting power
    #[serde(default = "default_power_off_delay")]
    pub power_off_delay_secs: u8,
    /// Percent above the current charge at which the HAT wakes the host;
    /// negative disables wake-on-charge
    #[serde(default = "default_wakeon_delta")]
    pub wakeon_delta: i32,
    /// Log filter used when RUST_LOG is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_bus() -> u8 {
    DEFAULT_BUS
}

fn default_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_scan_interval() -> u64 {
    30
}

fn default_power_off_delay() -> u8 {
    30
}

fn default_wakeon_delta() -> i32 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bus: default_bus(),
            address: default_address(),
            scan_interval_secs: default_scan_interval(),
            power_off_delay_secs: default_power_off_delay(),
            wakeon_delta: default_wakeon_delta(),
            log_level: None,
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Default config file path (~/.config/pijups/pijups.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pijups")
            .join("pijups.toml")
    }

    /// Load config from a file, or return defaults if it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to a file, creating parent directories
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn location(&self) -> BusAddress {
        BusAddress::new(self.bus, self.address)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}
