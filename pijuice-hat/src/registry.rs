//! Host-configurable settings, described and applied by key
//!
//! Front ends (CLI, config files) list the settings with their current value
//! and allowed values, then apply a string value by key.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tracing::info;

use crate::config::{
    profile_names, PowerRegulatorMode, RsocEstimation, RunPinConfig, TempSense, PROFILE_CUSTOM,
    PROFILE_DEFAULT,
};
use crate::diag_log::LogConfigFlag;
use crate::error::PiJuiceError;
use crate::{PiJuice, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    BatteryProfile,
    BatteryTempSense,
    DiagLogConfig,
    RsocEstimation,
    PowerRegulatorMode,
    RunPin,
}

impl SettingKey {
    pub const ALL: [Self; 6] = [
        Self::BatteryProfile,
        Self::BatteryTempSense,
        Self::DiagLogConfig,
        Self::RsocEstimation,
        Self::PowerRegulatorMode,
        Self::RunPin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatteryProfile => "battery_profile",
            Self::BatteryTempSense => "battery_temp_sense",
            Self::DiagLogConfig => "diag_log_config",
            Self::RsocEstimation => "rsoc_estimation",
            Self::PowerRegulatorMode => "power_regulator_mode",
            Self::RunPin => "run_pin",
        }
    }

    pub fn kind(self) -> SettingKind {
        match self {
            Self::DiagLogConfig => SettingKind::Multi,
            _ => SettingKind::Single,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = PiJuiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| PiJuiceError::BadArgument(format!("unknown setting {s}")))
    }
}

impl Serialize for SettingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Whether a setting takes one value or a set of values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    Single,
    /// Values joined with `;`
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingDescriptor {
    pub key: SettingKey,
    pub current: String,
    pub values: Vec<String>,
    pub kind: SettingKind,
}

fn names<T: fmt::Display>(values: impl IntoIterator<Item = T>) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

pub struct SettingsRegistry;

impl SettingsRegistry {
    /// Current and allowed values of every setting
    pub fn describe(pj: &PiJuice) -> Result<Vec<SettingDescriptor>> {
        SettingKey::ALL
            .into_iter()
            .map(|key| Self::describe_one(pj, key))
            .collect()
    }

    pub fn describe_one(pj: &PiJuice, key: SettingKey) -> Result<SettingDescriptor> {
        let config = pj.config();
        let (current, values) = match key {
            SettingKey::BatteryProfile => {
                let status = config.get_battery_profile_status()?;
                let current = status
                    .profile
                    .unwrap_or_else(|| status.validity.to_string());
                let mut values = names([PROFILE_DEFAULT, PROFILE_CUSTOM]);
                values.extend(names(profile_names(pj.firmware_version()?).iter()));
                (current, values)
            }
            SettingKey::BatteryTempSense => (
                config.get_battery_temp_sense()?.to_string(),
                names(TempSense::ALL),
            ),
            SettingKey::DiagLogConfig => {
                let enabled = pj.diag_log().get_config()?;
                (
                    names(enabled).join(";"),
                    names(LogConfigFlag::ALL),
                )
            }
            SettingKey::RsocEstimation => (
                config.get_rsoc_estimation()?.to_string(),
                names(RsocEstimation::ALL),
            ),
            SettingKey::PowerRegulatorMode => (
                config.get_power_regulator_mode()?.to_string(),
                names(PowerRegulatorMode::ALL),
            ),
            SettingKey::RunPin => (
                config.get_run_pin_config()?.to_string(),
                names(RunPinConfig::ALL),
            ),
        };
        Ok(SettingDescriptor {
            key,
            current,
            values,
            kind: key.kind(),
        })
    }

    /// Parse `value` for `key` and write it to the HAT
    pub fn apply(pj: &PiJuice, key: SettingKey, value: &str) -> Result<()> {
        let config = pj.config();
        match key {
            SettingKey::BatteryProfile => config.set_battery_profile(value.trim())?,
            SettingKey::BatteryTempSense => config.set_battery_temp_sense(value.parse()?)?,
            SettingKey::DiagLogConfig => {
                let flags = value
                    .split([';', ','])
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::parse::<LogConfigFlag>)
                    .collect::<Result<Vec<_>>>()?;
                pj.diag_log().set_config(&flags)?
            }
            SettingKey::RsocEstimation => config.set_rsoc_estimation(value.parse()?)?,
            SettingKey::PowerRegulatorMode => config.set_power_regulator_mode(value.parse()?)?,
            SettingKey::RunPin => config.set_run_pin_config(value.parse()?)?,
        }
        info!("Setting {} = {}", key, value.trim());
        Ok(())
    }
}
