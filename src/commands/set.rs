//! Setting command handlers.

use super::{CommandResult, Context};
use crossterm::style::Stylize;
use pijuice_hat::{
    Alarm, AlarmDay, AlarmHour, AlarmMinute, Led, LedConfig, LedFunction, LogConfigFlag, Rgb,
    SettingKey, SettingsRegistry, WakeOnCharge,
};

fn done(ctx: &Context, what: impl std::fmt::Display) {
    if !ctx.json {
        println!("{} {}", "✓".green(), what);
    }
}

/// Select a battery profile by name
pub fn set_profile(ctx: &Context, name: &str) -> CommandResult {
    ctx.with_device(|pj| {
        pj.config().set_battery_profile(name.trim())?;
        done(ctx, format!("Battery profile set to {name}"));
        Ok(())
    })
}

/// Apply a registry setting
pub fn set(ctx: &Context, key: &str, value: &str) -> CommandResult {
    let key: SettingKey = key.parse()?;
    ctx.with_device(|pj| {
        SettingsRegistry::apply(pj, key, value)?;
        let setting = SettingsRegistry::describe_one(pj, key)?;
        ctx.emit(&setting, |s| {
            done(ctx, format!("{} = {}", s.key, s.current));
        })
    })
}

/// Set the RTC from the host clock
pub fn sync_time(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let time = pj.rtc().set_time_now()?;
        ctx.emit(&time, |t| done(ctx, format!("RTC set to {t} UTC")))
    })
}

/// Build an alarm from command-line fields
pub fn build_alarm(
    second: Option<u8>,
    minute: Option<u8>,
    minute_period: Option<u8>,
    hour: &str,
    day: Option<&str>,
    weekday: Option<&str>,
) -> anyhow::Result<Alarm> {
    let minute = match (minute, minute_period) {
        (_, Some(period)) => AlarmMinute::Every(period),
        (Some(minute), None) => AlarmMinute::At(minute),
        (None, None) => AlarmMinute::At(0),
    };
    let day = match (day, weekday) {
        (Some(day), _) => AlarmDay::parse_day(day)?,
        (None, Some(weekday)) => AlarmDay::parse_weekdays(weekday)?,
        (None, None) => AlarmDay::EveryDay,
    };
    Ok(Alarm {
        second,
        minute,
        hour: hour.parse::<AlarmHour>()?,
        day,
    })
}

/// Program the wake-up alarm
pub fn set_alarm(ctx: &Context, alarm: &Alarm) -> CommandResult {
    ctx.with_device(|pj| {
        pj.rtc().set_alarm(alarm)?;
        ctx.emit(alarm, |a| done(ctx, format!("Alarm set: {a}")))
    })
}

/// Enable or disable alarm wake-up, optionally clearing the alarm flag
pub fn wakeup(ctx: &Context, enable: Option<bool>, clear_flag: bool) -> CommandResult {
    ctx.with_device(|pj| {
        let rtc = pj.rtc();
        if let Some(enable) = enable {
            rtc.set_wakeup_enabled(enable)?;
        }
        if clear_flag {
            rtc.clear_alarm_flag()?;
        }
        let control = rtc.get_control_status()?;
        ctx.emit(&control, |c| {
            println!(
                "Wake-up {}, alarm flag {}",
                if c.wakeup_enabled { "enabled" } else { "disabled" },
                if c.alarm_flag { "set" } else { "clear" }
            );
        })
    })
}

/// Set an LED colour, or its configuration when a function is given
pub fn set_led(ctx: &Context, led: &str, color: Rgb, function: Option<&str>) -> CommandResult {
    let led: Led = led.parse()?;
    let function = function
        .map(str::parse::<LedFunction>)
        .transpose()?;
    ctx.with_device(|pj| {
        match function {
            Some(function) => {
                pj.config()
                    .set_led_config(led, &LedConfig { function, color })?;
                done(ctx, format!("{led} configured as {function} ({}, {}, {})", color.r, color.g, color.b));
            }
            None => {
                pj.status().set_led_state(led, color)?;
                done(ctx, format!("{led} set to ({}, {}, {})", color.r, color.g, color.b));
            }
        }
        Ok(())
    })
}

/// Arm or cancel the delayed power-off
pub fn set_power_off(ctx: &Context, delay: Option<u8>, cancel: bool) -> CommandResult {
    ctx.with_device(|pj| {
        match (cancel, delay) {
            (true, _) | (false, None) => {
                pj.power().cancel_power_off()?;
                done(ctx, "Power-off cancelled");
            }
            (false, Some(delay)) => {
                pj.power().set_power_off(delay)?;
                done(ctx, format!("Power will be cut in {delay} s"));
            }
        }
        Ok(())
    })
}

/// Set the wake-on-charge level
pub fn set_wake_on_charge(ctx: &Context, value: &str, non_volatile: bool) -> CommandResult {
    let wake: WakeOnCharge = value.parse()?;
    ctx.with_device(|pj| {
        pj.power().set_wakeup_on_charge(wake, non_volatile)?;
        done(ctx, format!("Wake-on-charge set to {wake}"));
        Ok(())
    })
}

/// Set the watchdog timeout
pub fn set_watchdog(ctx: &Context, minutes: u32, non_volatile: bool) -> CommandResult {
    ctx.with_device(|pj| {
        pj.power().set_watchdog(minutes, non_volatile)?;
        let stored = pj.power().get_watchdog()?;
        if stored.value != minutes {
            tracing::warn!("Watchdog rounded to {} min", stored.value);
        }
        ctx.emit(&stored, |s| match s.value {
            0 => done(ctx, "Watchdog disabled"),
            m => done(ctx, format!("Watchdog set to {m} min")),
        })
    })
}

/// Select the logged diagnostic events
pub fn set_log_config(ctx: &Context, flags: &[String]) -> CommandResult {
    let flags = flags
        .iter()
        .map(|f| f.trim().parse::<LogConfigFlag>())
        .collect::<Result<Vec<_>, _>>()?;
    ctx.with_device(|pj| {
        pj.diag_log().set_config(&flags)?;
        let enabled = pj.diag_log().get_config()?;
        ctx.emit(&enabled, |enabled| {
            let names: Vec<&str> = enabled.iter().map(|f| f.as_str()).collect();
            done(ctx, format!("Logging: {}", names.join(", ")));
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pijuice_hat::Hour;

    #[test]
    fn test_build_alarm_defaults() {
        let alarm = build_alarm(None, None, None, "EVERY_HOUR", None, None).unwrap();
        assert_eq!(alarm.second, None);
        assert_eq!(alarm.minute, AlarmMinute::At(0));
        assert_eq!(alarm.hour, AlarmHour::EveryHour);
        assert_eq!(alarm.day, AlarmDay::EveryDay);
    }

    #[test]
    fn test_build_alarm_weekdays() {
        let alarm = build_alarm(Some(0), None, Some(15), "7", None, Some("2;3")).unwrap();
        assert_eq!(alarm.minute, AlarmMinute::Every(15));
        assert_eq!(alarm.hour, AlarmHour::At(Hour::H24(7)));
        assert_eq!(alarm.day, AlarmDay::Weekdays(vec![2, 3]));
    }

    #[test]
    fn test_build_alarm_rejects_bad_day() {
        assert!(build_alarm(None, Some(0), None, "EVERY_HOUR", Some("32"), None).is_err());
        assert!(build_alarm(None, Some(0), None, "EVERY_HOUR", None, Some("8")).is_err());
    }
}
