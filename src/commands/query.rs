//! Query command handlers.

use super::{yes_no, CommandResult, Context};
use crossterm::style::Stylize;
use pijuice_hat::{
    BatteryExtProfile, BatteryProfile, BatteryProfileStatus, Button, IoConfig, IoMode, IoParameter,
    IoPin, Led, LedBlink, LedConfig, LogConfigFlag, PowerInputState, Rgb, SettingsRegistry,
    Status, Stored, WakeOnCharge,
};
use serde::Serialize;

fn input_state(state: PowerInputState) -> String {
    match state {
        PowerInputState::Present => state.to_string().green().to_string(),
        PowerInputState::NotPresent => state.to_string(),
        _ => state.to_string().yellow().to_string(),
    }
}

fn rgb(c: &Rgb) -> String {
    format!("({}, {}, {}) #{:02X}{:02X}{:02X}", c.r, c.g, c.b, c.r, c.g, c.b)
}

#[derive(Serialize)]
struct StatusReport {
    #[serde(flatten)]
    status: Status,
    charge_level: u8,
    powered: bool,
}

/// Show status flags, charge level and power inputs
pub fn status(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let status = pj.status().get_status()?;
        let report = StatusReport {
            status,
            charge_level: pj.status().get_charge_level()?,
            powered: status.is_powered(),
        };
        ctx.emit(&report, |r| {
            println!("HAT at {}", pj.location());
            println!("  Charge:        {}%", r.charge_level);
            println!("  Battery:       {}", r.status.battery);
            println!("  USB input:     {}", input_state(r.status.power_input));
            println!("  GPIO 5V input: {}", input_state(r.status.power_input_5v_io));
            if r.status.is_fault {
                println!("  Fault:         {}", "yes (see `faults`)".red());
            }
            if r.status.is_button {
                println!("  Button events: pending (see `buttons`)");
            }
        })
    })
}

#[derive(Serialize)]
struct BatteryReport {
    charge_level: u8,
    temperature_c: i8,
    battery_mv: u16,
    battery_ma: i16,
    io_mv: u16,
    io_ma: i16,
}

/// Show battery and GPIO power telemetry
pub fn battery(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let status = pj.status();
        let report = BatteryReport {
            charge_level: status.get_charge_level()?,
            temperature_c: status.get_battery_temperature()?,
            battery_mv: status.get_battery_voltage()?,
            battery_ma: status.get_battery_current()?,
            io_mv: status.get_io_voltage()?,
            io_ma: status.get_io_current()?,
        };
        ctx.emit(&report, |r| {
            println!("Battery:");
            println!("  Charge:      {}%", r.charge_level);
            println!("  Temperature: {} °C", r.temperature_c);
            println!("  Voltage:     {} mV", r.battery_mv);
            println!("  Current:     {} mA", r.battery_ma);
            println!("GPIO 5V:");
            println!("  Voltage:     {} mV", r.io_mv);
            println!("  Current:     {} mA", r.io_ma);
        })
    })
}

/// Show fault flags, optionally clearing them
pub fn faults(ctx: &Context, reset: bool) -> CommandResult {
    ctx.with_device(|pj| {
        let faults = pj.status().get_fault_status()?;
        ctx.emit(&faults, |f| {
            if f.is_clear() {
                println!("No faults");
                return;
            }
            for flag in &f.flags {
                println!("  {}", flag.to_string().red());
            }
            if let Some(temp) = f.charging_temperature_fault {
                println!("  Charging temperature: {}", temp.to_string().yellow());
            }
        })?;
        if reset && !faults.flags.is_empty() {
            pj.status().reset_fault_flags(&faults.flags)?;
            if !ctx.json {
                println!("Fault flags cleared");
            }
        }
        Ok(())
    })
}

/// Show pending button events, optionally acknowledging them
pub fn buttons(ctx: &Context, accept: bool) -> CommandResult {
    ctx.with_device(|pj| {
        let events = pj.status().get_button_events()?;
        ctx.emit(&events, |e| {
            for button in Button::ALL {
                println!("  {}: {}", button, e.get(*button));
            }
        })?;
        if accept {
            for button in Button::ALL {
                pj.status().accept_button_event(*button)?;
            }
        }
        Ok(())
    })
}

#[derive(Serialize)]
struct IoReport {
    pin: IoPin,
    #[serde(flatten)]
    config: Stored<IoConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digital_input: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digital_output: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analog_mv: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pwm_duty_cycle: Option<f32>,
}

/// Show IO pin configuration and the level matching its mode
pub fn io(ctx: &Context, pin: Option<u8>) -> CommandResult {
    let pins = match pin {
        Some(n) => vec![IoPin::from_number(n)?],
        None => IoPin::ALL.to_vec(),
    };
    ctx.with_device(|pj| {
        let mut reports = Vec::new();
        for pin in pins {
            let config = pj.config().get_io_config(pin)?;
            let status = pj.status();
            let mut report = IoReport {
                pin,
                config,
                digital_input: None,
                digital_output: None,
                analog_mv: None,
                pwm_duty_cycle: None,
            };
            match config.value.mode {
                IoMode::NotUsed => {}
                IoMode::AnalogIn => report.analog_mv = Some(status.get_io_analog_input(pin)?),
                IoMode::DigitalIn => report.digital_input = Some(status.get_io_digital_input(pin)?),
                IoMode::DigitalOutPushPull | IoMode::DigitalIoOpenDrain => {
                    report.digital_input = Some(status.get_io_digital_input(pin)?);
                    report.digital_output = Some(status.get_io_digital_output(pin)?);
                }
                IoMode::PwmOutPushPull | IoMode::PwmOutOpenDrain => {
                    report.pwm_duty_cycle = Some(status.get_io_pwm(pin)?)
                }
            }
            reports.push(report);
        }
        ctx.emit(&reports, |reports| {
            for r in reports {
                let cfg = &r.config.value;
                println!("{}: {} pull {}", r.pin, cfg.mode, cfg.pull);
                match cfg.parameter {
                    IoParameter::Wakeup { wakeup } => println!("  Wakeup:   {wakeup}"),
                    IoParameter::Value { value } => println!("  Value:    {value}"),
                    IoParameter::Pwm {
                        period_us,
                        duty_cycle,
                    } => println!("  PWM:      {period_us} µs period, {duty_cycle}% configured"),
                }
                if let Some(v) = r.digital_input {
                    println!("  Input:    {}", u8::from(v));
                }
                if let Some(v) = r.digital_output {
                    println!("  Output:   {}", u8::from(v));
                }
                if let Some(mv) = r.analog_mv {
                    println!("  Analog:   {mv} mV");
                }
                if let Some(dc) = r.pwm_duty_cycle {
                    println!("  Duty:     {dc}%");
                }
                println!("  Stored:   {}", yes_no(r.config.non_volatile));
            }
        })
    })
}

/// Show firmware version
pub fn firmware(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let version = pj.config().get_firmware_version()?;
        ctx.emit(&version, |v| {
            println!("Firmware: {} (variant {})", v, v.variant);
        })
    })
}

#[derive(Serialize)]
struct ProfileReport {
    status: BatteryProfileStatus,
    profile: Option<BatteryProfile>,
    ext_profile: Option<BatteryExtProfile>,
    charging_enabled: Stored<bool>,
}

/// Show battery profile status and data
pub fn profile(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let config = pj.config();
        let report = ProfileReport {
            status: config.get_battery_profile_status()?,
            profile: config.get_battery_profile()?,
            ext_profile: if pj.firmware_version()?.at_least(1, 4) {
                config.get_battery_ext_profile()?
            } else {
                None
            },
            charging_enabled: config.get_charging_config()?,
        };
        ctx.emit(&report, |r| {
            let s = &r.status;
            println!(
                "Profile:  {}",
                s.profile.as_deref().unwrap_or("-").bold()
            );
            println!("  Validity: {}", s.validity);
            if let (Some(source), Some(origin)) = (s.source, s.origin) {
                println!("  Source:   {source} ({origin})");
            }
            println!(
                "  Charging: {}",
                if r.charging_enabled.value { "enabled" } else { "disabled" }
            );
            match &r.profile {
                Some(p) => {
                    if p.capacity == u32::MAX {
                        println!("  Capacity:           unspecified");
                    } else {
                        println!("  Capacity:           {} mAh", p.capacity);
                    }
                    println!("  Charge current:     {} mA", p.charge_current);
                    println!("  Termination:        {} mA", p.termination_current);
                    println!("  Regulation voltage: {} mV", p.regulation_voltage);
                    println!("  Cutoff voltage:     {} mV", p.cutoff_voltage);
                    println!(
                        "  Temperatures:       cold {} / cool {} / warm {} / hot {} °C",
                        p.temp_cold, p.temp_cool, p.temp_warm, p.temp_hot
                    );
                    println!("  NTC:                B {}, {} Ω", p.ntc_b, p.ntc_resistance);
                }
                None => println!("  Profile data:       {}", "INVALID".yellow()),
            }
            if let Some(ext) = &r.ext_profile {
                println!("  Chemistry:          {}", ext.chemistry);
                println!(
                    "  OCV 10/50/90:       {} / {} / {} mV",
                    ext.ocv10, ext.ocv50, ext.ocv90
                );
                println!(
                    "  R 10/50/90:         {} / {} / {} mΩ",
                    ext.r10, ext.r50, ext.r90
                );
            }
        })
    })
}

/// List host-configurable settings
pub fn settings(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let settings = SettingsRegistry::describe(pj)?;
        ctx.emit(&settings, |settings| {
            for s in settings {
                println!("{} = {}", s.key.to_string().bold(), s.current);
                println!("    values: {}", s.values.join(", "));
            }
        })
    })
}

/// Show the RTC time
pub fn time(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let time = pj.rtc().get_time()?;
        ctx.emit(&time, |t| {
            println!("RTC:  {t}");
            if let Some(rtc) = t.to_naive() {
                let host = chrono::Utc::now().naive_utc();
                let drift = (rtc - host).num_seconds();
                println!("Host: {} UTC ({drift:+} s)", host.format("%Y-%m-%d %H:%M:%S"));
            }
        })
    })
}

#[derive(Serialize)]
struct AlarmReport {
    alarm: pijuice_hat::Alarm,
    #[serde(flatten)]
    control: pijuice_hat::ControlStatus,
}

/// Show the wake-up alarm and its control flags
pub fn alarm(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let report = AlarmReport {
            alarm: pj.rtc().get_alarm()?,
            control: pj.rtc().get_control_status()?,
        };
        ctx.emit(&report, |r| {
            println!("Alarm:   {}", r.alarm);
            println!("  Wake-up enabled: {}", yes_no(r.control.wakeup_enabled));
            println!("  Alarm fired:     {}", yes_no(r.control.alarm_flag));
        })
    })
}

#[derive(Serialize)]
struct LedReport {
    led: Led,
    config: LedConfig,
    state: Rgb,
    blink: LedBlink,
}

/// Show configuration, colour and blink pattern of both LEDs
pub fn led(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let mut reports = Vec::new();
        for &led in Led::ALL {
            reports.push(LedReport {
                led,
                config: pj.config().get_led_config(led)?,
                state: pj.status().get_led_state(led)?,
                blink: pj.status().get_led_blink(led)?,
            });
        }
        ctx.emit(&reports, |reports| {
            for r in reports {
                println!("{}: {}", r.led, r.config.function);
                println!("  Configured: {}", rgb(&r.config.color));
                println!("  Current:    {}", rgb(&r.state));
                if r.blink.count > 0 {
                    println!(
                        "  Blink:      x{} {} {} ms / {} {} ms",
                        r.blink.count,
                        rgb(&r.blink.rgb1),
                        r.blink.period1_ms,
                        rgb(&r.blink.rgb2),
                        r.blink.period2_ms
                    );
                }
            }
        })
    })
}

#[derive(Serialize)]
struct PowerReport {
    power_off_s: Option<u8>,
    wakeup_on_charge: Stored<WakeOnCharge>,
    watchdog_min: Stored<u32>,
    system_power_switch_ma: u32,
}

/// Show power-off timer, wake-on-charge, watchdog and power switch
pub fn power(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let power = pj.power();
        let report = PowerReport {
            power_off_s: power.get_power_off()?,
            wakeup_on_charge: power.get_wakeup_on_charge()?,
            watchdog_min: power.get_watchdog()?,
            system_power_switch_ma: power.get_system_power_switch()?,
        };
        ctx.emit(&report, |r| {
            match r.power_off_s {
                Some(s) => println!("Power-off:        in {} s", s.to_string().red()),
                None => println!("Power-off:        not armed"),
            }
            println!(
                "Wake-on-charge:   {}{}",
                r.wakeup_on_charge.value,
                if r.wakeup_on_charge.non_volatile { " (stored)" } else { "" }
            );
            match r.watchdog_min.value {
                0 => println!("Watchdog:         disabled"),
                m => println!("Watchdog:         {m} min"),
            }
            match r.system_power_switch_ma {
                0 => println!("System switch:    off"),
                ma => println!("System switch:    {ma} mA"),
            }
        })
    })
}

/// Read the diagnostic event log
pub fn log(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let entries = pj.diag_log().read_entries()?;
        ctx.emit(&entries, |entries| {
            if entries.is_empty() {
                println!("Log is empty");
            }
            for entry in entries {
                println!("{entry}");
            }
        })
    })
}

/// Show which events are logged
pub fn log_config(ctx: &Context) -> CommandResult {
    ctx.with_device(|pj| {
        let enabled = pj.diag_log().get_config()?;
        ctx.emit(&enabled, |enabled| {
            for flag in LogConfigFlag::ALL {
                let mark = if enabled.contains(flag) { "[x]" } else { "[ ]" };
                println!("{mark} {flag}");
            }
        })
    })
}
