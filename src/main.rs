//! PiJuice UPS HAT host tool
//!
//! Reads status and telemetry, changes settings, programs the RTC alarm and
//! arms the power-off sequence from the command line.

use clap::Parser;
use pijuice_hat::Rgb;
use pijups::AppConfig;
use tracing::debug;

// CLI definitions
mod cli;
use cli::{Cli, Commands, ConfigCommands};

// Command handlers
mod commands;
use commands::{query, set, utility, Context};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path)?;
    if let Some(bus) = cli.bus {
        config.bus = bus;
    }
    if let Some(address) = cli.address {
        config.address = address;
    }

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    debug!("Using {} from {}", config.location(), config_path.display());

    let printer = commands::create_printer_config(cli.monitor, cli.hex, cli.filter.as_deref())?;
    let ctx = Context {
        config,
        json: cli.json,
        simulate: cli.simulate,
        printer,
    };

    match cli.command {
        // Default: show status
        None | Some(Commands::Status) => query::status(&ctx)?,

        // === Status Commands ===
        Some(Commands::Battery) => query::battery(&ctx)?,
        Some(Commands::Faults { reset }) => query::faults(&ctx, reset)?,
        Some(Commands::Buttons { accept }) => query::buttons(&ctx, accept)?,
        Some(Commands::Io { pin }) => query::io(&ctx, pin)?,

        // === Configuration Commands ===
        Some(Commands::Firmware) => query::firmware(&ctx)?,
        Some(Commands::Profile) => query::profile(&ctx)?,
        Some(Commands::SetProfile { name }) => set::set_profile(&ctx, &name)?,
        Some(Commands::Settings) => query::settings(&ctx)?,
        Some(Commands::Set { key, value }) => set::set(&ctx, &key, &value)?,

        // === RTC Commands ===
        Some(Commands::Time) => query::time(&ctx)?,
        Some(Commands::SyncTime) => set::sync_time(&ctx)?,
        Some(Commands::Alarm) => query::alarm(&ctx)?,
        Some(Commands::SetAlarm {
            second,
            minute,
            minute_period,
            hour,
            day,
            weekday,
        }) => {
            let alarm = set::build_alarm(
                second,
                minute,
                minute_period,
                &hour,
                day.as_deref(),
                weekday.as_deref(),
            )?;
            set::set_alarm(&ctx, &alarm)?;
        }
        Some(Commands::Wakeup { enable, clear_flag }) => set::wakeup(&ctx, enable, clear_flag)?,

        // === LED Commands ===
        Some(Commands::Led) => query::led(&ctx)?,
        Some(Commands::SetLed {
            led,
            r,
            g,
            b,
            function,
        }) => set::set_led(&ctx, &led, Rgb::new(r, g, b), function.as_deref())?,

        // === Power Commands ===
        Some(Commands::Power) => query::power(&ctx)?,
        Some(Commands::SetPowerOff { delay, cancel }) => set::set_power_off(&ctx, delay, cancel)?,
        Some(Commands::SetWakeOnCharge {
            value,
            non_volatile,
        }) => set::set_wake_on_charge(&ctx, &value, non_volatile)?,
        Some(Commands::SetWatchdog {
            minutes,
            non_volatile,
        }) => set::set_watchdog(&ctx, minutes, non_volatile)?,

        // === Diagnostic Log Commands ===
        Some(Commands::Log) => query::log(&ctx)?,
        Some(Commands::LogConfig) => query::log_config(&ctx)?,
        Some(Commands::SetLogConfig { flags }) => set::set_log_config(&ctx, &flags)?,

        // === Host Commands ===
        Some(Commands::Shutdown {
            delay,
            wakeon_delta,
        }) => utility::shutdown(&ctx, delay, wakeon_delta)?,
        Some(Commands::Scan { buses, addresses }) => utility::scan(&ctx, &buses, &addresses)?,
        Some(Commands::Watch) => utility::watch(&ctx).await?,
        Some(Commands::Config(ConfigCommands::Init { force })) => {
            utility::config_init(&ctx.config, &config_path, force)?
        }
        Some(Commands::Config(ConfigCommands::Show)) => utility::config_show(&ctx, &config_path)?,
    }

    Ok(())
}
