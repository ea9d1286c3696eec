//! Host command handlers.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::bail;
use crossterm::style::Stylize;
use pijuice_hat::{PiJuice, PiJuiceHandle, Status};
use pijuice_transport::{FlowControlTransport, RetryPolicy, SimulatedTransport};
use pijups::{scan as scan_buses, AppConfig, SessionOptions, UpsSession, SCAN_BUSES};
use serde::Serialize;
use tracing::{info, warn};

use super::{setup_interrupt_handler, CommandResult, Context};

fn session_options(config: &AppConfig) -> SessionOptions {
    SessionOptions {
        address: config.address,
        scan_interval: config.scan_interval(),
        ..SessionOptions::default()
    }
}

#[derive(Serialize)]
struct ShutdownReport {
    wakeup_on_charge: pijuice_hat::WakeOnCharge,
    power_off_s: u8,
}

/// Arm wake-on-charge and the delayed power-off
pub fn shutdown(ctx: &Context, delay: Option<u8>, wakeon_delta: Option<i32>) -> CommandResult {
    let delay = delay.unwrap_or(ctx.config.power_off_delay_secs);
    let delta = wakeon_delta.unwrap_or(ctx.config.wakeon_delta);
    let session = UpsSession::connect(ctx.open()?, &session_options(&ctx.config))?;
    let wake = session.power_off(delta, delay)?;
    let report = ShutdownReport {
        wakeup_on_charge: wake,
        power_off_s: delay,
    };
    ctx.emit(&report, |r| {
        println!(
            "{} HAT cuts power in {} s, wakes at {}% charge",
            "⏻".red(),
            r.power_off_s,
            r.wakeup_on_charge
        );
        println!("Halt the host now.");
    })
}

/// Search buses for HATs
pub fn scan(ctx: &Context, buses: &[u8], addresses: &[u8]) -> CommandResult {
    let buses = if buses.is_empty() { SCAN_BUSES.to_vec() } else { buses.to_vec() };
    let addresses: Vec<u8> = if addresses.is_empty() {
        (0x00..=0x7F).collect()
    } else {
        addresses.to_vec()
    };
    info!("Scanning buses {:?} at {} addresses", buses, addresses.len());

    // One attempt per address; empty addresses only time out
    let single_try = RetryPolicy {
        max_tries: 1,
        ..RetryPolicy::immediate()
    };
    let found = if ctx.simulate {
        scan_buses(&buses, &addresses, |location| {
            let sim = Arc::new(SimulatedTransport::at(location));
            let flow = FlowControlTransport::with_policy(sim, single_try.clone());
            Ok(PiJuice::new(Arc::new(flow)))
        })
    } else {
        scan_buses(&buses, &addresses, |location| {
            PiJuice::open(location, single_try.clone())
        })
    };

    ctx.emit(&found, |found| {
        if found.is_empty() {
            println!("No PiJuice HAT found");
        }
        for location in found {
            println!("{} {}", "Found".green(), location);
        }
    })
}

#[derive(Serialize)]
struct WatchSample {
    #[serde(flatten)]
    status: Status,
    charge_level: u8,
}

/// Poll status every scan interval until Ctrl-C
pub async fn watch(ctx: &Context) -> CommandResult {
    let session = UpsSession::connect(ctx.open()?, &session_options(&ctx.config))?;
    session.set_up()?;
    let gate = session.polling_gate();
    let handle = PiJuiceHandle::spawn(session.into_device())?;
    let running = setup_interrupt_handler();

    if !ctx.json {
        println!("Polling every {:?}. Press Ctrl-C to stop.", ctx.config.scan_interval());
    }
    let mut ticker = tokio::time::interval(ctx.config.scan_interval());
    let mut check = tokio::time::interval(std::time::Duration::from_millis(200));
    let mut last_powered = None;
    while running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = check.tick() => continue,
        }
        if !gate.enabled() {
            continue;
        }
        let sample = handle
            .call(|pj| {
                let status = pj.status().get_status()?;
                if status.is_button {
                    for (button, event) in pj.status().get_button_events()?.pending() {
                        info!("Button {} event {}", button, event);
                        pj.status().accept_button_event(button)?;
                    }
                }
                Ok(WatchSample {
                    status,
                    charge_level: pj.status().get_charge_level()?,
                })
            })
            .await;
        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Status poll failed: {}", e);
                continue;
            }
        };
        let powered = sample.status.is_powered();
        if last_powered.is_some_and(|was| was != powered) {
            info!("Power input {}", if powered { "restored" } else { "lost" });
        }
        last_powered = Some(powered);
        ctx.emit(&sample, |s| {
            let power = if powered { "powered".green() } else { "on battery".yellow() };
            println!(
                "{} {:>3}%  {}  {}{}",
                chrono::Local::now().format("%H:%M:%S"),
                s.charge_level,
                s.status.battery,
                power,
                if s.status.is_fault { "  FAULT".red().to_string() } else { String::new() }
            );
        })?;
    }
    Ok(())
}

/// Write the effective configuration to `path`
pub fn config_init(config: &AppConfig, path: &Path, force: bool) -> CommandResult {
    if path.exists() && !force {
        bail!("{} already exists; use --force to overwrite", path.display());
    }
    config.save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print the effective configuration
pub fn config_show(ctx: &Context, path: &Path) -> CommandResult {
    ctx.emit(&ctx.config, |config| {
        println!("# {}", path.display());
        match toml::to_string_pretty(config) {
            Ok(text) => print!("{text}"),
            Err(e) => warn!("Cannot render config: {}", e),
        }
    })
}
