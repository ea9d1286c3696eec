//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `query`: Read-only commands (status, battery, profile, time, log, etc.)
//! - `set`: Setting commands (set-profile, set-alarm, set-led, etc.)
//! - `utility`: Host commands (shutdown, scan, watch, config)

pub mod query;
pub mod set;
pub mod utility;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use pijuice_hat::PiJuice;
use pijuice_transport::{
    open_bus, BoxedTransport, FlowControlTransport, PacketFilter, PrinterConfig,
    PrinterTransport, SimulatedTransport,
};
use pijups::AppConfig;
use serde::Serialize;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Everything a handler needs to reach the HAT and print results
pub struct Context {
    pub config: AppConfig,
    pub json: bool,
    pub simulate: bool,
    pub printer: Option<PrinterConfig>,
}

impl Context {
    /// Open the configured HAT through the flow-control layer
    pub fn open(&self) -> anyhow::Result<PiJuice> {
        let location = self.config.location();
        let raw: BoxedTransport = if self.simulate {
            Arc::new(SimulatedTransport::at(location))
        } else {
            open_bus(location).with_context(|| format!("opening HAT at {location}"))?
        };
        let raw = match &self.printer {
            Some(config) => PrinterTransport::wrap(raw, config.clone()),
            None => raw,
        };
        let flow = FlowControlTransport::with_policy(raw, self.config.retry.policy());
        Ok(PiJuice::new(Arc::new(flow)))
    }

    /// Open the HAT and run a closure with it
    pub fn with_device<F>(&self, f: F) -> CommandResult
    where
        F: FnOnce(&PiJuice) -> CommandResult,
    {
        let pj = self.open()?;
        f(&pj)
    }

    /// Print `value` as JSON, or run `text` for the human-readable form
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> CommandResult {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

/// Set up a Ctrl-C handler that sets the given flag to false when triggered.
/// Returns the Arc<AtomicBool> for use in the main loop.
pub fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    running
}

/// Create printer config from CLI flags
pub fn create_printer_config(
    monitor: bool,
    hex: bool,
    filter: Option<&str>,
) -> anyhow::Result<Option<PrinterConfig>> {
    if !monitor {
        return Ok(None);
    }

    let filter = match filter {
        Some(f) => f.parse::<PacketFilter>().map_err(anyhow::Error::msg)?,
        None => PacketFilter::All,
    };

    Ok(Some(
        PrinterConfig::default().with_hex(hex).with_filter(filter),
    ))
}

/// "yes"/"no" for flags in text output
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
