//! Flow-control transport layer
//!
//! `FlowControlTransport` wraps a raw `Transport` (which only moves bytes)
//! and adds the frame discipline the HAT needs: checksum append on writes,
//! checksum verification with MSB recovery on reads, bounded retries with
//! growing backoff, and a bus lock so only one command is in flight.
//!
//! ```text
//! [I2cTransport / SimulatedTransport]  ← implements Transport (raw I/O)
//!                |
//!       [FlowControlTransport]         ← adds framing, retries, bus lock
//!                |
//!         [PiJuice command groups]
//! ```

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::{self, cmd, timing};
use crate::types::TransportDeviceInfo;
use crate::{BoxedTransport, Transport};

// ============================================================================
// RetryPolicy
// ============================================================================

/// Retry and timing parameters applied to every bus exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per exchange, including the first
    pub max_tries: u32,
    /// Delay before the first retry
    pub backoff: Duration,
    /// Added to the delay for every further retry
    pub backoff_step: Duration,
    /// Upper bound of a single retry delay
    pub max_backoff: Duration,
    /// Extra pause before retrying after a bus exception, once per exchange
    pub io_cooldown: Duration,
    /// Transfers slower than this are reported as `Timeout` without retrying
    pub transfer_timeout: Option<Duration>,
    /// Pause between a write and its verification read-back
    pub settle: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: timing::MAX_TRIES,
            backoff: Duration::from_millis(timing::BACKOFF_MS),
            backoff_step: Duration::from_millis(timing::BACKOFF_STEP_MS),
            max_backoff: Duration::from_millis(timing::MAX_BACKOFF_MS),
            io_cooldown: Duration::from_millis(timing::IO_COOLDOWN_MS),
            transfer_timeout: Some(Duration::from_millis(timing::TRANSFER_TIMEOUT_MS)),
            settle: Duration::from_millis(timing::SETTLE_MS),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget as the default, without any sleeping
    pub fn immediate() -> Self {
        Self {
            max_tries: timing::MAX_TRIES,
            backoff: Duration::ZERO,
            backoff_step: Duration::ZERO,
            max_backoff: Duration::ZERO,
            io_cooldown: Duration::ZERO,
            transfer_timeout: None,
            settle: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0 = first retry)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        (self.backoff + self.backoff_step.saturating_mul(retry)).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently or the budget runs out
    ///
    /// Retryable errors are absorbed; the error of the final attempt is
    /// returned on exhaustion, so a frame that never verified surfaces as
    /// `ChecksumMismatch` and a bus that never answered as `Io`.
    pub fn run<T>(
        &self,
        register: u8,
        mut op: impl FnMut() -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let tries = self.max_tries.max(1);
        let mut cooldown_used = false;
        let mut cooldown_pending = false;
        let mut last_err = None;

        for attempt in 0..tries {
            if attempt > 0 {
                let mut delay = self.backoff_for(attempt - 1);
                if cooldown_pending {
                    delay += self.io_cooldown;
                    cooldown_pending = false;
                }
                pause(delay);
            }

            let start = Instant::now();
            let result = op();
            let elapsed = start.elapsed();

            if let Some(limit) = self.transfer_timeout {
                if elapsed > limit {
                    warn!(
                        "{} (0x{:02X}) transfer took {:.0}ms, device busy",
                        cmd::name(register),
                        register,
                        elapsed.as_secs_f64() * 1000.0
                    );
                    return Err(TransportError::Timeout { register, elapsed });
                }
            }

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            "{} (0x{:02X}) succeeded after {} retries",
                            cmd::name(register),
                            register,
                            attempt
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    let remaining = tries - attempt - 1;
                    if attempt == 0 {
                        debug!("{} attempt {} failed: {}", cmd::name(register), attempt + 1, e);
                    } else if remaining <= 1 {
                        warn!("{} attempt {} failed: {}", cmd::name(register), attempt + 1, e);
                    } else {
                        info!("{} attempt {} failed: {}", cmd::name(register), attempt + 1, e);
                    }
                    if e.is_io() && !cooldown_used {
                        cooldown_used = true;
                        cooldown_pending = true;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| TransportError::io(register, "no attempt made")))
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

// ============================================================================
// Exchange
// ============================================================================

/// Framed, retried access to the bus while the bus lock is held
///
/// Obtained through [`FlowControlTransport::transaction`]; every call made on
/// one `Exchange` happens without another actor's frames in between.
pub struct Exchange<'a> {
    inner: &'a dyn Transport,
    policy: &'a RetryPolicy,
}

impl Exchange<'_> {
    /// Read a `len`-byte payload and verify its checksum
    pub fn query(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        self.policy.run(register, || {
            let frame = self.inner.read(register, len + 1)?;
            protocol::verify_frame(&frame).ok_or(TransportError::ChecksumMismatch { register })
        })
    }

    /// Read a payload exactly once
    ///
    /// For registers that advance a device-side cursor on every read, where
    /// a retry would return the next record instead of the failed one.
    pub fn query_once(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let frame = self.inner.read(register, len + 1)?;
        protocol::verify_frame(&frame).ok_or(TransportError::ChecksumMismatch { register })
    }

    /// Write a payload with its checksum appended
    pub fn send(&self, register: u8, payload: &[u8]) -> Result<(), TransportError> {
        let frame = protocol::append_checksum(payload);
        self.policy
            .run(register, || self.inner.write(register, &frame))
    }

    /// Give the device time to apply a write before reading it back
    pub fn settle(&self) {
        pause(self.policy.settle);
    }
}

// ============================================================================
// FlowControlTransport
// ============================================================================

/// A transport wrapper that adds framing, retries and single-flight locking
/// on top of a raw `Transport`.
///
/// The command groups hold this; nothing above it touches raw frames.
pub struct FlowControlTransport {
    inner: BoxedTransport,
    policy: RetryPolicy,
    /// Serializes command cycles. Without it a write and its verification
    /// read-back could be split by another caller's traffic.
    bus_lock: Mutex<()>,
}

impl FlowControlTransport {
    /// Wrap `inner` with the default retry policy
    pub fn new(inner: BoxedTransport) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    /// Wrap `inner` with a custom retry policy
    pub fn with_policy(inner: BoxedTransport, policy: RetryPolicy) -> Self {
        debug!(
            "Flow control on {} (max_tries={})",
            inner.device_info().location,
            policy.max_tries
        );
        Self {
            inner,
            policy,
            bus_lock: Mutex::new(()),
        }
    }

    /// Access the wrapped raw transport.
    pub fn inner(&self) -> &BoxedTransport {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }

    /// Read and verify one payload
    pub fn query(&self, register: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        self.transaction(|tx| tx.query(register, len))
    }

    /// Write one payload
    pub fn send(&self, register: u8, payload: &[u8]) -> Result<(), TransportError> {
        self.transaction(|tx| tx.send(register, payload))
    }

    /// Run several exchanges under one hold of the bus lock
    pub fn transaction<T>(&self, f: impl FnOnce(&Exchange<'_>) -> T) -> T {
        let _guard = self.bus_lock.lock();
        let exchange = Exchange {
            inner: self.inner.as_ref(),
            policy: &self.policy,
        };
        f(&exchange)
    }
}
