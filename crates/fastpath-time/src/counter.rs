//! Tick sources behind the clock domains.
//!
//! A [`Counter`] is a free-running, monotonic tick count with a known
//! frequency. Clocks never care where ticks come from; the OS monotonic clock,
//! the CPU timestamp counter and a manually driven counter for tests all look
//! the same.

#![cfg_attr(target_arch = "x86_64", allow(unsafe_code))]

use fastpath_common::config::CounterSource;
use fastpath_common::time::{MIN_TIME_RATE_HZ, SEC_IN_NS};
use fastpath_common::{SubstrateError, SubstrateResult};
use fastpath_sync::fence;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A monotonic tick source.
pub trait Counter: Send + Sync + fmt::Debug {
    /// Current tick count. May be reordered with surrounding memory accesses.
    fn read(&self) -> u64;

    /// Current tick count, with every earlier access completed before the read
    /// and every later access issued after it.
    fn read_ordered(&self) -> u64 {
        fence::full();
        let ticks = self.read();
        fence::full();
        ticks
    }

    /// Ticks per second.
    fn frequency(&self) -> u64;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;
}

/// OS monotonic clock at nanosecond granularity.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicCounter {
    epoch: Instant,
}

impl MonotonicCounter {
    /// Create a counter after checking that the OS clock is fine-grained enough.
    ///
    /// # Errors
    ///
    /// Returns [`SubstrateError::ClockUnavailable`] if the OS reports no
    /// monotonic clock or a resolution coarser than the slowest acceptable
    /// tick rate.
    pub fn new() -> SubstrateResult<Self> {
        let resolution = os_resolution()?;
        let coarsest = Duration::from_nanos(SEC_IN_NS / MIN_TIME_RATE_HZ);
        if resolution > coarsest {
            return Err(SubstrateError::ClockUnavailable {
                counter: "monotonic".into(),
                reason: format!("OS clock resolution {resolution:?} coarser than {coarsest:?}"),
            });
        }
        debug!(resolution_ns = resolution.as_nanos(), "Monotonic counter ready");

        // Epoch sits one second in the past so no reading collides with Time::ZERO
        let now = Instant::now();
        let epoch = now.checked_sub(Duration::from_secs(1)).unwrap_or(now);
        Ok(Self { epoch })
    }
}

impl Counter for MonotonicCounter {
    // u64 nanoseconds cover several centuries of uptime
    #[allow(clippy::cast_possible_truncation)]
    #[inline]
    fn read(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn frequency(&self) -> u64 {
        SEC_IN_NS
    }

    fn name(&self) -> &'static str {
        "monotonic"
    }
}

#[cfg(unix)]
fn os_resolution() -> SubstrateResult<Duration> {
    use nix::time::{clock_getres, ClockId};

    let res = clock_getres(ClockId::CLOCK_MONOTONIC).map_err(|e| SubstrateError::ClockUnavailable {
        counter: "monotonic".into(),
        reason: format!("clock_getres failed: {e}"),
    })?;
    let secs = u64::try_from(res.tv_sec()).unwrap_or(u64::MAX);
    let nanos = u32::try_from(res.tv_nsec()).unwrap_or(0);
    Ok(Duration::new(secs, nanos))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn os_resolution() -> SubstrateResult<Duration> {
    // No portable query; std::time::Instant is documented as high resolution
    Ok(Duration::from_nanos(1))
}

/// CPU timestamp counter with a measured frequency.
///
/// Only usable on x86_64 processors that advertise an invariant TSC, which
/// ticks at a constant rate across frequency scaling and sleep states.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct TscCounter {
    hz: u64,
}

#[cfg(target_arch = "x86_64")]
impl TscCounter {
    /// Whether this processor's timestamp counter is invariant.
    #[must_use]
    pub fn is_invariant() -> bool {
        use std::arch::x86_64::__cpuid;

        // SAFETY: cpuid is available on every x86_64 processor.
        let max_extended = unsafe { __cpuid(0x8000_0000) }.eax;
        if max_extended < 0x8000_0007 {
            return false;
        }
        // SAFETY: leaf 0x8000_0007 is supported per the check above.
        let power = unsafe { __cpuid(0x8000_0007) };
        power.edx & (1 << 8) != 0
    }

    /// Measure the counter frequency against the OS monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`SubstrateError::ClockUnavailable`] if the counter is not
    /// invariant or did not advance during the window.
    pub fn calibrate(window: Duration) -> SubstrateResult<Self> {
        if !Self::is_invariant() {
            return Err(SubstrateError::ClockUnavailable {
                counter: "tsc".into(),
                reason: "processor does not advertise an invariant TSC".into(),
            });
        }

        let start = Instant::now();
        let first = rdtsc();
        std::thread::sleep(window);
        let last = rdtsc();
        let elapsed = start.elapsed();

        let ticks = u128::from(last.saturating_sub(first));
        let hz = u64::try_from(ticks * u128::from(SEC_IN_NS) / elapsed.as_nanos().max(1))
            .unwrap_or(u64::MAX);
        if hz == 0 {
            return Err(SubstrateError::ClockUnavailable {
                counter: "tsc".into(),
                reason: "counter did not advance during calibration".into(),
            });
        }

        debug!(
            hz,
            window_us = elapsed.as_micros(),
            ticks = last.saturating_sub(first),
            "TSC calibrated"
        );
        Ok(Self { hz })
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn rdtsc() -> u64 {
    // SAFETY: rdtsc has no preconditions on x86_64.
    unsafe { std::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "x86_64")]
impl Counter for TscCounter {
    #[inline]
    fn read(&self) -> u64 {
        rdtsc()
    }

    fn frequency(&self) -> u64 {
        self.hz
    }

    fn name(&self) -> &'static str {
        "tsc"
    }
}

/// Counter advanced explicitly by the caller.
///
/// Clones share the same tick value, so a test can keep one clone while a
/// clock owns another. An optional step advances the value on every read to
/// simulate time passing during busy loops.
#[derive(Debug, Clone)]
pub struct ManualCounter {
    ticks: Arc<AtomicU64>,
    hz: u64,
    step: u64,
}

impl ManualCounter {
    /// Counter at tick zero with the given frequency.
    #[must_use]
    pub fn new(hz: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            hz,
            step: 0,
        }
    }

    /// Advance by `step` ticks on every read.
    #[must_use]
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Jump to an absolute tick value.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Release);
    }

    /// Move forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Current value without stepping.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Counter for ManualCounter {
    fn read(&self) -> u64 {
        if self.step == 0 {
            self.ticks.load(Ordering::Acquire)
        } else {
            self.ticks.fetch_add(self.step, Ordering::AcqRel) + self.step
        }
    }

    fn frequency(&self) -> u64 {
        self.hz
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Build the counter selected by configuration.
///
/// # Errors
///
/// Returns [`SubstrateError::ClockUnavailable`] if the requested counter
/// cannot be used on this machine.
pub fn build(source: CounterSource, calibration: Duration) -> SubstrateResult<Box<dyn Counter>> {
    match source {
        CounterSource::Monotonic => Ok(Box::new(MonotonicCounter::new()?)),
        CounterSource::Tsc => tsc(calibration),
        CounterSource::Auto => tsc(calibration).or_else(|e| {
            debug!(error = %e, "TSC unusable, using monotonic counter");
            Ok(Box::new(MonotonicCounter::new()?) as Box<dyn Counter>)
        }),
    }
}

#[cfg(target_arch = "x86_64")]
fn tsc(calibration: Duration) -> SubstrateResult<Box<dyn Counter>> {
    Ok(Box::new(TscCounter::calibrate(calibration)?))
}

#[cfg(not(target_arch = "x86_64"))]
fn tsc(_calibration: Duration) -> SubstrateResult<Box<dyn Counter>> {
    Err(SubstrateError::ClockUnavailable {
        counter: "tsc".into(),
        reason: format!("not supported on {}", std::env::consts::ARCH),
    })
}
