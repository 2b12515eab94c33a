//! Process-wide pair of clock domains.

use crate::clock::{Clock, Domain, Global, Local, Time};
use fastpath_common::config::TimeConfig;
use fastpath_common::SubstrateResult;
use fastpath_sync::Capabilities;
use std::cmp::Ordering;
use tracing::info;

/// Local and global clocks built once at startup.
///
/// # Example
///
/// ```
/// use fastpath_common::config::TimeConfig;
/// use fastpath_sync::Capabilities;
/// use fastpath_time::TimeSource;
///
/// let time = TimeSource::new(&TimeConfig::default(), &Capabilities::default()).unwrap();
/// let start = time.local_now();
/// time.wait_ns(100_000);
/// assert!(time.diff_ns(time.local_now(), start) >= 100_000);
/// ```
#[derive(Debug)]
pub struct TimeSource {
    local: Clock<Local>,
    global: Clock<Global>,
}

impl TimeSource {
    /// Build both clock domains from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured counter is unavailable or reports a
    /// rate outside the accepted band.
    pub fn new(config: &TimeConfig, caps: &Capabilities) -> SubstrateResult<Self> {
        let local = Clock::from_config(&config.local, &config.wait, caps)?;
        let global = Clock::from_config(&config.global, &config.wait, caps)?;
        let source = Self::from_clocks(local, global);

        info!(
            local_counter = source.local.counter_name(),
            local_hz = source.local.resolution(),
            global_counter = source.global.counter_name(),
            global_hz = source.global.resolution(),
            sleep_threshold_us = config.wait.sleep_threshold.as_micros(),
            "Time source initialized"
        );
        Ok(source)
    }

    /// Assemble a time source from prebuilt clocks.
    #[must_use]
    pub fn from_clocks(local: Clock<Local>, global: Clock<Global>) -> Self {
        Self { local, global }
    }

    /// Local clock domain.
    #[must_use]
    pub fn local(&self) -> &Clock<Local> {
        &self.local
    }

    /// Global clock domain.
    #[must_use]
    pub fn global(&self) -> &Clock<Global> {
        &self.global
    }

    /// Local time; never decreases on one thread.
    #[must_use]
    pub fn local_now(&self) -> Time<Local> {
        self.local.now()
    }

    /// Global time; comparable across cores.
    #[must_use]
    pub fn global_now(&self) -> Time<Global> {
        self.global.now()
    }

    /// Strictly increasing local time.
    #[must_use]
    pub fn local_now_strict(&self) -> Time<Local> {
        self.local.now_strict()
    }

    /// Strictly increasing global time.
    #[must_use]
    pub fn global_now_strict(&self) -> Time<Global> {
        self.global.now_strict()
    }

    /// [`TimeSource::local_now`] in nanoseconds.
    #[must_use]
    pub fn local_now_ns(&self) -> u64 {
        self.local.now_ns()
    }

    /// [`TimeSource::global_now`] in nanoseconds.
    #[must_use]
    pub fn global_now_ns(&self) -> u64 {
        self.global.now_ns()
    }

    /// [`TimeSource::local_now_strict`] in nanoseconds.
    #[must_use]
    pub fn local_now_strict_ns(&self) -> u64 {
        self.local.now_strict_ns()
    }

    /// [`TimeSource::global_now_strict`] in nanoseconds.
    #[must_use]
    pub fn global_now_strict_ns(&self) -> u64 {
        self.global.now_strict_ns()
    }

    /// Local tick rate in Hz.
    #[must_use]
    pub fn local_res(&self) -> u64 {
        self.local.resolution()
    }

    /// Global tick rate in Hz.
    #[must_use]
    pub fn global_res(&self) -> u64 {
        self.global.resolution()
    }

    /// Nanoseconds to local ticks.
    #[must_use]
    pub fn local_from_ns(&self, ns: u64) -> Time<Local> {
        self.local.from_ns(ns)
    }

    /// Nanoseconds to global ticks.
    #[must_use]
    pub fn global_from_ns(&self, ns: u64) -> Time<Global> {
        self.global.from_ns(ns)
    }

    /// Ticks of either domain to nanoseconds.
    #[must_use]
    pub fn to_ns<D: Domain>(&self, time: Time<D>) -> u64 {
        D::clock(self).to_ns(time)
    }

    /// Total order of two times of the same domain.
    #[must_use]
    pub fn compare<D>(a: Time<D>, b: Time<D>) -> Ordering {
        a.cmp(&b)
    }

    /// `a - b`, zero if `b` is later.
    #[must_use]
    pub fn diff<D>(a: Time<D>, b: Time<D>) -> Time<D> {
        a.diff(b)
    }

    /// `a - b` in nanoseconds, zero if `b` is later.
    #[must_use]
    pub fn diff_ns<D: Domain>(&self, a: Time<D>, b: Time<D>) -> u64 {
        D::clock(self).diff_ns(a, b)
    }

    /// `a + b`, wrapping on overflow.
    #[must_use]
    pub fn sum<D>(a: Time<D>, b: Time<D>) -> Time<D> {
        a.sum(b)
    }

    /// Wait until the deadline's own domain reaches it.
    pub fn wait_until<D: Domain>(&self, deadline: Time<D>) {
        D::clock(self).wait_until(deadline);
    }

    /// Wait `ns` nanoseconds on the local clock.
    pub fn wait_ns(&self, ns: u64) {
        self.local.wait_ns(ns);
    }
}
