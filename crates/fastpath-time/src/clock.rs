//! Clock domains and domain-tagged time values.
//!
//! A [`Clock`] turns a [`Counter`] into [`Time`] values for one domain:
//! [`Local`] for per-core use and [`Global`] for values compared across cores.
//! Time values carry their domain in the type, so mixing domains does not
//! compile.

use crate::counter::{self, Counter};
use crate::source::TimeSource;
use crossbeam_utils::CachePadded;
use fastpath_common::config::{ClockConfig, StrictScope, WaitConfig};
use fastpath_common::time::{rate_in_range, MAX_TIME_RATE_HZ, MIN_TIME_RATE_HZ, SEC_IN_NS};
use fastpath_common::{SubstrateError, SubstrateResult};
use fastpath_sync::{Capabilities, CpuIdle};
use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{error, info};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Local {}
    impl Sealed for super::Global {}
}

/// A clock domain.
pub trait Domain: sealed::Sealed + Send + Sync + 'static {
    /// Domain name used in logs and errors.
    const NAME: &'static str;

    /// Strict-read scope used when configuration leaves it open.
    const DEFAULT_SCOPE: StrictScope;

    /// This domain's clock inside a time source.
    fn clock(source: &TimeSource) -> &Clock<Self>
    where
        Self: Sized;
}

/// Per-core clock domain. Cheapest reads; values only meaningful on one core.
#[derive(Debug)]
pub enum Local {}

/// Cross-core clock domain. Values from different cores are comparable.
#[derive(Debug)]
pub enum Global {}

impl Domain for Local {
    const NAME: &'static str = "local";
    const DEFAULT_SCOPE: StrictScope = StrictScope::Thread;

    fn clock(source: &TimeSource) -> &Clock<Self> {
        source.local()
    }
}

impl Domain for Global {
    const NAME: &'static str = "global";
    const DEFAULT_SCOPE: StrictScope = StrictScope::Process;

    fn clock(source: &TimeSource) -> &Clock<Self> {
        source.global()
    }
}

/// Opaque tick count of clock domain `D`.
///
/// Ordering is a total order on ticks. Arithmetic never fails: differences
/// saturate at zero and sums wrap.
pub struct Time<D> {
    ticks: u64,
    _domain: PhantomData<fn() -> D>,
}

impl<D> Time<D> {
    /// The null time value.
    pub const ZERO: Self = Self::from_ticks(0);

    /// Wrap a raw tick count.
    #[must_use]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self {
            ticks,
            _domain: PhantomData,
        }
    }

    /// Raw tick count.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.ticks
    }

    /// Whether this is [`Time::ZERO`].
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.ticks == 0
    }

    /// `self - earlier`, or zero if `earlier` is later.
    #[must_use]
    pub const fn diff(self, earlier: Self) -> Self {
        Self::from_ticks(self.ticks.saturating_sub(earlier.ticks))
    }

    /// `self + other`, wrapping on overflow.
    #[must_use]
    pub const fn sum(self, other: Self) -> Self {
        Self::from_ticks(self.ticks.wrapping_add(other.ticks))
    }
}

impl<D> Clone for Time<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Time<D> {}

impl<D> Default for Time<D> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<D> PartialEq for Time<D> {
    fn eq(&self, other: &Self) -> bool {
        self.ticks == other.ticks
    }
}

impl<D> Eq for Time<D> {}

impl<D> PartialOrd for Time<D> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<D> Ord for Time<D> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.ticks.cmp(&other.ticks)
    }
}

impl<D> Hash for Time<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ticks.hash(state);
    }
}

impl<D: Domain> fmt::Debug for Time<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time<{}>({})", D::NAME, self.ticks)
    }
}

type StrictWord = CachePadded<AtomicU64>;

thread_local! {
    // Last strict value per clock read strictly on this thread, keyed by the
    // clock's process-scope word
    static STRICT_LAST: RefCell<Vec<(Weak<StrictWord>, u64)>> = const { RefCell::new(Vec::new()) };
}

/// One clock domain: a counter, its validated rate and strict-read state.
pub struct Clock<D: Domain> {
    counter: Box<dyn Counter>,
    hz: u64,
    resolution_ns: u64,
    scope: StrictScope,
    last: Arc<StrictWord>,
    idle: CpuIdle,
    sleep_threshold: Duration,
    _domain: PhantomData<fn() -> D>,
}

impl<D: Domain> Clock<D> {
    /// Build a clock over `counter`.
    ///
    /// # Errors
    ///
    /// Returns [`SubstrateError::ResolutionOutOfRange`] if the counter's
    /// frequency lies outside the accepted band.
    pub fn new(
        counter: Box<dyn Counter>,
        scope: StrictScope,
        wait: &WaitConfig,
        caps: &Capabilities,
    ) -> SubstrateResult<Self> {
        let hz = counter.frequency();
        if !rate_in_range(hz) {
            error!(
                domain = D::NAME,
                counter = counter.name(),
                hz,
                "Clock resolution outside allowed range"
            );
            return Err(SubstrateError::ResolutionOutOfRange {
                domain: D::NAME.into(),
                hz,
                min: MIN_TIME_RATE_HZ,
                max: MAX_TIME_RATE_HZ,
            });
        }

        let resolution_ns = SEC_IN_NS.div_ceil(hz);
        info!(
            domain = D::NAME,
            counter = counter.name(),
            hz,
            resolution_ns,
            strict_scope = ?scope,
            "Clock ready"
        );

        Ok(Self {
            counter,
            hz,
            resolution_ns,
            scope,
            last: Arc::new(CachePadded::new(AtomicU64::new(0))),
            idle: CpuIdle::new(caps),
            sleep_threshold: wait.sleep_threshold,
            _domain: PhantomData,
        })
    }

    /// Build a clock from its configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured counter is unavailable or its rate
    /// is out of range.
    pub fn from_config(
        config: &ClockConfig,
        wait: &WaitConfig,
        caps: &Capabilities,
    ) -> SubstrateResult<Self> {
        let counter = counter::build(config.counter, config.calibration).inspect_err(|e| {
            error!(domain = D::NAME, error = %e, "Clock counter unavailable");
        })?;
        Self::new(
            counter,
            config.strict_scope.unwrap_or(D::DEFAULT_SCOPE),
            wait,
            caps,
        )
    }

    /// Current time. Consecutive reads never decrease but may be equal.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Time<D> {
        Time::from_ticks(self.counter.read())
    }

    /// Current time, strictly greater than every earlier strict read in the
    /// clock's scope. May run ahead of [`Clock::now`] by a few ticks.
    #[must_use]
    pub fn now_strict(&self) -> Time<D> {
        let raw = self.counter.read_ordered();
        let ticks = match self.scope {
            StrictScope::Thread => self.strict_in_thread(raw),
            StrictScope::Process => self.strict_in_process(raw),
        };
        Time::from_ticks(ticks)
    }

    /// [`Clock::now`] in nanoseconds.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.to_ns(self.now())
    }

    /// [`Clock::now_strict`] in nanoseconds.
    #[must_use]
    pub fn now_strict_ns(&self) -> u64 {
        self.to_ns(self.now_strict())
    }

    /// Tick rate in Hz.
    #[must_use]
    pub fn resolution(&self) -> u64 {
        self.hz
    }

    /// Duration of one tick in nanoseconds, rounded up.
    #[must_use]
    pub fn resolution_ns(&self) -> u64 {
        self.resolution_ns
    }

    /// Strict-read scope in effect.
    #[must_use]
    pub fn strict_scope(&self) -> StrictScope {
        self.scope
    }

    /// Name of the underlying counter.
    #[must_use]
    pub fn counter_name(&self) -> &'static str {
        self.counter.name()
    }

    /// Nanoseconds to ticks, rounded up so a wait never falls short.
    #[allow(clippy::wrong_self_convention)]
    #[must_use]
    pub fn from_ns(&self, ns: u64) -> Time<D> {
        let ticks = (u128::from(ns) * u128::from(self.hz)).div_ceil(u128::from(SEC_IN_NS));
        Time::from_ticks(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    /// Ticks to nanoseconds, rounded down.
    #[must_use]
    pub fn to_ns(&self, time: Time<D>) -> u64 {
        let ns = u128::from(time.ticks()) * u128::from(SEC_IN_NS) / u128::from(self.hz);
        u64::try_from(ns).unwrap_or(u64::MAX)
    }

    /// Convert a [`Duration`] to ticks.
    #[allow(clippy::wrong_self_convention)]
    #[must_use]
    pub fn from_duration(&self, duration: Duration) -> Time<D> {
        self.from_ns(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Convert ticks to a [`Duration`].
    #[must_use]
    pub fn to_duration(&self, time: Time<D>) -> Duration {
        Duration::from_nanos(self.to_ns(time))
    }

    /// `a - b` in nanoseconds, zero if `b` is later.
    #[must_use]
    pub fn diff_ns(&self, a: Time<D>, b: Time<D>) -> u64 {
        self.to_ns(a.diff(b))
    }

    /// Wait until [`Clock::now`] reaches `deadline`.
    ///
    /// Sleeps while the deadline is further away than the configured
    /// threshold, then idles on the CPU. Returns at or after the deadline,
    /// never before.
    pub fn wait_until(&self, deadline: Time<D>) {
        loop {
            let now = self.now();
            if now >= deadline {
                return;
            }
            let remaining = self.to_duration(deadline.diff(now));
            if remaining <= self.sleep_threshold {
                break;
            }
            std::thread::sleep(remaining - self.sleep_threshold);
        }
        self.idle.wait_until(|| self.now() >= deadline);
    }

    /// Wait `ns` nanoseconds from now.
    pub fn wait_ns(&self, ns: u64) {
        self.wait_until(self.now().sum(self.from_ns(ns)));
    }

    fn strict_in_thread(&self, raw: u64) -> u64 {
        let key = Arc::as_ptr(&self.last);
        STRICT_LAST.with(|cell| {
            let mut entries = cell.borrow_mut();
            if let Some((_, last)) = entries.iter_mut().find(|(clock, _)| clock.as_ptr() == key) {
                *last = raw.max(last.wrapping_add(1));
                return *last;
            }
            // Entries of dropped clocks go when this thread meets a new one
            entries.retain(|(clock, _)| clock.strong_count() > 0);
            entries.push((Arc::downgrade(&self.last), raw));
            raw
        })
    }

    fn strict_in_process(&self, raw: u64) -> u64 {
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = raw.max(last.wrapping_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

impl<D: Domain> fmt::Debug for Clock<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("domain", &D::NAME)
            .field("counter", &self.counter.name())
            .field("hz", &self.hz)
            .field("resolution_ns", &self.resolution_ns)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
