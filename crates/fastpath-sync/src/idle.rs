//! CPU idle primitive.
//!
//! Lets a thread wait cheaply for a memory location to change, or for an
//! arbitrary condition such as a deadline, without an OS blocking call. With
//! [`WaitStrategy::EventWait`] the core arms its exclusive monitor on the
//! location and sleeps until a store arrives; otherwise it spins with
//! exponential backoff.

#![cfg_attr(target_arch = "aarch64", allow(unsafe_code))]

use crate::caps::{Capabilities, WaitStrategy};
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WaitOutcome {
    /// The watched location no longer holds the observed value.
    Changed,
    /// The expiry predicate reported true first.
    Expired,
}

/// A word that a thread can wait on.
pub trait Watch: Sync {
    /// Value held by the location.
    type Value: Copy + Eq;

    /// Acquire-load the current value.
    fn observe(&self) -> Self::Value;

    /// Acquire-load the current value and arm the exclusive monitor on it so a
    /// subsequent event wait wakes when another core stores to it.
    fn observe_armed(&self) -> Self::Value;
}

impl Watch for AtomicU32 {
    type Value = u32;

    #[inline]
    fn observe(&self) -> u32 {
        self.load(Ordering::Acquire)
    }

    #[inline]
    fn observe_armed(&self) -> u32 {
        #[cfg(target_arch = "aarch64")]
        {
            // SAFETY: the pointer comes from a live, aligned AtomicU32.
            unsafe { crate::arch::monitor_u32(self.as_ptr()) }
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            self.observe()
        }
    }
}

impl Watch for AtomicU64 {
    type Value = u64;

    #[inline]
    fn observe(&self) -> u64 {
        self.load(Ordering::Acquire)
    }

    #[inline]
    fn observe_armed(&self) -> u64 {
        #[cfg(target_arch = "aarch64")]
        {
            // SAFETY: the pointer comes from a live, aligned AtomicU64.
            unsafe { crate::arch::monitor_u64(self.as_ptr()) }
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            self.observe()
        }
    }
}

/// Idle-wait primitive bound to a resolved [`WaitStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuIdle {
    strategy: WaitStrategy,
}

impl Default for CpuIdle {
    fn default() -> Self {
        Self::new(&Capabilities::default())
    }
}

impl CpuIdle {
    /// Create an idle primitive using the capability set's wait strategy.
    #[must_use]
    pub const fn new(caps: &Capabilities) -> Self {
        Self {
            strategy: caps.wait(),
        }
    }

    /// Active wait strategy.
    #[must_use]
    pub const fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    /// Brief pause inside a spin loop.
    #[inline]
    pub fn pause() {
        std::hint::spin_loop();
    }

    /// Wait until `location` no longer holds `observed`, or until `expired`
    /// returns true.
    ///
    /// The location is re-checked before every sleep, so a store that lands
    /// between the caller's read and this call is never missed.
    pub fn wait_for_change<W>(
        &self,
        location: &W,
        observed: W::Value,
        expired: Option<&dyn Fn() -> bool>,
    ) -> WaitOutcome
    where
        W: Watch + ?Sized,
    {
        match self.strategy {
            WaitStrategy::EventWait => Self::wait_event(location, observed, expired),
            WaitStrategy::Spin => Self::wait_spin(location, observed, expired),
        }
    }

    /// Idle until `expired` returns true.
    pub fn wait_until(&self, expired: impl Fn() -> bool) {
        let backoff = Backoff::new();
        while !expired() {
            backoff.snooze();
        }
    }

    fn wait_spin<W>(
        location: &W,
        observed: W::Value,
        expired: Option<&dyn Fn() -> bool>,
    ) -> WaitOutcome
    where
        W: Watch + ?Sized,
    {
        let backoff = Backoff::new();
        loop {
            if location.observe() != observed {
                return WaitOutcome::Changed;
            }
            if expired.is_some_and(|f| f()) {
                return WaitOutcome::Expired;
            }
            backoff.snooze();
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn wait_event<W>(
        location: &W,
        observed: W::Value,
        expired: Option<&dyn Fn() -> bool>,
    ) -> WaitOutcome
    where
        W: Watch + ?Sized,
    {
        loop {
            if location.observe_armed() != observed {
                crate::arch::clear_exclusive();
                return WaitOutcome::Changed;
            }
            if expired.is_some_and(|f| f()) {
                crate::arch::clear_exclusive();
                return WaitOutcome::Expired;
            }
            crate::arch::wait_for_event();
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn wait_event<W>(
        location: &W,
        observed: W::Value,
        expired: Option<&dyn Fn() -> bool>,
    ) -> WaitOutcome
    where
        W: Watch + ?Sized,
    {
        Self::wait_spin(location, observed, expired)
    }
}
