//! Memory-ordering primitives.
//!
//! Publishing data to another core follows one rule: the payload writes must be
//! visible before the link (or index) that makes the payload reachable. The
//! [`FenceTechnique`] chosen at startup decides whether that ordering comes from
//! a store-release instruction or from a barrier followed by a relaxed store.
//! Both produce the same observable ordering.

use fastpath_common::config::FenceTechnique;
use std::sync::atomic::{self, AtomicU32, Ordering};

/// Later loads and stores stay after earlier loads.
#[inline]
pub fn acquire() {
    atomic::fence(Ordering::Acquire);
}

/// Earlier loads and stores complete before later stores.
#[inline]
pub fn release() {
    atomic::fence(Ordering::Release);
}

/// Full two-way barrier.
#[inline]
pub fn full() {
    atomic::fence(Ordering::SeqCst);
}

/// Ordering to attach to a read-modify-write that must publish earlier writes.
///
/// Callers must invoke [`before_release`] immediately before the operation.
#[inline]
#[must_use]
pub const fn release_ordering(technique: FenceTechnique) -> Ordering {
    match technique {
        FenceTechnique::StoreRelease => Ordering::Release,
        FenceTechnique::BarrierThenStore => Ordering::Relaxed,
    }
}

/// Ordering to attach to a read-modify-write whose result guards later reads.
///
/// Callers must invoke [`after_acquire`] immediately after a successful operation.
#[inline]
#[must_use]
pub const fn acquire_ordering(technique: FenceTechnique) -> Ordering {
    match technique {
        FenceTechnique::StoreRelease => Ordering::Acquire,
        FenceTechnique::BarrierThenStore => Ordering::Relaxed,
    }
}

/// Barrier half of a release operation; a no-op for store-release.
#[inline]
pub fn before_release(technique: FenceTechnique) {
    if technique == FenceTechnique::BarrierThenStore {
        release();
    }
}

/// Barrier half of an acquire operation; a no-op for store-release.
#[inline]
pub fn after_acquire(technique: FenceTechnique) {
    if technique == FenceTechnique::BarrierThenStore {
        acquire();
    }
}

/// Store `value` so that every earlier write is visible to whoever observes it.
#[inline]
pub fn store_release(location: &AtomicU32, value: u32, technique: FenceTechnique) {
    before_release(technique);
    location.store(value, release_ordering(technique));
}
