//! Time unit constants and clock-rate bounds shared by every clock domain.

/// Nanoseconds in a microsecond.
pub const USEC_IN_NS: u64 = 1_000;
/// Nanoseconds in a millisecond.
pub const MSEC_IN_NS: u64 = 1_000 * USEC_IN_NS;
/// Nanoseconds in a second.
pub const SEC_IN_NS: u64 = 1_000 * MSEC_IN_NS;
/// Nanoseconds in a minute.
pub const MIN_IN_NS: u64 = 60 * SEC_IN_NS;
/// Nanoseconds in an hour.
pub const HOUR_IN_NS: u64 = 60 * MIN_IN_NS;

/// Lowest acceptable clock tick rate (exclusive), in Hz.
///
/// Anything at or below this is treated as a broken or misconfigured clock source.
pub const MIN_TIME_RATE_HZ: u64 = 32_000;

/// Highest acceptable clock tick rate (exclusive), in Hz.
pub const MAX_TIME_RATE_HZ: u64 = 15_000_000_000;

/// Whether a reported tick rate lies inside the sane band.
#[must_use]
pub const fn rate_in_range(hz: u64) -> bool {
    hz > MIN_TIME_RATE_HZ && hz < MAX_TIME_RATE_HZ
}
