//! Monotonic time source for the fastpath dataplane.
//!
//! Two clock domains are built once at startup:
//! - [`Local`]: cheapest reads, meaningful on one core
//! - [`Global`]: comparable across cores
//!
//! Each domain is backed by a [`Counter`](counter::Counter) whose rate is
//! validated at construction, converts between ticks and nanoseconds within
//! one tick of error, and supports relaxed, strict and waiting reads.

pub mod clock;
pub mod counter;
pub mod source;

pub use clock::{Clock, Domain, Global, Local, Time};
pub use counter::{Counter, ManualCounter, MonotonicCounter};
#[cfg(target_arch = "x86_64")]
pub use counter::TscCounter;
pub use source::TimeSource;
