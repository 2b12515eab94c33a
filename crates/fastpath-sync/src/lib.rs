//! Synchronization primitives for the fastpath dataplane.
//!
//! This crate provides:
//! - Platform capability resolution (exclusive access vs compare-and-swap,
//!   store-release vs barrier-then-store, event wait vs spin)
//! - Memory-ordering fences
//! - A CPU idle primitive for waiting on a location or condition
//! - A lock-free MPMC linked queue over a caller-owned node arena

#[cfg(target_arch = "aarch64")]
mod arch;

mod anchor;
pub mod arena;
pub mod caps;
pub mod fence;
pub mod idle;
pub mod queue;

pub use arena::{NodeArena, NodeHandle, MAX_NODES};
pub use caps::{Capabilities, WaitStrategy};
pub use idle::{CpuIdle, WaitOutcome, Watch};
pub use queue::LinkedQueue;
