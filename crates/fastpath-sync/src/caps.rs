//! Platform capability selection.
//!
//! Resolves, once at startup, which lock-free technique each primitive uses:
//! - Queue anchor updates: load-exclusive/store-exclusive or compare-and-swap
//! - Release ordering: store-release instruction or barrier followed by a plain store
//! - Idle waiting: wait-for-event or spinning
//!
//! The result is an immutable [`Capabilities`] value that is handed to every
//! queue and idle primitive constructor.

use fastpath_common::config::{FenceTechnique, QueueBackend, SyncConfig};
use tracing::{info, warn};

/// Whether the build target has exclusive load/store instructions we can drive.
pub const EXCLUSIVE_AVAILABLE: bool = cfg!(target_arch = "aarch64");

/// Whether the build target can wait for a store to a monitored location.
pub const EVENT_WAIT_AVAILABLE: bool = cfg!(target_arch = "aarch64");

/// How a thread waits for a location or deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStrategy {
    /// Arm the exclusive monitor and sleep until an event (store) arrives.
    EventWait,
    /// Bounded busy-spin escalating to yielding.
    Spin,
}

/// Resolved, immutable capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    queue_backend: QueueBackend,
    fence: FenceTechnique,
    wait: WaitStrategy,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::platform()
    }
}

impl Capabilities {
    /// Preferred capabilities of the build target.
    ///
    /// On aarch64 exclusive access is the fastest way to mutate a linked list, and a
    /// barrier followed by a plain store beats store-release on early ARMv8 cores.
    /// Event waiting stays opt-in.
    #[must_use]
    pub const fn platform() -> Self {
        if EXCLUSIVE_AVAILABLE {
            Self {
                queue_backend: QueueBackend::Exclusive,
                fence: FenceTechnique::BarrierThenStore,
                wait: WaitStrategy::Spin,
            }
        } else {
            Self::portable()
        }
    }

    /// Capabilities every target supports.
    #[must_use]
    pub const fn portable() -> Self {
        Self {
            queue_backend: QueueBackend::Cas,
            fence: FenceTechnique::StoreRelease,
            wait: WaitStrategy::Spin,
        }
    }

    /// Apply explicit configuration choices on top of the platform preference.
    ///
    /// Choices the target cannot honour are degraded to the portable variant
    /// with a warning; this never fails.
    #[must_use]
    pub fn resolve(config: &SyncConfig) -> Self {
        let mut caps = Self::platform();

        if let Some(backend) = config.queue_backend {
            caps.queue_backend = match backend {
                QueueBackend::Exclusive if !EXCLUSIVE_AVAILABLE => {
                    warn!(
                        arch = std::env::consts::ARCH,
                        "Exclusive load/store queue backend not available on this platform, \
                         falling back to compare-and-swap"
                    );
                    QueueBackend::Cas
                }
                other => other,
            };
        }

        if let Some(fence) = config.fence {
            caps.fence = fence;
        }

        if let Some(event_wait) = config.event_wait {
            caps.wait = if !event_wait {
                WaitStrategy::Spin
            } else if EVENT_WAIT_AVAILABLE {
                WaitStrategy::EventWait
            } else {
                warn!(
                    arch = std::env::consts::ARCH,
                    "Wait-for-event not available on this platform, falling back to spinning"
                );
                WaitStrategy::Spin
            };
        }

        info!(
            arch = std::env::consts::ARCH,
            queue_backend = ?caps.queue_backend,
            fence = ?caps.fence,
            wait = ?caps.wait,
            "Sync capabilities resolved"
        );
        caps
    }

    /// Retry protocol used for queue anchor updates.
    #[must_use]
    pub const fn queue_backend(&self) -> QueueBackend {
        self.queue_backend
    }

    /// Release-ordering technique.
    #[must_use]
    pub const fn fence(&self) -> FenceTechnique {
        self.fence
    }

    /// Idle-wait strategy.
    #[must_use]
    pub const fn wait(&self) -> WaitStrategy {
        self.wait
    }
}
