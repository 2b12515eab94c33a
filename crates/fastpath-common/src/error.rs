//! Error taxonomy for substrate initialization.

use thiserror::Error;

/// Substrate error types covering fatal initialization and configuration failures.
///
/// Hot-path operations (push, pop, clock reads, time arithmetic) have no error path;
/// everything here surfaces at construction time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubstrateError {
    /// Configuration value rejected during validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested tick counter does not exist on this platform.
    #[error("clock source {counter} unavailable: {reason}")]
    ClockUnavailable {
        /// Counter name (e.g. "tsc").
        counter: String,
        /// Why the counter could not be used.
        reason: String,
    },

    /// Clock reports a tick rate outside the sane band.
    #[error("{domain} clock resolution {hz}Hz outside allowed range ({min}Hz, {max}Hz)")]
    ResolutionOutOfRange {
        /// Clock domain name ("local" or "global").
        domain: String,
        /// Reported tick rate.
        hz: u64,
        /// Exclusive lower bound.
        min: u64,
        /// Exclusive upper bound.
        max: u64,
    },

    /// Node arena larger than the queue anchor can address.
    #[error("capacity exceeded: requested {requested} nodes (max: {max})")]
    CapacityExceeded {
        /// Number of nodes requested.
        requested: usize,
        /// Largest supported arena.
        max: usize,
    },
}

/// Convenience type alias for substrate operations.
pub type SubstrateResult<T> = Result<T, SubstrateError>;
