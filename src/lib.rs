//! Lock-free queue and monotonic time substrate for packet-processing dataplanes.
//!
//! [`Substrate::init`] resolves the platform capabilities and builds the clock
//! domains once at startup. Workers then use the queue and time APIs directly;
//! nothing on the hot path consults configuration again.
//!
//! ```
//! use fastpath::{NodeArena, Substrate, SubstrateConfig};
//! use std::sync::Arc;
//!
//! let substrate = Substrate::init(&SubstrateConfig::default()).unwrap();
//! let (arena, mut nodes) = NodeArena::with_capacity(4, |_| [0u8; 64]).unwrap();
//! let queue = substrate.queue(Arc::new(arena));
//!
//! let mut node = nodes.pop().unwrap();
//! queue.arena().get_mut(&mut node)[0] = 0xAB;
//! queue.push(node);
//!
//! let node = queue.pop().unwrap();
//! assert_eq!(queue.arena().get(&node)[0], 0xAB);
//! ```

use std::sync::{Arc, OnceLock};
use tracing::{error, info};

pub use fastpath_common::config::{
    ClockConfig, ConfigError, CounterSource, FenceTechnique, QueueBackend, StrictScope,
    SubstrateConfig, SyncConfig, TimeConfig, WaitConfig,
};
pub use fastpath_common::time;
pub use fastpath_common::{SubstrateError, SubstrateResult};
pub use fastpath_sync::{
    fence, Capabilities, CpuIdle, LinkedQueue, NodeArena, NodeHandle, WaitOutcome, WaitStrategy,
    Watch, MAX_NODES,
};
pub use fastpath_time::{
    Clock, Counter, Domain, Global, Local, ManualCounter, MonotonicCounter, Time, TimeSource,
};

/// Resolved capabilities plus the process time source.
#[derive(Debug)]
pub struct Substrate {
    caps: Capabilities,
    time: TimeSource,
}

impl Substrate {
    /// Validate configuration, resolve capabilities and build both clocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is out of range, a configured
    /// counter is unavailable, or a clock rate lies outside the accepted band.
    pub fn init(config: &SubstrateConfig) -> SubstrateResult<Self> {
        config.validate().inspect_err(|e| {
            error!(error = %e, "Invalid substrate configuration");
        })?;

        let caps = Capabilities::resolve(&config.sync);
        let time = TimeSource::new(&config.time, &caps).inspect_err(|e| {
            error!(error = %e, "Failed to initialize time source");
        })?;

        info!(
            queue_backend = ?caps.queue_backend(),
            fence = ?caps.fence(),
            wait = ?caps.wait(),
            local_hz = time.local_res(),
            global_hz = time.global_res(),
            "Substrate initialized"
        );
        Ok(Self { caps, time })
    }

    /// Resolved capability set.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Local and global clocks.
    #[must_use]
    pub fn time(&self) -> &TimeSource {
        &self.time
    }

    /// Idle primitive using the resolved wait strategy.
    #[must_use]
    pub fn idle(&self) -> CpuIdle {
        CpuIdle::new(&self.caps)
    }

    /// Empty queue over `arena` using the resolved capabilities.
    #[must_use]
    pub fn queue<T>(&self, arena: Arc<NodeArena<T>>) -> LinkedQueue<T> {
        LinkedQueue::new(arena, &self.caps)
    }
}

static GLOBAL: OnceLock<Substrate> = OnceLock::new();

/// Store `substrate` as the process-wide instance.
///
/// # Errors
///
/// Returns the rejected instance if one was already installed.
pub fn install(substrate: Substrate) -> Result<&'static Substrate, Substrate> {
    GLOBAL.set(substrate)?;
    Ok(GLOBAL.get().expect("substrate installed above"))
}

/// The process-wide instance, if [`install`] has been called.
#[must_use]
pub fn global() -> Option<&'static Substrate> {
    GLOBAL.get()
}
