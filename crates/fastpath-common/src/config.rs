//! Configuration structures for the substrate.
//!
//! The configuration is read once at process start, resolved into immutable
//! capability and clock descriptors, and never consulted again on hot paths.
//! Every field has a default; omitted capability choices mean "use the
//! platform preference".

use crate::error::{SubstrateError, SubstrateResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Top-level substrate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// Atomic backend and wait-primitive selection.
    pub sync: SyncConfig,

    /// Clock domain configuration.
    pub time: TimeConfig,
}

/// Capability selection for the lock-free queue, fences and idle waiting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retry protocol for queue anchor updates. `None` = platform preference.
    pub queue_backend: Option<QueueBackend>,

    /// Release-ordering technique. `None` = platform preference.
    pub fence: Option<FenceTechnique>,

    /// Use wait-for-event instead of spinning. `None` = platform preference.
    pub event_wait: Option<bool>,
}

/// Retry protocol used to update a queue anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// Load-exclusive / store-exclusive (LL/SC) retry loop.
    Exclusive,
    /// Compare-and-swap retry loop.
    Cas,
}

/// How release ordering is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FenceTechnique {
    /// A single store-release (or release read-modify-write) instruction.
    StoreRelease,
    /// An explicit barrier followed by a relaxed store.
    BarrierThenStore,
}

/// Tick source backing a clock domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CounterSource {
    /// OS monotonic clock.
    #[default]
    Monotonic,
    /// CPU timestamp counter (x86_64 with invariant TSC only).
    Tsc,
    /// Timestamp counter when usable, otherwise the OS monotonic clock.
    Auto,
}

/// Scope inside which strict clock reads are guaranteed to increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictScope {
    /// Per calling thread; no cross-thread synchronization.
    Thread,
    /// Per clock, shared by all threads through an atomic last value.
    Process,
}

/// Clock domain configuration (local and global).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Local (per-core) clock domain.
    pub local: ClockConfig,

    /// Global (cross-core) clock domain.
    pub global: ClockConfig,

    /// Deadline waiting behaviour.
    pub wait: WaitConfig,
}

/// Configuration of one clock domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Tick source.
    pub counter: CounterSource,

    /// Strict-read scope. `None` = domain default (thread for local, process for global).
    pub strict_scope: Option<StrictScope>,

    /// Measurement window used to calibrate counters with unknown frequency.
    #[serde(with = "humantime_serde")]
    pub calibration: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            counter: CounterSource::Monotonic,
            strict_scope: None,
            calibration: Duration::from_millis(20),
        }
    }
}

/// Deadline waiting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Remaining time below which a deadline wait stops sleeping and polls.
    #[serde(with = "humantime_serde")]
    pub sleep_threshold: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            sleep_threshold: Duration::from_millis(2),
        }
    }
}

/// Shortest calibration window accepted.
const MIN_CALIBRATION: Duration = Duration::from_millis(1);
/// Longest calibration window accepted.
const MAX_CALIBRATION: Duration = Duration::from_secs(1);

impl SubstrateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading substrate configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`SubstrateError::Config`] naming the offending field.
    pub fn validate(&self) -> SubstrateResult<()> {
        for (name, clock) in [("local", &self.time.local), ("global", &self.time.global)] {
            if clock.calibration < MIN_CALIBRATION || clock.calibration > MAX_CALIBRATION {
                return Err(SubstrateError::Config(format!(
                    "time.{name}.calibration must be between {} and {}, got {}",
                    humantime::format_duration(MIN_CALIBRATION),
                    humantime::format_duration(MAX_CALIBRATION),
                    humantime::format_duration(clock.calibration),
                )));
            }
        }
        if self.time.wait.sleep_threshold > Duration::from_secs(1) {
            return Err(SubstrateError::Config(format!(
                "time.wait.sleep_threshold must not exceed 1s, got {}",
                humantime::format_duration(self.time.wait.sleep_threshold)
            )));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Parsed values failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(#[source] SubstrateError),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
