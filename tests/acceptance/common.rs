//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Installing a log subscriber once per test binary
//! - Building a substrate with a given configuration
//! - Summarising timing samples

#![allow(dead_code)] // Not every helper is used by every test module

use fastpath::{Substrate, SubstrateConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test log subscriber; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Substrate built from the default configuration.
pub fn default_substrate() -> anyhow::Result<Substrate> {
    substrate_with(&SubstrateConfig::default())
}

/// Substrate built from `config`.
pub fn substrate_with(config: &SubstrateConfig) -> anyhow::Result<Substrate> {
    init_tracing();
    Ok(Substrate::init(config)?)
}

/// Summary of a set of wait overshoot samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct OvershootStats {
    /// Smallest overshoot.
    pub min: Duration,
    /// Largest overshoot.
    pub max: Duration,
    /// Mean overshoot.
    pub mean: Duration,
    /// Number of samples.
    pub samples: u32,
}

impl OvershootStats {
    /// Summarise overshoot samples.
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let count = u32::try_from(samples.len()).unwrap_or(u32::MAX);
        let total: Duration = samples.iter().sum();
        Self {
            min: samples.iter().copied().min().unwrap_or_default(),
            max: samples.iter().copied().max().unwrap_or_default(),
            mean: total / count,
            samples: count,
        }
    }
}

/// Acceptance criteria for deadline waits.
#[derive(Debug, Clone, Copy)]
pub struct WaitCriteria {
    /// Maximum allowed overshoot past the deadline.
    pub max_overshoot: Duration,
}

impl Default for WaitCriteria {
    fn default() -> Self {
        Self {
            max_overshoot: Duration::from_millis(40),
        }
    }
}

impl WaitCriteria {
    /// Check whether overshoot statistics meet the criteria.
    pub fn check(&self, stats: &OvershootStats) -> bool {
        stats.max <= self.max_overshoot
    }
}
