//! Configuration acceptance tests.
//!
//! Verifies that a TOML file drives capability resolution and clock setup.

use super::common::{init_tracing, substrate_with};
use fastpath::{
    ConfigError, FenceTechnique, QueueBackend, StrictScope, Substrate, SubstrateConfig,
    SubstrateError, WaitStrategy,
};
use std::io::Write;
use std::sync::Arc;

/// A configuration file selects the portable backend and custom strict scopes.
#[test]
fn test_config_file_drives_init() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[sync]
queue_backend = "cas"
fence = "barrier_then_store"
event_wait = false

[time.local]
counter = "monotonic"
strict_scope = "process"

[time.global]
strict_scope = "thread"

[time.wait]
sleep_threshold = "500us"
"#
    )?;

    let config = SubstrateConfig::from_file(file.path())?;
    let substrate = substrate_with(&config)?;

    let caps = substrate.capabilities();
    assert_eq!(caps.queue_backend(), QueueBackend::Cas);
    assert_eq!(caps.fence(), FenceTechnique::BarrierThenStore);
    assert_eq!(caps.wait(), WaitStrategy::Spin);
    assert_eq!(substrate.time().local().strict_scope(), StrictScope::Process);
    assert_eq!(substrate.time().global().strict_scope(), StrictScope::Thread);

    // The resolved backend reaches queues built from the substrate
    let (arena, mut nodes) = fastpath::NodeArena::from_values([7u16])?;
    let queue = substrate.queue(Arc::new(arena));
    assert_eq!(queue.backend(), QueueBackend::Cas);
    queue.push(nodes.remove(0));
    assert!(queue.pop().is_some());
    Ok(())
}

/// Requesting exclusive access degrades gracefully where it is unavailable.
#[test]
fn test_exclusive_request_never_fails() -> anyhow::Result<()> {
    let config = SubstrateConfig::from_toml(
        r#"
        [sync]
        queue_backend = "exclusive"
        event_wait = true
        "#,
    )?;
    let substrate = substrate_with(&config)?;

    let expected = if cfg!(target_arch = "aarch64") {
        QueueBackend::Exclusive
    } else {
        QueueBackend::Cas
    };
    assert_eq!(substrate.capabilities().queue_backend(), expected);
    Ok(())
}

/// Out-of-range values are rejected at load time.
#[test]
fn test_invalid_values_rejected() {
    init_tracing();
    let err = SubstrateConfig::from_toml(
        r#"
        [time.local]
        calibration = "10s"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(SubstrateError::Config(_))));

    let mut config = SubstrateConfig::default();
    config.time.wait.sleep_threshold = std::time::Duration::from_secs(2);
    assert!(Substrate::init(&config).is_err());
}

/// Configuration written with `to_toml` loads back unchanged.
#[test]
fn test_config_round_trip() -> anyhow::Result<()> {
    let mut config = SubstrateConfig::default();
    config.sync.fence = Some(FenceTechnique::StoreRelease);
    config.time.global.strict_scope = Some(StrictScope::Process);

    let text = config.to_toml()?;
    assert_eq!(SubstrateConfig::from_toml(&text)?, config);
    Ok(())
}
