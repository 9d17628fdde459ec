use crate::config::EditorConfig;
use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &EditorConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    // stdout carries generated code, so logs go to stderr
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "rule_blocks starting");

    Ok(())
}

/// Log the effective editor configuration
pub fn log_config(config: &EditorConfig) {
    tracing::debug!(
        snap_radius = config.snap.snap_radius,
        detach_radius = config.snap.detach_radius,
        grid_size = config.snap.grid_size,
        policy = ?config.snap.policy,
        history = config.history.capacity,
        "editor configuration loaded"
    );
}
