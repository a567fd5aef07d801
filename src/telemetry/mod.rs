//! Telemetry initialization: structured logging and metrics

pub mod metrics;

use crate::config::TelemetryConfig;
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise logging and, when enabled, the Prometheus exporter.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mailroom=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        // Keep `message` at the top level of each JSON line
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true);
        registry.with(fmt_layer).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    if config.metrics_enabled {
        metrics::install_prometheus_exporter(config.metrics_listen_addr)
            .context("Failed to install Prometheus exporter")?;
        metrics::describe_metrics();
        tracing::info!(addr = %config.metrics_listen_addr, "Prometheus exporter listening");
    }

    Ok(())
}
