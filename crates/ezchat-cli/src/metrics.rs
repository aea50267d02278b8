//! Prometheus export for the CLI.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::MetricsConfig;

/// Install the Prometheus exporter when enabled and describe client metrics.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn init(config: &MetricsConfig) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    ezchat_core::metrics::describe_metrics();

    info!("Metrics server listening on {}", addr);
    Ok(())
}
