//! Observability infrastructure: tracing and metrics.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize the global observability infrastructure.
///
/// `RUST_LOG` takes precedence over `log_level`. When `metrics_addr` is set a
/// Prometheus scrape endpoint is served there; this must run inside a Tokio
/// runtime.
pub fn init(
    log_level: &str,
    metrics_addr: Option<SocketAddr>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .try_init()?;

    if let Some(addr) = metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        tracing::info!("Prometheus metrics listening on {}", addr);
    }

    metrics::register_core_metrics();
    Ok(())
}
