//! Metrics recorder initialization and configuration.

use std::net::SocketAddr;

use {anyhow::Result, tracing::info};

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Address the Prometheus scrape endpoint listens on
    pub listen: Option<SocketAddr>,
    /// Global labels to add to all metrics
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at startup, from inside the tokio runtime. When the `prometheus`
/// feature is enabled and a listen address is configured, this installs the
/// Prometheus exporter with its own HTTP listener. Otherwise the facade macros
/// stay no-ops.
///
/// # Errors
///
/// Returns an error if the exporter fails to build or bind.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<()> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(());
    }

    #[cfg(feature = "prometheus")]
    {
        let Some(listen) = config.listen else {
            info!("metrics enabled but no listen address configured");
            return Ok(());
        };
        init_prometheus(listen, config.global_labels)?;
        info!(%listen, "prometheus metrics exporter initialized");
        Ok(())
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("metrics feature not enabled at compile time");
        Ok(())
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(listen: SocketAddr, global_labels: Vec<(String, String)>) -> Result<()> {
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let mut builder = PrometheusBuilder::new()
        .with_http_listener(listen)
        .set_buckets_for_metric(
            Matcher::Full(crate::fleet::BIND_DURATION_SECONDS.to_string()),
            crate::buckets::BIND_DURATION,
        )?;

    for (key, value) in global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder.install()?;
    Ok(())
}
