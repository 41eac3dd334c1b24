use std::env;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn resolve_port(raw: Option<&str>, default_port: u16) -> u16 {
    raw.and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Install the global Prometheus recorder and serve it on `0.0.0.0:<port>`.
///
/// The port comes from `port_env` when it parses, otherwise `default_port`.
/// Must be called from inside a tokio runtime; later calls return the first
/// handle.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok().as_deref(), default_port);

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!(error = %err, "metrics exporter needs a tokio runtime; skipping");
            return None;
        }
    };

    let (recorder, exporter) = match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .build()
    {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to build prometheus exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, "metrics recorder already installed");
        return None;
    }

    runtime.spawn(async move {
        if exporter.await.is_err() {
            // ExporterError implements neither Debug nor Display, so it cannot be logged.
            warn!("prometheus exporter stopped");
        }
    });

    let _ = PROMETHEUS_HANDLE.set(handle);
    info!(metrics_port = port, "started prometheus exporter");
    PROMETHEUS_HANDLE.get()
}
