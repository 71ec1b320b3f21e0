use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::info;

/// Buckets for publish latency, in milliseconds
const PUBLISH_DURATION_BUCKETS_MS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0];

/// Buckets for batch sizes, in bytes
const BATCH_BYTES_BUCKETS: &[f64] = &[
    256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0, 4194304.0,
];

fn prometheus_builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("batch.nats.publish_duration_ms".to_string()),
            PUBLISH_DURATION_BUCKETS_MS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(Matcher::Suffix("_bytes".to_string()), BATCH_BYTES_BUCKETS)
        })
        .context("Failed to configure metric buckets")
}

/// Install the Prometheus recorder globally.
///
/// Must run before any metric is touched, or those early values are lost.
pub fn init_metrics() -> Result<PrometheusHandle> {
    prometheus_builder()?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Serve `/metrics` on the given port until the process exits
pub async fn start_metrics_server(port: u16, handle: PrometheusHandle) -> Result<()> {
    tokio::spawn(process_metrics_task());

    let app = Router::new().route("/metrics", get(move || async move { handle.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;
    info!("Starting metrics server on http://{}/metrics", addr);

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}

/// Background task to update process metrics
/// Updates uptime and memory usage metrics every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if line.starts_with("VmRSS:") {
                        if let Some(kb_str) = line.split_whitespace().nth(1)
                            && let Ok(kb) = kb_str.parse::<f64>()
                        {
                            metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
                        }
                        break;
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Initialize publish-side metrics to zero so they appear before the first event
pub fn initialize_publish_metrics() {
    metrics::gauge!("sbs.connection.connected").set(0.0);
    metrics::counter!("sbs.connection.read_error_total").absolute(0);
    metrics::counter!("sbs.frames.received_total").absolute(0);
    metrics::counter!("sbs.lines.forwarded_total").absolute(0);
    metrics::counter!("sbs.fields.parse_error_total").absolute(0);
    metrics::gauge!("sbs.message_rate").set(0.0);

    metrics::counter!("batch.flushed_total").absolute(0);
    metrics::counter!("batch.lines_total").absolute(0);
    metrics::counter!("batch.publish_error_total").absolute(0);
    metrics::counter!("batch.nats.published_total").absolute(0);
    metrics::counter!("batch.nats.published_bytes_total").absolute(0);
}

/// Initialize store-side metrics to zero so they appear before the first event
pub fn initialize_store_metrics() {
    metrics::counter!("store.batches.received_total").absolute(0);
    metrics::counter!("store.batches.decompress_error_total").absolute(0);
    metrics::counter!("store.batches.written_total").absolute(0);
    metrics::counter!("store.lines.written_total").absolute(0);
    metrics::counter!("store.lines.skipped_total").absolute(0);
    metrics::counter!("store.timestamp.parse_error_total").absolute(0);
    metrics::counter!("store.rotations_total").absolute(0);
    metrics::gauge!("store.queue_depth").set(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialized_metrics_render_as_zero() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            initialize_publish_metrics();
            initialize_store_metrics();
        });

        let rendered = handle.render();
        assert!(rendered.contains("batch_flushed_total 0"), "{rendered}");
        assert!(rendered.contains("store_rotations_total 0"), "{rendered}");
        assert!(rendered.contains("sbs_connection_connected 0"), "{rendered}");
    }
}
