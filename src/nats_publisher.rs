use anyhow::{Context, Result};
use async_nats::Client;
use bytes::Bytes;
use tracing::{info, warn};

/// Sink for compressed batches
#[async_trait::async_trait]
pub trait BatchPublisher: Send + Sync {
    /// Hand one compressed batch to the bus. Errors are reported to the caller
    /// and the batch is not retried.
    async fn publish(&self, payload: Bytes) -> Result<()>;
}

/// Connect to the NATS server, failing immediately if it cannot be reached
pub async fn connect(nats_url: &str, client_name: &str) -> Result<Client> {
    info!("Connecting to NATS server at {}", nats_url);
    let client = async_nats::ConnectOptions::new()
        .name(client_name)
        .connect(nats_url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", nats_url))?;
    info!("Connected to NATS server at {}", nats_url);
    Ok(client)
}

/// Publishes gzip batches to a single NATS subject.
///
/// Plain core NATS, not JetStream: a batch published while no subscriber is
/// listening is gone.
#[derive(Clone)]
pub struct NatsBatchPublisher {
    client: Client,
    subject: String,
}

impl NatsBatchPublisher {
    pub fn new(client: Client, subject: String) -> Self {
        Self { client, subject }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait::async_trait]
impl BatchPublisher for NatsBatchPublisher {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        let start = std::time::Instant::now();
        let size = payload.len();

        self.client
            .publish(self.subject.clone(), payload)
            .await
            .context("Failed to publish batch to NATS")?;

        let duration_ms = start.elapsed().as_millis() as f64;
        metrics::histogram!("batch.nats.publish_duration_ms").record(duration_ms);
        metrics::counter!("batch.nats.published_total").increment(1);
        metrics::counter!("batch.nats.published_bytes_total").increment(size as u64);

        if duration_ms > 100.0 {
            warn!("Slow NATS publish: {:.1}ms", duration_ms);
        }

        Ok(())
    }
}
