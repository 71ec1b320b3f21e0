use anyhow::{Context, Result};
use futures_util::StreamExt;
use sbs_relay::batch::gzip;
use sbs_relay::config::StoreConfig;
use sbs_relay::nats_publisher;
use sbs_relay::store::{RotatingWriter, StorageError, StoreService, SystemClock};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

pub async fn handle_store(config: StoreConfig) -> Result<()> {
    info!(
        "Starting store subscriber - NATS: {}, subject: {}, output: {}, prefix: {}",
        config.nats_url,
        config.subject,
        config.output_dir.display(),
        config.file_prefix
    );
    sbs_relay::metrics::initialize_store_metrics();

    let writer = RotatingWriter::open(&config.output_dir, &config.file_prefix, SystemClock)?;

    let client = nats_publisher::connect(&config.nats_url, "sbs-relay-store").await?;
    let mut subscriber = client
        .subscribe(config.subject.clone())
        .await
        .with_context(|| format!("Failed to subscribe to {}", config.subject))?;
    info!("Subscribed to {}", config.subject);

    let (store, mut writer_task) = StoreService::start(writer);

    loop {
        tokio::select! {
            message = subscriber.next() => match message {
                Some(message) => {
                    metrics::counter!("store.batches.received_total").increment(1);
                    match gzip::decompress(&message.payload) {
                        Ok(text) => {
                            debug!("Received batch of {} bytes", text.len());
                            if !store.enqueue(text) {
                                break;
                            }
                        }
                        Err(e) => {
                            metrics::counter!("store.batches.decompress_error_total").increment(1);
                            warn!("Dropping batch that failed to decompress: {}", e);
                        }
                    }
                }
                None => {
                    warn!("NATS subscription to {} closed", config.subject);
                    break;
                }
            },
            result = &mut writer_task => return writer_outcome(result),
        }
    }

    drop(store);
    writer_outcome(writer_task.await)
}

fn writer_outcome(result: Result<Result<(), StorageError>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("Store writer failed"),
        Err(e) => Err(e).context("Store writer task panicked"),
    }
}
