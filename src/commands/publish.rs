use anyhow::{Context, Result};
use sbs_relay::config::PublishConfig;
use sbs_relay::nats_publisher::{self, NatsBatchPublisher};
use sbs_relay::sbs::SbsFeedClient;
use tracing::info;

pub async fn handle_publish(config: PublishConfig) -> Result<()> {
    info!(
        "Starting SBS publisher - feed: {}, NATS: {}, subject: {}, batch window: {}s",
        config.feed.address(),
        config.nats_url,
        config.subject,
        config.batch_window.as_secs()
    );
    sbs_relay::metrics::initialize_publish_metrics();

    let client = nats_publisher::connect(&config.nats_url, "sbs-relay-publish").await?;
    let publisher = NatsBatchPublisher::new(client.clone(), config.subject.clone());

    let feed = SbsFeedClient::new(config.feed, config.batch_window);
    let stats = feed.run(&publisher).await?;

    // Push out anything still buffered in the client before exiting
    client
        .flush()
        .await
        .context("Failed to flush NATS client")?;

    info!(
        "SBS publisher finished: {} frames read, {} lines forwarded in {} batches ({} publish errors)",
        stats.frames, stats.forwarded, stats.batches_published, stats.publish_errors
    );
    Ok(())
}
