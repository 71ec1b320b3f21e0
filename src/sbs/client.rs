use anyhow::{Context, Result, anyhow};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::batch::{BatchPayload, BatchWindow};
use crate::nats_publisher::BatchPublisher;
use crate::sbs::decoder::decode_frame;
use crate::sbs::encoder::encode_record;
use crate::sbs::framer::CrlfFramer;

/// Configuration for the SBS feed connection
#[derive(Debug, Clone)]
pub struct SbsFeedConfig {
    /// BaseStation feed hostname
    pub host: String,
    /// BaseStation feed port (typically 30003)
    pub port: u16,
}

impl Default for SbsFeedConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 30003,
        }
    }
}

impl SbsFeedConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Counters for one run of the feed pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Frames read off the feed
    pub frames: u64,
    /// Compact lines accepted into a batch
    pub forwarded: u64,
    /// Batches handed to the publisher successfully
    pub batches_published: u64,
    /// Batches the publisher rejected
    pub publish_errors: u64,
}

/// Reads the BaseStation feed over TCP and publishes compressed batches of
/// compact lines.
///
/// There is no reconnect: failing to connect is returned to the caller, and
/// the run ends when the feed closes or a read fails.
pub struct SbsFeedClient {
    config: SbsFeedConfig,
    batch_window: Duration,
}

impl SbsFeedClient {
    pub fn new(config: SbsFeedConfig, batch_window: Duration) -> Self {
        Self {
            config,
            batch_window,
        }
    }

    #[tracing::instrument(skip(self, publisher), fields(address = %self.config.address()))]
    pub async fn run<P: BatchPublisher + ?Sized>(&self, publisher: &P) -> Result<FeedStats> {
        let address = self.config.address();
        info!("Connecting to SBS feed at {}", address);

        let stream = TcpStream::connect(&address)
            .await
            .with_context(|| format!("Failed to connect to SBS feed at {}", address))?;
        info!("Connected to SBS feed at {}", address);
        metrics::gauge!("sbs.connection.connected").set(1.0);

        let connection_start = Instant::now();
        let result = run_pipeline(stream, self.batch_window, publisher).await;
        metrics::gauge!("sbs.connection.connected").set(0.0);

        // Errors are left to the caller to report
        if let Ok(stats) = &result {
            info!(
                "SBS feed at {} closed after {:.1}s: {} frames, {} lines forwarded, {} batches published",
                address,
                connection_start.elapsed().as_secs_f64(),
                stats.frames,
                stats.forwarded,
                stats.batches_published
            );
        }

        result
    }
}

/// Drive frames from `reader` through decode, encode and the batch window,
/// publishing each batch as its window elapses.
///
/// The window is checked after every frame and on a timer, so a quiet feed
/// still publishes a batch (possibly empty) every window. Whatever is buffered
/// when the feed ends is flushed as a final batch, including after a read error.
pub async fn run_pipeline<R, P>(reader: R, window_length: Duration, publisher: &P) -> Result<FeedStats>
where
    R: AsyncRead + Unpin,
    P: BatchPublisher + ?Sized,
{
    let mut frames = FramedRead::new(reader, CrlfFramer::default());
    let mut window = BatchWindow::new(window_length, Instant::now());
    let mut ticker = tokio::time::interval(window_length.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stats = FeedStats::default();
    let mut frames_since_log = 0u64;
    let mut last_stats_log = Instant::now();
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(frame)) => {
                    stats.frames += 1;
                    frames_since_log += 1;
                    metrics::counter!("sbs.frames.received_total").increment(1);
                    trace!("Received SBS frame ({} bytes)", frame.len());

                    let record = decode_frame(&frame);
                    if let Some(line) = encode_record(&record)
                        && window.offer(line)
                    {
                        stats.forwarded += 1;
                        metrics::counter!("sbs.lines.forwarded_total").increment(1);
                    }
                }
                Some(Err(e)) => {
                    metrics::counter!("sbs.connection.read_error_total").increment(1);
                    outcome = Err(anyhow!(e).context("SBS feed read error"));
                    break;
                }
                None => {
                    debug!("SBS feed reached end of stream");
                    break;
                }
            },
            _ = ticker.tick() => {}
        }

        if let Some(payload) = window.tick(Instant::now())? {
            publish_batch(publisher, payload, &mut stats).await;
        }

        if last_stats_log.elapsed().as_secs() >= 10 {
            let rate = frames_since_log as f64 / last_stats_log.elapsed().as_secs_f64();
            info!(
                "SBS stats: {:.1} msg/s, {} frames total, {} lines buffered",
                rate,
                stats.frames,
                window.len()
            );
            metrics::gauge!("sbs.message_rate").set(rate);
            frames_since_log = 0;
            last_stats_log = Instant::now();
        }
    }

    if let Some(payload) = window.finish(Instant::now())? {
        publish_batch(publisher, payload, &mut stats).await;
    }

    outcome.map(|()| stats)
}

async fn publish_batch<P: BatchPublisher + ?Sized>(
    publisher: &P,
    payload: BatchPayload,
    stats: &mut FeedStats,
) {
    match publisher.publish(payload.compressed).await {
        Ok(()) => {
            stats.batches_published += 1;
            debug!("Published batch of {} lines", payload.line_count);
        }
        Err(e) => {
            stats.publish_errors += 1;
            metrics::counter!("batch.publish_error_total").increment(1);
            warn!(
                "Failed to publish batch of {} lines, dropping it: {:#}",
                payload.line_count, e
            );
        }
    }
}
