use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::store::rotation::Clock;
use crate::store::writer::{RotatingWriter, StorageError};

/// Hands decompressed batches to a blocking writer task so the subscription
/// loop never waits on disk.
#[derive(Clone)]
pub struct StoreService {
    sender: flume::Sender<String>,
}

impl StoreService {
    /// Start the background writer. The returned handle resolves when the
    /// service is dropped (all senders gone) or when a write fails.
    pub fn start<C: Clock>(writer: RotatingWriter<C>) -> (Self, JoinHandle<Result<(), StorageError>>) {
        // Unbounded: batches are never dropped on the way to disk
        let (sender, receiver) = flume::unbounded::<String>();

        let handle = tokio::task::spawn_blocking(move || run_writer(writer, receiver));
        info!("Store service started");

        (Self { sender }, handle)
    }

    /// Queue a decompressed batch. Returns false when the writer has stopped.
    pub fn enqueue(&self, text: String) -> bool {
        match self.sender.send(text) {
            Ok(()) => {
                metrics::gauge!("store.queue_depth").set(self.sender.len() as f64);
                true
            }
            Err(flume::SendError(_)) => {
                error!("Store service channel is closed - cannot write batch");
                false
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }
}

fn run_writer<C: Clock>(
    mut writer: RotatingWriter<C>,
    receiver: flume::Receiver<String>,
) -> Result<(), StorageError> {
    let mut batches_written = 0u64;
    let mut lines_written = 0u64;
    let mut last_stats_log = Instant::now();

    while let Ok(text) = receiver.recv() {
        lines_written += writer.write_batch(&text)? as u64;
        batches_written += 1;
        metrics::counter!("store.batches.written_total").increment(1);

        if last_stats_log.elapsed().as_secs() >= 300 {
            let queue_len = receiver.len();
            info!(
                "Store stats: {} batches ({} lines) written in last 5min, {} batches queued",
                batches_written, lines_written, queue_len
            );
            if queue_len > 100 {
                warn!(
                    "Store queue is building up ({} batches) - disk writes may be too slow",
                    queue_len
                );
            }
            batches_written = 0;
            lines_written = 0;
            last_stats_log = Instant::now();
        }
    }

    writer.flush()
}
