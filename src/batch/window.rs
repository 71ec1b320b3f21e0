use bytes::Bytes;
use metrics::{counter, histogram};
use std::io;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::batch::gzip;

/// A flushed, compressed batch ready to hand to the publisher
#[derive(Debug, Clone)]
pub struct BatchPayload {
    /// Gzip bytes of the newline-terminated lines
    pub compressed: Bytes,
    /// Number of compact lines in the batch
    pub line_count: usize,
    /// Size of the text before compression
    pub raw_len: usize,
}

/// Time-windowed accumulator for compact lines.
///
/// Lines are kept in arrival order until `tick` sees that the window has
/// elapsed. There is no size trigger: a burst of traffic grows the batch until
/// the next time-based flush.
#[derive(Debug)]
pub struct BatchWindow {
    lines: Vec<String>,
    window_start: Instant,
    window_length: Duration,
}

impl BatchWindow {
    pub fn new(window_length: Duration, now: Instant) -> Self {
        Self {
            lines: Vec::new(),
            window_start: now,
            window_length,
        }
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append a line; empty lines are dropped. Returns whether it was kept.
    pub fn offer(&mut self, line: String) -> bool {
        if line.is_empty() {
            return false;
        }
        self.lines.push(line);
        true
    }

    /// Whether the current window has run its full length at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window_length
    }

    /// Flush if the window has elapsed.
    ///
    /// On flush the accumulator is cleared and the window restarts at `now`. An
    /// elapsed window with nothing in it still produces a payload, holding the
    /// gzip of empty text.
    pub fn tick(&mut self, now: Instant) -> io::Result<Option<BatchPayload>> {
        if !self.is_due(now) {
            return Ok(None);
        }
        self.flush(now).map(Some)
    }

    /// Final flush at end of stream. Nothing is produced when no lines are buffered.
    pub fn finish(&mut self, now: Instant) -> io::Result<Option<BatchPayload>> {
        if self.lines.is_empty() {
            debug!("Stream ended with no buffered messages, nothing to send");
            return Ok(None);
        }
        self.flush(now).map(Some)
    }

    /// Flush whatever is buffered regardless of the window
    pub fn flush(&mut self, now: Instant) -> io::Result<BatchPayload> {
        self.window_start = now;

        let lines = std::mem::take(&mut self.lines);
        if lines.is_empty() {
            debug!("Batch window elapsed with no messages, sending empty batch");
        }

        let text = join_lines(&lines);
        let compressed = gzip::compress(text.as_bytes())?;

        debug!(
            "Batch raw size: {}, compressed size: {} ({} lines)",
            text.len(),
            compressed.len(),
            lines.len()
        );
        counter!("batch.flushed_total").increment(1);
        counter!("batch.lines_total").increment(lines.len() as u64);
        histogram!("batch.raw_bytes").record(text.len() as f64);
        histogram!("batch.compressed_bytes").record(compressed.len() as f64);

        Ok(BatchPayload {
            compressed: Bytes::from(compressed),
            line_count: lines.len(),
            raw_len: text.len(),
        })
    }
}

/// Join lines with a newline after every line, including the last
pub fn join_lines(lines: &[String]) -> String {
    let capacity = lines.iter().map(|l| l.len() + 1).sum();
    let mut text = String::with_capacity(capacity);
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}
