use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compact::embedded_timestamp;
use crate::store::rotation::{Clock, HourWindow, SystemClock};

/// Storage failures. Every one of these ends the store consumer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

fn open_append(path: &Path) -> Result<BufWriter<File>, StorageError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BufWriter::new(file))
}

/// Appends compact lines to an hourly file, rotating when a line's embedded
/// timestamp reaches the end of the current window.
///
/// The open file is `<prefix>-YYYYMMDD_HHMM.csv.tmp`; on rotation it is closed
/// and renamed to drop the `.tmp` suffix before anything is written to the
/// next window's file.
pub struct RotatingWriter<C: Clock = SystemClock> {
    output_dir: PathBuf,
    prefix: String,
    clock: C,
    window: HourWindow,
    temp_path: PathBuf,
    file: BufWriter<File>,
    lines_in_window: u64,
}

impl<C: Clock> RotatingWriter<C> {
    /// Create the output directory if needed and open (or resume appending
    /// to) the temp file for the window holding the clock's current time.
    pub fn open(
        output_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        clock: C,
    ) -> Result<Self, StorageError> {
        let output_dir = output_dir.into();
        let prefix = prefix.into();

        fs::create_dir_all(&output_dir).map_err(|source| StorageError::CreateDir {
            path: output_dir.clone(),
            source,
        })?;

        let window = HourWindow::containing(clock.now());
        let temp_path = temp_path_for(&output_dir, &prefix, &window);
        let file = open_append(&temp_path)?;
        info!("Opened output file {}", temp_path.display());

        Ok(Self {
            output_dir,
            prefix,
            clock,
            window,
            temp_path,
            file,
            lines_in_window: 0,
        })
    }

    pub fn window(&self) -> &HourWindow {
        &self.window
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn lines_in_window(&self) -> u64 {
        self.lines_in_window
    }

    /// Write every line of a decompressed batch in order, then flush.
    ///
    /// Segments without a field separator (including the empty segment after
    /// the final newline) are skipped. Returns the number of lines written.
    pub fn write_batch(&mut self, text: &str) -> Result<usize, StorageError> {
        let mut written = 0;
        for line in text.split('\n') {
            if !line.contains(',') {
                if !line.is_empty() {
                    debug!("Skipping line without fields: '{}'", line);
                    metrics::counter!("store.lines.skipped_total").increment(1);
                }
                continue;
            }
            self.write_line(line)?;
            written += 1;
        }
        self.flush()?;
        Ok(written)
    }

    fn write_line(&mut self, line: &str) -> Result<(), StorageError> {
        match embedded_timestamp(line) {
            Ok(timestamp) if self.window.is_expired_by(timestamp) => self.rotate()?,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read timestamp from '{}': {}", line, e);
                metrics::counter!("store.timestamp.parse_error_total").increment(1);
            }
        }

        writeln!(self.file, "{}", line).map_err(|source| StorageError::Write {
            path: self.temp_path.clone(),
            source,
        })?;
        self.lines_in_window += 1;
        metrics::counter!("store.lines.written_total").increment(1);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.file.flush().map_err(|source| StorageError::Write {
            path: self.temp_path.clone(),
            source,
        })
    }

    /// Finalize the current file and open the next window's temp file.
    ///
    /// The next window is taken from the wall clock. If the clock has not yet
    /// passed the current window (records stamped ahead of local time), the
    /// window directly after the current one is used so a finalized file is
    /// never reopened.
    fn rotate(&mut self) -> Result<(), StorageError> {
        self.flush()?;

        let mut next = HourWindow::containing(self.clock.now());
        if next.start <= self.window.start {
            next = self.window.next();
        }
        let next_temp = temp_path_for(&self.output_dir, &self.prefix, &next);
        let next_file = open_append(&next_temp)?;

        // Close the finished file before renaming it
        drop(std::mem::replace(&mut self.file, next_file));

        let final_path = self.output_dir.join(self.window.file_name(&self.prefix));
        fs::rename(&self.temp_path, &final_path).map_err(|source| StorageError::Rename {
            from: self.temp_path.clone(),
            to: final_path.clone(),
            source,
        })?;
        info!(
            "Finalized {} with {} lines, now writing {}",
            final_path.display(),
            self.lines_in_window,
            next_temp.display()
        );
        metrics::counter!("store.rotations_total").increment(1);

        self.window = next;
        self.temp_path = next_temp;
        self.lines_in_window = 0;
        Ok(())
    }
}

fn temp_path_for(output_dir: &Path, prefix: &str, window: &HourWindow) -> PathBuf {
    output_dir.join(format!("{}.tmp", window.file_name(prefix)))
}
