use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

const HOUR_MILLIS: i64 = 3_600_000;

/// Source of wall-clock time for window computation
pub trait Clock: Send + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real UTC clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to; shared between clones
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// An hour-aligned UTC window `[start, deadline)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    pub start: DateTime<Utc>,
    /// First epoch millisecond that belongs to the next window
    pub deadline_millis: i64,
}

impl HourWindow {
    /// The window holding `now`
    pub fn containing(now: DateTime<Utc>) -> Self {
        let millis = now.timestamp_millis();
        let start_millis = millis - millis.rem_euclid(HOUR_MILLIS);
        Self::starting_at_millis(start_millis).unwrap_or(Self {
            start: now,
            deadline_millis: millis + HOUR_MILLIS,
        })
    }

    /// The window immediately after this one
    pub fn next(&self) -> Self {
        Self::starting_at_millis(self.deadline_millis).unwrap_or(*self)
    }

    fn starting_at_millis(start_millis: i64) -> Option<Self> {
        Some(Self {
            start: DateTime::from_timestamp_millis(start_millis)?,
            deadline_millis: start_millis + HOUR_MILLIS,
        })
    }

    /// Whether a record stamped `timestamp_millis` belongs past this window
    pub fn is_expired_by(&self, timestamp_millis: i64) -> bool {
        timestamp_millis >= self.deadline_millis
    }

    /// Final file name, `<prefix>-YYYYMMDD_HHMM.csv`
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}-{}.csv", prefix, self.start.format("%Y%m%d_%H%M"))
    }
}
