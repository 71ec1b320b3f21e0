pub mod gzip;
pub mod window;

pub use window::{BatchPayload, BatchWindow, join_lines};
