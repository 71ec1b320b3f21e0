pub mod rotation;
pub mod service;
pub mod writer;

pub use rotation::{Clock, HourWindow, ManualClock, SystemClock};
pub use service::StoreService;
pub use writer::{RotatingWriter, StorageError};
