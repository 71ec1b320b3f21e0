//! sbs-relay - BaseStation (SBS1) feed relay
//!
//! Reads an SBS1 feed over TCP, re-encodes position and identity messages into
//! a compact line format, and publishes gzip batches to NATS. Subscribers
//! write the batches to hourly files or dump them to stdout.

pub mod batch;
pub mod compact;
pub mod config;
pub mod log_format;
pub mod metrics;
pub mod nats_publisher;
pub mod sbs;
pub mod store;

pub use batch::{BatchPayload, BatchWindow};
pub use compact::CompactMessage;
pub use nats_publisher::{BatchPublisher, NatsBatchPublisher};
pub use sbs::{SbsFeedClient, SbsFeedConfig, SbsRecord};
pub use store::{RotatingWriter, StorageError, StoreService};
