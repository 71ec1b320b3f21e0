pub mod client;
pub mod decoder;
pub mod encoder;
pub mod framer;

pub use client::{FeedStats, SbsFeedClient, SbsFeedConfig, run_pipeline};
pub use decoder::{MessageType, RecordStatus, SbsRecord, decode_frame, decode_line};
pub use encoder::{encode_line, encode_record};
pub use framer::CrlfFramer;
