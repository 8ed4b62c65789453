//! Datagram records and their in-process framing
//!
//! Records are buffered as `magic | source ip | source port | length | payload`
//! with all header fields in host byte order. The format never leaves the
//! process.

pub mod codec;
pub mod record;

pub use codec::{FrameError, HEADER_LEN, MAGIC, RecordCodec};
pub use record::DatagramRecord;
