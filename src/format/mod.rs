//! Container formats. Only the MPEG transport stream is implemented.

pub mod ts;

pub use self::ts::{SharedDemuxer, TsDemuxer};
