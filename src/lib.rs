#![doc(html_root_url = "https://docs.rs/tsdemux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsdemux - MPEG-2 Transport Stream demultiplexer
//!
//! `tsdemux` pulls MPEG-2 transport stream packets from a byte source and
//! hands each registered PID's payload to its own consumer, e.g. a video
//! decoder and an audio decoder reading the same file at different rates.
//!
//! ## Features
//!
//! - Sync byte recovery after corruption or misalignment
//! - PAT/PMT parsing and stream type to PID resolution
//! - PES header stripping with 33-bit PTS/DTS reconstruction
//! - Per-PID growable buffers with copy and zero-copy reads
//! - Continuity counter checks and demux statistics
//! - Shared, thread-safe per-PID readers (`async` feature adds tokio support)
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tsdemux = "0.1.0"
//! ```
//!
//! ### Reading a video stream from a file
//!
//! ```rust,no_run
//! use tsdemux::format::ts::{TsDemuxer, STREAM_TYPE_H264, STREAM_TYPE_MPEG2_VIDEO};
//! use tsdemux::source::FileSource;
//! use tsdemux::DemuxConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = FileSource::open("capture.ts")?;
//!     let mut demuxer = TsDemuxer::with_config(source, DemuxConfig::load());
//!
//!     let video = demuxer.find_pid_for_stream_types(&[STREAM_TYPE_H264, STREAM_TYPE_MPEG2_VIDEO])?;
//!     demuxer.register(video)?;
//!
//!     loop {
//!         let chunk = demuxer.read(video, 4096)?;
//!         if chunk.is_empty() {
//!             break;
//!         }
//!         println!("{} bytes, pts {:?}", chunk.len(), demuxer.timestamp(video)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `source`: the byte source interface and its memory, file and reader
//!   variants
//! - `format::ts`: packet sync, PSI, PES and the demultiplexer
//! - `config`: tunables loaded from the environment or a config file
//! - `error`: error type and result alias
//! - `utils`: bit reader and CRC-32/MPEG-2

/// Demultiplexer configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Container format implementations
pub mod format;

/// Byte sources feeding the demultiplexer
pub mod source;

/// Common utilities and helper functions
pub mod utils;

pub use config::{DemuxConfig, PrimingPolicy};
pub use error::{DemuxError, Result};
