//! # MPEG Transport Stream (TS) Demultiplexing
//!
//! This module turns a byte source carrying an MPEG-2 transport stream into
//! independent per-PID byte streams. It is layered bottom-up:
//!
//! - [`sync`]: sync-aligned 188-byte packets, resynchronizing on corruption
//! - [`parser`]: transport header and adaptation field layout
//! - [`pes`]: PES headers and 33-bit PTS/DTS timestamps
//! - [`extractor`]: payload bytes of selected PIDs, PES framing stripped
//! - [`psi`]: PAT/PMT sections and resolution of stream types to PIDs
//! - [`buffer`] and [`demuxer`]: per-PID buffering and routing
//! - [`shared`]: several consumers reading one demuxer
//!
//! [`writer`] packetizes PAT, PMT and PES data, mostly for building test
//! streams.
//!
//! ## Example Usage
//!
//! ```rust
//! use tsdemux::format::ts::*;
//! use tsdemux::source::MemorySource;
//!
//! # fn main() -> tsdemux::Result<()> {
//! let mut writer = TsWriter::new();
//! writer.write_pat(&PatSection {
//!     transport_stream_id: 1,
//!     version: 0,
//!     current_next: true,
//!     programs: vec![PatEntry { program_number: 1, pmt_pid: 0x20 }],
//! });
//! writer.write_pmt(0x20, &PmtSection {
//!     program_number: 1,
//!     version: 0,
//!     current_next: true,
//!     pcr_pid: 0x100,
//!     program_info: Vec::new(),
//!     streams: vec![ElementaryStream::new(STREAM_TYPE_H264, 0x100)],
//! });
//! writer.write_pes(0x100, STREAM_ID_VIDEO, Some(3_600), None, &[0u8; 32]);
//!
//! let mut demuxer = TsDemuxer::new(MemorySource::new(writer.into_bytes()));
//! let pid = demuxer.find_pid_for_stream_types(&[STREAM_TYPE_H264])?;
//! demuxer.register(pid)?;
//! assert_eq!(demuxer.read(pid, 32)?.len(), 32);
//! assert_eq!(demuxer.timestamp(pid)?, Some(3_600));
//! # Ok(())
//! # }
//! ```

/// Per-PID growable buffers
pub mod buffer;

/// Multi-PID buffering demultiplexer
pub mod demuxer;

/// Payload extraction for selected PIDs
pub mod extractor;

/// Low-level TS packet parsing utilities
pub mod parser;

/// PES header and timestamp handling
pub mod pes;

pub mod psi;

pub mod shared;

/// Packet synchronization
pub mod sync;

/// Core TS types and constants
pub mod types;

/// TS packetizer for PAT, PMT and PES data
pub mod writer;

// Re-export commonly used types and constants
pub use buffer::{BufferState, PidBuffer, PidKind};
pub use demuxer::{DemuxStats, TsDemuxer};
pub use extractor::{Payload, PayloadExtractor, PayloadKind};
pub use parser::{AdaptationField, PacketLayout};
pub use pes::PesHeader;
pub use psi::{ElementaryStream, PatEntry, PatSection, PmtSection, PsiScanner, SectionAssembler};
pub use shared::{PidStream, SharedDemuxer};
pub use sync::{PacketReader, SyncStats};
pub use types::*;
pub use writer::TsWriter;
