use super::types::*;
use crate::error::Result;
use crate::source::{read_full, ByteSource};
use log::{debug, warn};

/// Counters kept by the [`PacketReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Packets returned to the caller
    pub packets: u64,
    /// Times the sync byte was missing where a packet should start
    pub resyncs: u64,
    /// Bytes thrown away while hunting for the sync byte
    pub bytes_skipped: u64,
}

/// Reads sync-aligned 188-byte packets from a byte source.
///
/// Every packet returned starts with `0x47`. When a packet boundary does not
/// carry the sync byte the reader scans forward for it, moves the candidate
/// packet to the front of its buffer and reads only the missing tail.
pub struct PacketReader<S> {
    source: S,
    buf: [u8; TS_PACKET_SIZE],
    stats: SyncStats,
}

impl<S: ByteSource> PacketReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: [0u8; TS_PACKET_SIZE],
            stats: SyncStats::default(),
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Returns the next packet, `Ok(None)` once the source is exhausted.
    ///
    /// A trailing partial packet at end of stream is dropped. Source
    /// failures are returned as [`crate::DemuxError::Io`].
    pub fn next_packet(&mut self) -> Result<Option<TsPacket>> {
        // Bytes at the front of `buf` that are already valid.
        let mut filled = 0;

        loop {
            let read = read_full(&mut self.source, &mut self.buf[filled..])?;
            filled += read;
            if filled < TS_PACKET_SIZE {
                if filled > 0 {
                    warn!("dropping {} trailing bytes of a truncated packet", filled);
                    self.stats.bytes_skipped += filled as u64;
                }
                return Ok(None);
            }

            if self.buf[0] == SYNC_BYTE {
                self.stats.packets += 1;
                return Ok(TsPacket::new(self.buf));
            }

            self.stats.resyncs += 1;
            match self.buf[1..].iter().position(|&b| b == SYNC_BYTE) {
                Some(pos) => {
                    let skip = pos + 1;
                    debug!("lost sync, skipping {} bytes to next sync byte", skip);
                    self.buf.copy_within(skip.., 0);
                    self.stats.bytes_skipped += skip as u64;
                    filled = TS_PACKET_SIZE - skip;
                }
                None => {
                    debug!("lost sync, no sync byte in {} bytes", TS_PACKET_SIZE);
                    self.stats.bytes_skipped += TS_PACKET_SIZE as u64;
                    filled = 0;
                }
            }
        }
    }
}
