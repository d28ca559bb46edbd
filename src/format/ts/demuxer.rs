use super::buffer::{Continuity, PidBuffer, PidKind};
use super::extractor::PayloadExtractor;
use super::psi::{PmtSection, PsiScanner};
use super::types::{pts_to_time, PID_MASK, PID_RESERVED_MAX};
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use crate::source::ByteSource;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::io;
use std::time::Duration;

/// Counters describing what the demuxer has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Sync-aligned packets read from the source
    pub packets: u64,
    /// Times synchronization was lost
    pub resyncs: u64,
    /// Bytes skipped while resynchronizing
    pub bytes_skipped: u64,
    /// Packets dropped: unregistered PIDs, transport errors, corrupt
    /// packets, duplicates and packets discarded while priming
    pub discarded: u64,
    /// Continuity counter gaps not announced by a discontinuity flag
    pub continuity_errors: u64,
    /// Times a per-PID buffer had to grow
    pub buffer_growths: u64,
}

/// MPEG transport stream demultiplexer.
///
/// Packets are pulled from the byte source only when a consumer asks for
/// bytes that are not buffered yet. Each pulled packet is routed to the
/// buffer of the registered PID it belongs to; packets of other PIDs are
/// dropped. Every consumer reads its own PID independently.
///
/// ```
/// use tsdemux::format::ts::{TsDemuxer, TsWriter, STREAM_ID_VIDEO};
/// use tsdemux::source::MemorySource;
///
/// # fn main() -> tsdemux::Result<()> {
/// let mut writer = TsWriter::new();
/// writer.write_pes(0x100, STREAM_ID_VIDEO, Some(90_000), None, b"frame");
///
/// let mut demuxer = TsDemuxer::new(MemorySource::new(writer.into_bytes()));
/// demuxer.register(0x100)?;
/// assert_eq!(&demuxer.read(0x100, 5)?[..], b"frame");
/// assert_eq!(demuxer.timestamp(0x100)?, Some(90_000));
/// # Ok(())
/// # }
/// ```
pub struct TsDemuxer<S> {
    extractor: PayloadExtractor<S>,
    buffers: Vec<PidBuffer>,
    config: DemuxConfig,
    discarded: u64,
    continuity_errors: u64,
    released_growths: u64,
    exhausted: bool,
}

impl<S: ByteSource> TsDemuxer<S> {
    /// Creates a demuxer with the default configuration.
    pub fn new(source: S) -> Self {
        Self::with_config(source, DemuxConfig::default())
    }

    pub fn with_config(source: S, config: DemuxConfig) -> Self {
        let mut extractor = PayloadExtractor::new(source);
        extractor.set_drop_transport_errors(config.drop_transport_errors);
        Self {
            extractor,
            buffers: Vec::new(),
            config,
            discarded: 0,
            continuity_errors: 0,
            released_growths: 0,
            exhausted: false,
        }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        self.extractor.source()
    }

    pub fn source_mut(&mut self) -> &mut S {
        self.extractor.source_mut()
    }

    pub fn into_source(self) -> S {
        self.extractor.into_source()
    }

    /// Resolves the PID of the first elementary stream whose type is in
    /// `stream_types` by reading the PAT and then the PMTs.
    ///
    /// Packets pulled while scanning are not routed to registered PIDs.
    pub fn find_pid_for_stream_types(&mut self, stream_types: &[u8]) -> Result<u16> {
        PsiScanner::new(&mut self.extractor)
            .with_crc_verification(self.config.verify_crc)
            .find_pid_for_stream_types(stream_types)
    }

    /// Reads the PAT and returns every well-formed PMT, in PAT order.
    pub fn scan_programs(&mut self) -> Result<Vec<PmtSection>> {
        PsiScanner::new(&mut self.extractor)
            .with_crc_verification(self.config.verify_crc)
            .scan_programs()
    }

    /// Registers `pid`. PIDs up to 0x001F carry PSI sections, all others PES.
    pub fn register(&mut self, pid: u16) -> Result<()> {
        let kind = if pid <= PID_RESERVED_MAX {
            PidKind::Section
        } else {
            PidKind::Pes
        };
        self.register_as(pid, kind)
    }

    /// Registers `pid` with an explicit payload kind. Registering a PID
    /// again keeps its buffer unless the kind changes.
    pub fn register_as(&mut self, pid: u16, kind: PidKind) -> Result<()> {
        if pid > PID_MASK {
            return Err(DemuxError::InvalidData(format!("pid {:#06x} exceeds 13 bits", pid)));
        }
        if let Some(index) = self.buffers.iter().position(|b| b.pid() == pid) {
            if self.buffers[index].kind() == kind {
                return Ok(());
            }
            self.released_growths += self.buffers.remove(index).growths();
        }
        debug!("registering pid {:#06x} as {:?}", pid, kind);
        self.buffers.push(PidBuffer::new(
            pid,
            kind,
            self.config.initial_capacity,
            self.config.growth_increment,
        ));
        Ok(())
    }

    /// Drops `pid` and whatever it had buffered.
    pub fn unregister(&mut self, pid: u16) -> Result<()> {
        let index = self.index_of(pid)?;
        let buffer = self.buffers.remove(index);
        self.released_growths += buffer.growths();
        debug!("unregistered pid {:#06x} with {} bytes pending", pid, buffer.len());
        Ok(())
    }

    pub fn is_registered(&self, pid: u16) -> bool {
        self.buffers.iter().any(|b| b.pid() == pid)
    }

    /// Registered PIDs in registration order.
    pub fn registered_pids(&self) -> Vec<u16> {
        self.buffers.iter().map(|b| b.pid()).collect()
    }

    /// Returns up to `max` bytes of `pid`, pulling packets until that many
    /// are buffered. A short or empty result means the source is exhausted.
    ///
    /// `max == 0` returns an empty `Bytes` without pulling anything; use
    /// [`is_exhausted`](Self::is_exhausted) to tell the two apart.
    pub fn read(&mut self, pid: u16, max: usize) -> Result<Bytes> {
        if max == 0 {
            self.index_of(pid)?;
            return Ok(Bytes::new());
        }
        let index = self.fill(pid, max)?;
        Ok(self.buffers[index].take(max))
    }

    /// Returns up to `max` bytes `pid` already has buffered, without pulling.
    pub fn read_buffered(&mut self, pid: u16, max: usize) -> Result<Bytes> {
        let index = self.index_of(pid)?;
        Ok(self.buffers[index].take(max))
    }

    /// Pulls at most one packet, and only while `pid` has nothing buffered.
    ///
    /// Returns true once `pid` holds bytes or the source is exhausted, false
    /// when the pulled packet went elsewhere and another pull is needed.
    pub fn poll_available(&mut self, pid: u16) -> Result<bool> {
        let index = self.index_of(pid)?;
        if !self.buffers[index].is_empty() {
            return Ok(true);
        }
        Ok(!self.pull()? || !self.buffers[index].is_empty())
    }

    /// Like [`read`](Self::read), copying into `buf`.
    pub fn read_into(&mut self, pid: u16, buf: &mut [u8]) -> Result<usize> {
        let index = self.fill(pid, buf.len())?;
        Ok(self.buffers[index].copy_to(buf))
    }

    /// Returns the buffered bytes of `pid` without consuming them, pulling
    /// packets only while nothing is buffered. Empty once exhausted.
    pub fn peek(&mut self, pid: u16) -> Result<&[u8]> {
        let index = self.fill(pid, 1)?;
        Ok(self.buffers[index].as_slice())
    }

    /// Consumes up to `n` bytes previously returned by [`peek`](Self::peek).
    pub fn consume(&mut self, pid: u16, n: usize) -> Result<usize> {
        let index = self.index_of(pid)?;
        Ok(self.buffers[index].consume(n))
    }

    /// Bytes currently buffered for `pid`.
    pub fn available(&self, pid: u16) -> Result<usize> {
        Ok(self.buffers[self.index_of(pid)?].len())
    }

    /// Returns the next complete PSI section of a section PID, `Ok(None)`
    /// once the source is exhausted.
    pub fn read_section(&mut self, pid: u16) -> Result<Option<Bytes>> {
        let index = self.index_of(pid)?;
        if self.buffers[index].kind() != PidKind::Section {
            return Err(DemuxError::InvalidData(format!(
                "pid {:#06x} is not registered for sections",
                pid
            )));
        }
        loop {
            if let Some(section) = self.buffers[index].take_section() {
                return Ok(Some(section));
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    /// Most recent PTS routed to `pid`, whether or not its bytes have been
    /// consumed.
    pub fn timestamp(&self, pid: u16) -> Result<Option<u64>> {
        Ok(self.buffers[self.index_of(pid)?].last_pts())
    }

    /// Most recent DTS routed to `pid`.
    pub fn decode_timestamp(&self, pid: u16) -> Result<Option<u64>> {
        Ok(self.buffers[self.index_of(pid)?].last_dts())
    }

    pub fn presentation_time(&self, pid: u16) -> Result<Option<Duration>> {
        Ok(self.timestamp(pid)?.map(pts_to_time))
    }

    /// True once the source has reported end of stream.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rewinds the source and returns every PID to priming with an empty
    /// buffer. Fails with [`DemuxError::Unsupported`] for forward-only sources.
    pub fn rewind(&mut self) -> Result<()> {
        self.extractor.source_mut().rewind().map_err(|e| match e.kind() {
            io::ErrorKind::Unsupported => DemuxError::Unsupported("source cannot rewind"),
            _ => DemuxError::Io(e),
        })?;
        for buffer in &mut self.buffers {
            buffer.reset();
        }
        self.exhausted = false;
        debug!("rewound source, {} pids back to priming", self.buffers.len());
        Ok(())
    }

    pub fn stats(&self) -> DemuxStats {
        let sync = self.extractor.sync_stats();
        DemuxStats {
            packets: sync.packets,
            resyncs: sync.resyncs,
            bytes_skipped: sync.bytes_skipped,
            discarded: self.extractor.discarded_packets() + self.discarded,
            continuity_errors: self.continuity_errors,
            buffer_growths: self.released_growths
                + self.buffers.iter().map(PidBuffer::growths).sum::<u64>(),
        }
    }

    fn index_of(&self, pid: u16) -> Result<usize> {
        self.buffers
            .iter()
            .position(|b| b.pid() == pid)
            .ok_or(DemuxError::UnregisteredPid(pid))
    }

    /// Pulls until `pid` holds at least `want` bytes or the source ends.
    fn fill(&mut self, pid: u16, want: usize) -> Result<usize> {
        let index = self.index_of(pid)?;
        while self.buffers[index].len() < want {
            if !self.pull()? {
                break;
            }
        }
        Ok(index)
    }

    /// Routes one packet of a registered PID. Returns false once the source
    /// is exhausted.
    fn pull(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        let buffers = &self.buffers;
        let selected = self.extractor.next_payload(|header| {
            buffers
                .iter()
                .find(|b| b.pid() == header.pid)
                .map(PidBuffer::kind)
        })?;
        let payload = match selected {
            Some(payload) => payload,
            None => {
                debug!("source exhausted");
                self.exhausted = true;
                return Ok(false);
            }
        };

        let priming = self.config.priming;
        let buffer = match self.buffers.iter_mut().find(|b| b.pid() == payload.pid) {
            Some(buffer) => buffer,
            None => return Ok(true),
        };

        match buffer.check_continuity(&payload) {
            Continuity::InOrder => {}
            Continuity::Duplicate => {
                trace!("pid {:#06x}: dropping duplicate packet", payload.pid);
                self.discarded += 1;
                return Ok(true);
            }
            Continuity::Gap { expected } => {
                warn!(
                    "pid {:#06x}: continuity counter {} where {} was expected",
                    payload.pid, payload.continuity_counter, expected
                );
                self.continuity_errors += 1;
            }
        }

        if !buffer.admit(priming, &payload) {
            trace!("pid {:#06x}: discarding packet while priming", payload.pid);
            self.discarded += 1;
            return Ok(true);
        }

        buffer.push(&payload);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrimingPolicy;
    use crate::format::ts::psi::{ElementaryStream, PatEntry, PatSection};
    use crate::format::ts::types::*;
    use crate::format::ts::writer::TsWriter;
    use crate::source::test_sources::FailingSource;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;

    fn demuxer(writer: TsWriter) -> TsDemuxer<MemorySource> {
        TsDemuxer::new(MemorySource::new(writer.into_bytes()))
    }

    fn counting(len: usize, start: u8) -> Vec<u8> {
        (0..len).map(|i| start.wrapping_add(i as u8)).collect()
    }

    fn single_program(video_pid: u16) -> TsWriter {
        let mut writer = TsWriter::new();
        writer.write_pat(&PatSection {
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            programs: vec![PatEntry {
                program_number: 1,
                pmt_pid: 32,
            }],
        });
        writer.write_pmt(
            32,
            &PmtSection {
                program_number: 1,
                version: 0,
                current_next: true,
                pcr_pid: video_pid,
                program_info: Vec::new(),
                streams: vec![ElementaryStream::new(STREAM_TYPE_MPEG2_VIDEO, video_pid)],
            },
        );
        writer
    }

    #[test]
    fn test_unregistered_pid() {
        let mut demuxer = demuxer(TsWriter::new());
        assert!(matches!(demuxer.read(0x100, 4), Err(DemuxError::UnregisteredPid(0x100))));
        assert!(matches!(demuxer.timestamp(0x100), Err(DemuxError::UnregisteredPid(0x100))));
        assert!(demuxer.register(0x2000).is_err());
    }

    #[test]
    fn test_read_twice_is_consecutive() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(0), None, &counting(300, 0));
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();

        let first = demuxer.read(0x100, 100).unwrap();
        let second = demuxer.read(0x100, 100).unwrap();
        assert_eq!(&first[..], &counting(100, 0)[..]);
        assert_eq!(&second[..], &counting(100, 100)[..]);
    }

    #[test]
    fn test_zero_length_read_does_not_pull() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(0), None, &[0x01; 10]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();

        assert!(demuxer.read(0x100, 0).unwrap().is_empty());
        assert_eq!(demuxer.stats().packets, 0);
        assert!(!demuxer.is_exhausted());
        assert!(matches!(demuxer.read(0x101, 0), Err(DemuxError::UnregisteredPid(0x101))));
        assert_eq!(&demuxer.read(0x100, 10).unwrap()[..], &[0x01; 10]);
    }

    #[test]
    fn test_poll_available_pulls_one_packet() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x101, STREAM_ID_AUDIO, Some(1), None, &[0x02; 20]);
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(1), None, &[0x01; 400]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();
        demuxer.register(0x101).unwrap();

        assert!(!demuxer.poll_available(0x100).unwrap());
        assert_eq!(demuxer.available(0x101).unwrap(), 20);
        assert!(demuxer.poll_available(0x100).unwrap());
        assert_eq!(demuxer.stats().packets, 2);
        // Buffered bytes are handed out without pulling the rest of the PES.
        assert!(demuxer.poll_available(0x100).unwrap());
        let chunk = demuxer.read_buffered(0x100, 1_000).unwrap();
        assert_eq!(chunk.len(), 184 - 14);
        assert_eq!(demuxer.stats().packets, 2);

        while !demuxer.read(0x100, 1_000).unwrap().is_empty() {}
        assert!(demuxer.poll_available(0x100).unwrap());
        assert!(demuxer.is_exhausted());
    }

    #[test]
    fn test_read_beyond_capacity_grows() {
        let data = counting(1000, 7);
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(0), None, &data);
        let config = DemuxConfig::new().with_initial_capacity(64).with_growth_increment(64);
        let mut demuxer = TsDemuxer::with_config(MemorySource::new(writer.into_bytes()), config);
        demuxer.register(0x100).unwrap();

        let bytes = demuxer.read(0x100, 1000).unwrap();
        assert_eq!(&bytes[..], &data[..]);
        assert!(demuxer.stats().buffer_growths > 0);
        assert!(demuxer.read(0x100, 1).unwrap().is_empty());
        assert!(demuxer.is_exhausted());
    }

    #[test]
    fn test_short_read_at_end_of_stream() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(0), None, &[9; 40]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();
        let mut buf = [0u8; 100];
        assert_eq!(demuxer.read_into(0x100, &mut buf).unwrap(), 40);
        assert_eq!(demuxer.read_into(0x100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_increasing_timestamps_on_pid_256() {
        let mut writer = single_program(256);
        let pts: Vec<u64> = (0..4).map(|i| 1_000 + i * 3_600).collect();
        for (i, &value) in pts.iter().enumerate() {
            writer.write_pes(256, STREAM_ID_VIDEO, Some(value), None, &[i as u8; 100]);
        }
        let mut demuxer = demuxer(writer);
        assert_eq!(demuxer.find_pid_for_stream_types(&[STREAM_TYPE_MPEG2_VIDEO]).unwrap(), 256);
        demuxer.register(256).unwrap();

        let mut seen = Vec::new();
        for i in 0..4 {
            let bytes = demuxer.read(256, 100).unwrap();
            assert_eq!(&bytes[..], &[i as u8; 100]);
            seen.push(demuxer.timestamp(256).unwrap().unwrap());
        }
        assert_eq!(seen, pts);
        assert_eq!(demuxer.presentation_time(256).unwrap(), Some(pts_to_time(pts[3])));
    }

    #[test]
    fn test_pat_and_video_routed_separately() {
        let mut writer = single_program(256);
        writer.write_pes(256, STREAM_ID_VIDEO, Some(10), None, &[0xAA; 150]);
        writer.write_pat(&PatSection {
            transport_stream_id: 2,
            version: 1,
            current_next: true,
            programs: vec![PatEntry {
                program_number: 1,
                pmt_pid: 32,
            }],
        });
        writer.write_pes(256, STREAM_ID_VIDEO, Some(20), None, &[0xBB; 150]);
        let mut demuxer = demuxer(writer);
        demuxer.register(PID_PAT).unwrap();
        demuxer.register(256).unwrap();

        let video = demuxer.read(256, 300).unwrap();
        assert!(video[..150].iter().all(|&b| b == 0xAA));
        assert!(video[150..].iter().all(|&b| b == 0xBB));

        let first = demuxer.read_section(PID_PAT).unwrap().unwrap();
        let second = demuxer.read_section(PID_PAT).unwrap().unwrap();
        assert_eq!(PatSection::parse(&first, true).unwrap().transport_stream_id, 1);
        assert_eq!(PatSection::parse(&second, true).unwrap().transport_stream_id, 2);
        assert!(demuxer.read_section(PID_PAT).unwrap().is_none());
        assert!(matches!(demuxer.read_section(256), Err(DemuxError::InvalidData(_))));
    }

    #[test]
    fn test_peek_and_read_converge() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(0), None, &counting(500, 3));
        let bytes = writer.into_bytes();

        let mut reading = TsDemuxer::new(MemorySource::new(bytes.clone()));
        reading.register(0x100).unwrap();
        let mut read = Vec::new();
        loop {
            let chunk = reading.read(0x100, 37).unwrap();
            if chunk.is_empty() {
                break;
            }
            read.extend_from_slice(&chunk);
        }

        let mut peeking = TsDemuxer::new(MemorySource::new(bytes));
        peeking.register(0x100).unwrap();
        let mut peeked = Vec::new();
        loop {
            let available = peeking.peek(0x100).unwrap();
            if available.is_empty() {
                break;
            }
            let n = available.len().min(37);
            peeked.extend_from_slice(&available[..n]);
            peeking.consume(0x100, n).unwrap();
        }

        assert_eq!(read, peeked);
        assert_eq!(read, counting(500, 3));
    }

    #[test]
    fn test_other_pids_routed_while_priming() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x101, STREAM_ID_AUDIO, Some(5), None, &[0x01; 50]);
        writer.write_pes(0x100, STREAM_ID_VIDEO, None, None, &[0x02; 50]);
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(7), None, &[0x03; 50]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();
        demuxer.register(0x101).unwrap();

        let video = demuxer.read(0x100, 50).unwrap();
        assert_eq!(&video[..], &[0x03; 50]);
        assert_eq!(demuxer.available(0x101).unwrap(), 50);
        assert_eq!(&demuxer.read(0x101, 50).unwrap()[..], &[0x01; 50]);
        assert_eq!(demuxer.stats().discarded, 1);
    }

    #[test]
    fn test_priming_disabled_keeps_early_bytes() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, None, None, &[0x02; 50]);
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(7), None, &[0x03; 50]);
        let config = DemuxConfig::new().with_priming(PrimingPolicy::Disabled);
        let mut demuxer = TsDemuxer::with_config(MemorySource::new(writer.into_bytes()), config);
        demuxer.register(0x100).unwrap();

        assert_eq!(&demuxer.read(0x100, 50).unwrap()[..], &[0x02; 50]);
        assert_eq!(demuxer.timestamp(0x100).unwrap(), None);
        assert_eq!(&demuxer.read(0x100, 50).unwrap()[..], &[0x03; 50]);
        assert_eq!(demuxer.timestamp(0x100).unwrap(), Some(7));
    }

    #[test]
    fn test_timestamp_independent_of_consumption() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(100), Some(90), &[0x01; 50]);
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(200), Some(190), &[0x02; 50]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();

        demuxer.read(0x100, 60).unwrap();
        assert_eq!(demuxer.timestamp(0x100).unwrap(), Some(200));
        assert_eq!(demuxer.decode_timestamp(0x100).unwrap(), Some(190));
    }

    #[test]
    fn test_continuity_gap_is_counted() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(1), None, &[0x01; 10]);
        writer.skip_continuity(0x100);
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(2), None, &[0x02; 10]);
        writer.skip_continuity(0x100);
        writer.mark_discontinuity();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(3), None, &[0x03; 10]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();

        assert_eq!(demuxer.read(0x100, 30).unwrap().len(), 30);
        assert_eq!(demuxer.stats().continuity_errors, 1);
    }

    #[test]
    fn test_source_failure_is_terminal() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(1), None, &[0x01; 500]);
        let source = FailingSource {
            inner: MemorySource::new(writer.into_bytes()),
            ok_bytes: TS_PACKET_SIZE * 2,
        };
        let mut demuxer = TsDemuxer::new(source);
        demuxer.register(0x100).unwrap();

        let err = demuxer.read(0x100, 500).unwrap_err();
        assert!(matches!(err, DemuxError::Io(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rewind_restarts_from_priming() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(1), None, &counting(80, 0));
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();

        let first = demuxer.read(0x100, 80).unwrap();
        assert!(demuxer.read(0x100, 1).unwrap().is_empty());
        demuxer.rewind().unwrap();
        assert!(!demuxer.is_exhausted());
        assert_eq!(demuxer.timestamp(0x100).unwrap(), None);
        assert_eq!(demuxer.read(0x100, 80).unwrap(), first);
    }

    #[test]
    fn test_unregister_drops_buffer() {
        let mut writer = TsWriter::new();
        writer.write_pes(0x100, STREAM_ID_VIDEO, Some(1), None, &[0x01; 10]);
        writer.write_pes(0x101, STREAM_ID_AUDIO, Some(1), None, &[0x02; 10]);
        let mut demuxer = demuxer(writer);
        demuxer.register(0x100).unwrap();
        demuxer.register(0x101).unwrap();
        assert_eq!(demuxer.registered_pids(), vec![0x100, 0x101]);

        demuxer.unregister(0x100).unwrap();
        assert!(!demuxer.is_registered(0x100));
        assert!(matches!(demuxer.unregister(0x100), Err(DemuxError::UnregisteredPid(_))));
        assert_eq!(&demuxer.read(0x101, 10).unwrap()[..], &[0x02; 10]);
    }
}
