//! Program Specific Information: PAT and PMT sections, section reassembly
//! and the scanner that resolves stream types to PIDs.

use super::extractor::{Payload, PayloadExtractor};
use super::types::*;
use crate::error::{DemuxError, Result};
use crate::source::ByteSource;
use crate::utils::Crc32Mpeg2;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};
use std::collections::VecDeque;

/// Bytes of a long-form section header before `section_length` counts
/// (table_id and the two length bytes).
const SECTION_PREFIX_LEN: usize = 3;
const CRC_LEN: usize = 4;

fn section_length(section: &[u8]) -> Option<usize> {
    (section.len() >= SECTION_PREFIX_LEN)
        .then(|| (((section[1] & 0x0F) as usize) << 8) | section[2] as usize)
}

/// Total size of the section starting at `data[0]`, header included.
pub(crate) fn section_size(data: &[u8]) -> Option<usize> {
    section_length(data).map(|length| SECTION_PREFIX_LEN + length)
}

/// Checks the framing shared by PAT and PMT and returns the section length.
fn check_section(section: &[u8], table_id: u8, min_length: usize, verify_crc: bool) -> Result<usize> {
    let length = section_length(section)
        .ok_or_else(|| DemuxError::MalformedSection("section shorter than its header".into()))?;

    if section[0] != table_id {
        return Err(DemuxError::MalformedSection(format!(
            "expected table id {:#04x}, found {:#04x}",
            table_id, section[0]
        )));
    }
    if length > MAX_SECTION_LENGTH {
        return Err(DemuxError::MalformedSection(format!(
            "section_length {} exceeds {}",
            length, MAX_SECTION_LENGTH
        )));
    }
    if length < min_length {
        return Err(DemuxError::MalformedSection(format!(
            "section_length {} below minimum {}",
            length, min_length
        )));
    }
    if section.len() < SECTION_PREFIX_LEN + length {
        return Err(DemuxError::MalformedSection(format!(
            "section truncated: {} of {} bytes",
            section.len(),
            SECTION_PREFIX_LEN + length
        )));
    }
    if verify_crc && !Crc32Mpeg2::verify(&section[..SECTION_PREFIX_LEN + length]) {
        return Err(DemuxError::MalformedSection("CRC-32 mismatch".into()));
    }
    Ok(length)
}

/// Closes a section body: fills in section_length and appends the CRC.
fn finish_section(mut section: BytesMut) -> Bytes {
    let length = (section.len() - SECTION_PREFIX_LEN + CRC_LEN) as u16;
    section[1] = 0xB0 | ((length >> 8) as u8 & 0x0F);
    section[2] = length as u8;
    let crc = Crc32Mpeg2::checksum(&section);
    section.put_u32(crc);
    section.freeze()
}

/// One (program_number, PMT PID) pair of a PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// Program Association Table section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    /// Programs in section order; program 0 (network PID) is not listed
    pub programs: Vec<PatEntry>,
}

impl PatSection {
    /// Parses a PAT section starting at its table_id byte.
    pub fn parse(section: &[u8], verify_crc: bool) -> Result<Self> {
        let length = check_section(section, TABLE_ID_PAT, 5 + CRC_LEN, verify_crc)?;
        let end = SECTION_PREFIX_LEN + length - CRC_LEN;

        let mut programs = Vec::new();
        let mut pos = 8;
        while pos + 4 <= end {
            let program_number = u16::from_be_bytes([section[pos], section[pos + 1]]);
            let pid = u16::from_be_bytes([section[pos + 2], section[pos + 3]]) & PID_MASK;
            if program_number > 0 {
                programs.push(PatEntry {
                    program_number,
                    pmt_pid: pid,
                });
            }
            pos += 4;
        }

        Ok(Self {
            transport_stream_id: u16::from_be_bytes([section[3], section[4]]),
            version: (section[5] >> 1) & 0x1F,
            current_next: section[5] & 0x01 != 0,
            programs,
        })
    }

    /// Serializes the section, CRC included.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(TABLE_ID_PAT);
        buf.put_u16(0);
        buf.put_u16(self.transport_stream_id);
        buf.put_u8(0xC0 | (self.version & 0x1F) << 1 | self.current_next as u8);
        buf.put_u8(0);
        buf.put_u8(0);
        for entry in &self.programs {
            buf.put_u16(entry.program_number);
            buf.put_u16(entry.pmt_pid & PID_MASK | 7 << 13);
        }
        finish_section(buf)
    }
}

/// One elementary stream entry of a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    /// Raw ES_info descriptor loop
    pub es_info: Vec<u8>,
}

impl ElementaryStream {
    pub fn new(stream_type: u8, elementary_pid: u16) -> Self {
        Self {
            stream_type,
            elementary_pid,
            es_info: Vec::new(),
        }
    }
}

/// Program Map Table section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmtSection {
    pub program_number: u16,
    pub version: u8,
    pub current_next: bool,
    pub pcr_pid: u16,
    /// Raw program_info descriptor loop
    pub program_info: Vec<u8>,
    pub streams: Vec<ElementaryStream>,
}

impl PmtSection {
    /// Parses a PMT section starting at its table_id byte.
    ///
    /// A `program_info_length` larger than `section_length - 9` makes the
    /// section malformed. A stream entry whose descriptors run past the
    /// section ends the stream loop.
    pub fn parse(section: &[u8], verify_crc: bool) -> Result<Self> {
        let length = check_section(section, TABLE_ID_PMT, 9 + CRC_LEN, verify_crc)?;
        let end = SECTION_PREFIX_LEN + length - CRC_LEN;

        let program_info_length = (((section[10] & 0x0F) as usize) << 8) | section[11] as usize;
        if program_info_length > length - 9 {
            return Err(DemuxError::MalformedSection(format!(
                "program_info_length {} inconsistent with section_length {}",
                program_info_length, length
            )));
        }

        let mut pos = 12 + program_info_length;
        let program_info = section[12..pos.min(end)].to_vec();

        let mut streams = Vec::new();
        while pos + 5 <= end {
            let stream_type = section[pos];
            let elementary_pid = u16::from_be_bytes([section[pos + 1], section[pos + 2]]) & PID_MASK;
            let es_info_length = (((section[pos + 3] & 0x0F) as usize) << 8) | section[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                warn!(
                    "ES_info_length {} of pid {:#06x} runs past the section",
                    es_info_length, elementary_pid
                );
                break;
            }
            streams.push(ElementaryStream {
                stream_type,
                elementary_pid,
                es_info: section[pos..pos + es_info_length].to_vec(),
            });
            pos += es_info_length;
        }

        Ok(Self {
            program_number: u16::from_be_bytes([section[3], section[4]]),
            version: (section[5] >> 1) & 0x1F,
            current_next: section[5] & 0x01 != 0,
            pcr_pid: u16::from_be_bytes([section[8], section[9]]) & PID_MASK,
            program_info,
            streams,
        })
    }

    /// Returns the first stream whose type is in `stream_types`.
    pub fn find_stream(&self, stream_types: &[u8]) -> Option<&ElementaryStream> {
        self.streams
            .iter()
            .find(|s| stream_types.contains(&s.stream_type))
    }

    /// Serializes the section, CRC included.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(TABLE_ID_PMT);
        buf.put_u16(0);
        buf.put_u16(self.program_number);
        buf.put_u8(0xC0 | (self.version & 0x1F) << 1 | self.current_next as u8);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u16(self.pcr_pid & PID_MASK | 7 << 13);
        buf.put_u16((self.program_info.len() as u16) & 0x0FFF | 0xF << 12);
        buf.put_slice(&self.program_info);
        for stream in &self.streams {
            buf.put_u8(stream.stream_type);
            buf.put_u16(stream.elementary_pid & PID_MASK | 7 << 13);
            buf.put_u16((stream.es_info.len() as u16) & 0x0FFF | 0xF << 12);
            buf.put_slice(&stream.es_info);
        }
        finish_section(buf)
    }
}

/// Reassembles PSI sections from the payloads of a single PID.
///
/// At a payload unit start the pointer field counts the bytes that finish
/// the section in progress; the next section starts right after them.
/// Sections may continue over following packets, and several may be packed
/// back to back in one payload until `0xFF` stuffing. Completed sections
/// queue up until [`pop_section`](Self::pop_section) takes them.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buf: BytesMut,
    in_progress: bool,
    ready: VecDeque<Bytes>,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a section is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_progress = false;
        self.ready.clear();
    }

    /// Takes the oldest completed section.
    pub fn pop_section(&mut self) -> Option<Bytes> {
        self.ready.pop_front()
    }

    /// Feeds one payload. Returns the number of sections it completed.
    pub fn push(&mut self, payload: &Payload) -> usize {
        let queued = self.ready.len();
        let data = &payload.data[..];
        if payload.unit_start {
            let pointer = match data.first() {
                Some(&pointer) => pointer as usize,
                None => return 0,
            };
            let start = 1 + pointer;
            if start > data.len() {
                warn!("pid {:#06x}: pointer field {} overruns payload", payload.pid, pointer);
                self.buf.clear();
                self.in_progress = false;
                return 0;
            }
            if self.in_progress {
                self.buf.extend_from_slice(&data[1..start]);
                self.drain();
                if self.in_progress {
                    debug!("pid {:#06x}: section restarted before completion", payload.pid);
                }
            }
            self.buf.clear();
            self.buf.extend_from_slice(&data[start..]);
            self.in_progress = true;
        } else if self.in_progress {
            self.buf.extend_from_slice(data);
        } else {
            return 0;
        }
        self.drain();
        self.ready.len() - queued
    }

    /// Moves every complete section at the front of `buf` to the queue.
    fn drain(&mut self) {
        loop {
            // table_id 0xFF marks stuffing up to the end of the payload
            if self.buf.is_empty() || self.buf[0] == 0xFF {
                self.buf.clear();
                self.in_progress = false;
                return;
            }
            let length = match section_length(&self.buf) {
                Some(length) => length,
                None => return,
            };
            if length > MAX_SECTION_LENGTH {
                // Hand it over as is; parsing rejects it.
                self.ready.push_back(self.buf.split().freeze());
                self.in_progress = false;
                return;
            }
            let total = SECTION_PREFIX_LEN + length;
            if self.buf.len() < total {
                return;
            }
            self.ready.push_back(self.buf.split_to(total).freeze());
        }
    }
}

/// Resolves stream types to elementary PIDs by walking the PAT and PMTs.
///
/// The scanner pulls packets from the extractor it borrows; packets of other
/// PIDs read while scanning are consumed. Sections already reassembled for
/// a PID stay queued while the scanner keeps reading that PID, so programs
/// sharing one PMT PID are all seen.
pub struct PsiScanner<'a, S> {
    extractor: &'a mut PayloadExtractor<S>,
    verify_crc: bool,
    assembler: SectionAssembler,
    assembler_pid: Option<u16>,
}

impl<'a, S: ByteSource> PsiScanner<'a, S> {
    pub fn new(extractor: &'a mut PayloadExtractor<S>) -> Self {
        Self {
            extractor,
            verify_crc: false,
            assembler: SectionAssembler::new(),
            assembler_pid: None,
        }
    }

    pub fn with_crc_verification(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Reads the next complete section carried on `pid`.
    pub fn read_section(&mut self, pid: u16) -> Result<Option<Bytes>> {
        if self.assembler_pid != Some(pid) {
            self.assembler.reset();
            self.assembler_pid = Some(pid);
        }
        loop {
            if let Some(section) = self.assembler.pop_section() {
                return Ok(Some(section));
            }
            let require_start = !self.assembler.in_progress();
            let payload = match self.extractor.extract_section_payload(pid, require_start)? {
                Some(payload) => payload,
                None => return Ok(None),
            };
            self.assembler.push(&payload);
        }
    }

    /// Reads PID 0 until a well-formed PAT arrives.
    pub fn read_pat(&mut self) -> Result<Option<PatSection>> {
        while let Some(section) = self.read_section(PID_PAT)? {
            match PatSection::parse(&section, self.verify_crc) {
                Ok(pat) => {
                    debug!("PAT lists {} programs", pat.programs.len());
                    return Ok(Some(pat));
                }
                Err(DemuxError::MalformedSection(reason)) => {
                    warn!("skipping malformed PAT: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Reads the next section on `pmt_pid` as a PMT. `Ok(None)` when the
    /// section is malformed or the source ends.
    fn read_pmt(&mut self, pmt_pid: u16) -> Result<Option<PmtSection>> {
        let section = match self.read_section(pmt_pid)? {
            Some(section) => section,
            None => return Ok(None),
        };
        match PmtSection::parse(&section, self.verify_crc) {
            Ok(pmt) => Ok(Some(pmt)),
            Err(DemuxError::MalformedSection(reason)) => {
                warn!("skipping malformed PMT on pid {:#06x}: {}", pmt_pid, reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the PID of the first elementary stream, across the PMTs in
    /// PAT order, whose stream type is in `stream_types`.
    ///
    /// Malformed PMTs are skipped. Fails with [`DemuxError::PidNotFound`]
    /// when no PMT yields a match before the source ends.
    pub fn find_pid_for_stream_types(&mut self, stream_types: &[u8]) -> Result<u16> {
        let not_found = || DemuxError::PidNotFound(stream_types.to_vec());

        let pat = self.read_pat()?.ok_or_else(not_found)?;
        for entry in &pat.programs {
            if let Some(pmt) = self.read_pmt(entry.pmt_pid)? {
                if let Some(stream) = pmt.find_stream(stream_types) {
                    debug!(
                        "program {} carries stream type {:#04x} on pid {:#06x}",
                        pmt.program_number, stream.stream_type, stream.elementary_pid
                    );
                    return Ok(stream.elementary_pid);
                }
            }
        }

        Err(not_found())
    }

    /// Returns every well-formed PMT, in PAT order.
    pub fn scan_programs(&mut self) -> Result<Vec<PmtSection>> {
        let pat = match self.read_pat()? {
            Some(pat) => pat,
            None => return Ok(Vec::new()),
        };
        let mut programs = Vec::new();
        for entry in &pat.programs {
            if let Some(pmt) = self.read_pmt(entry.pmt_pid)? {
                programs.push(pmt);
            }
        }
        Ok(programs)
    }
}
