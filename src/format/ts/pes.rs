use super::types::{PES_FIXED_HEADER_SIZE, PTS_MASK};
use crate::error::{DemuxError, Result};
use crate::utils::BitReader;
use bytes::{BufMut, BytesMut};

/// PES start code prefix, `00 00 01`.
pub const PES_START_CODE_PREFIX: u32 = 0x000001;

/// PTS_DTS_flags value announcing a PTS only.
pub const PTS_ONLY: u8 = 0b10;
/// PTS_DTS_flags value announcing both PTS and DTS.
pub const PTS_AND_DTS: u8 = 0b11;

/// Packetized Elementary Stream (PES) header structure
///
/// Only the fields needed to locate the payload and its timestamps are
/// decoded; the optional ESCR, ES rate, trick mode and extension fields are
/// skipped through `header_data_length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Length of the PES packet after this field, 0 when unbounded
    pub packet_length: u16,
    /// Data alignment indicator
    pub data_alignment: bool,
    /// Two-bit flag indicating presence of PTS/DTS fields
    pub pts_dts_flags: u8,
    /// Length of the header data following the fixed 9 bytes
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<u64>,
}

impl PesHeader {
    /// Creates a header for `stream_id` with no timestamps.
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            data_alignment: false,
            pts_dts_flags: 0,
            header_data_length: 0,
            pts: None,
            dts: None,
        }
    }

    /// Sets the PTS, masked to 33 bits.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & PTS_MASK);
        self.pts_dts_flags |= PTS_ONLY;
        self.header_data_length = self.timestamp_bytes();
        self
    }

    /// Sets the DTS, masked to 33 bits. Only written alongside a PTS.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts & PTS_MASK);
        self.pts_dts_flags |= 0b01;
        self.header_data_length = self.timestamp_bytes();
        self
    }

    fn timestamp_bytes(&self) -> u8 {
        match self.pts_dts_flags {
            PTS_AND_DTS => 10,
            PTS_ONLY => 5,
            _ => 0,
        }
    }

    /// Total header size: the fixed 9 bytes plus `header_data_length`.
    pub fn header_len(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length as usize
    }

    /// Parses a PES header at the start of `data`.
    ///
    /// Fails if the start code prefix is not `00 00 01` or the header does
    /// not fit in `data`. Marker bits inside timestamps are not checked.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(DemuxError::InvalidData(format!(
                "PES header needs {} bytes, got {}",
                PES_FIXED_HEADER_SIZE,
                data.len()
            )));
        }

        let prefix = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        if prefix != PES_START_CODE_PREFIX {
            return Err(DemuxError::InvalidData(format!(
                "PES start code prefix {:06x}",
                prefix
            )));
        }

        let mut header = PesHeader::new(data[3]);
        header.packet_length = u16::from_be_bytes([data[4], data[5]]);
        header.data_alignment = data[6] & 0x04 != 0;
        header.pts_dts_flags = (data[7] >> 6) & 0x03;
        header.header_data_length = data[8];

        if data.len() < header.header_len() {
            return Err(DemuxError::InvalidData(format!(
                "PES header data length {} overruns {} available bytes",
                header.header_data_length,
                data.len() - PES_FIXED_HEADER_SIZE
            )));
        }

        let optional = &data[PES_FIXED_HEADER_SIZE..header.header_len()];
        match header.pts_dts_flags {
            PTS_ONLY => {
                header.pts = Some(decode_timestamp(optional)?);
            }
            PTS_AND_DTS => {
                header.pts = Some(decode_timestamp(optional)?);
                header.dts = Some(decode_timestamp(optional.get(5..).unwrap_or_default())?);
            }
            _ => {}
        }

        Ok(header)
    }

    /// Writes the header to a BytesMut buffer.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8((PES_START_CODE_PREFIX >> 16) as u8);
        buf.put_u8((PES_START_CODE_PREFIX >> 8) as u8);
        buf.put_u8(PES_START_CODE_PREFIX as u8);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        // '10' marker, no scrambling, priority, copyright or original flags
        let mut flags = 0x80u8;
        if self.data_alignment {
            flags |= 0x04;
        }
        buf.put_u8(flags);
        buf.put_u8((self.pts_dts_flags & 0x03) << 6);

        let timestamps = self.timestamp_bytes();
        buf.put_u8(self.header_data_length.max(timestamps));

        match (self.pts, self.dts) {
            (Some(pts), Some(dts)) => {
                encode_timestamp(buf, 0b0011, pts);
                encode_timestamp(buf, 0b0001, dts);
            }
            (Some(pts), None) => encode_timestamp(buf, 0b0010, pts),
            _ => {}
        }

        // Stuffing up to header_data_length
        for _ in timestamps..self.header_data_length {
            buf.put_u8(0xFF);
        }
    }
}

/// Decodes a 33-bit timestamp packed into 5 bytes.
///
/// Layout: 4-bit prefix, bits 32..30, marker, bits 29..15, marker,
/// bits 14..0, marker.
pub fn decode_timestamp(data: &[u8]) -> Result<u64> {
    if data.len() < 5 {
        return Err(DemuxError::InvalidData("PES timestamp truncated".into()));
    }

    let mut reader = BitReader::new(&data[..5]);
    reader.skip_bits(4)?;
    let high = reader.read_bits(3)? as u64;
    reader.skip_bits(1)?;
    let mid = reader.read_bits(15)? as u64;
    reader.skip_bits(1)?;
    let low = reader.read_bits(15)? as u64;

    Ok((high << 30) | (mid << 15) | low)
}

/// Writes a 33-bit timestamp with the given 4-bit prefix and marker bits.
pub fn encode_timestamp(buf: &mut BytesMut, prefix: u8, ts: u64) {
    let ts = ts & PTS_MASK;

    // First byte: prefix and 3 MSB of timestamp
    buf.put_u8((prefix << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 0x01);

    // Middle 15 bits and marker
    buf.put_u16(((((ts >> 15) & 0x7FFF) << 1) | 0x01) as u16);

    // Final 15 bits and marker
    buf.put_u16((((ts & 0x7FFF) << 1) | 0x01) as u16);
}
