use bytes::{BufMut, BytesMut};
use std::fmt;
use std::time::Duration;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_NULL: u16 = 0x1FFF;
/// Highest PID reserved for PSI/SI tables.
pub const PID_RESERVED_MAX: u16 = 0x001F;
pub const PID_MASK: u16 = 0x1FFF;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG1_VIDEO: u8 = 0x01;
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AC3: u8 = 0x81;

// Stream IDs
pub const STREAM_ID_VIDEO: u8 = 0xe0;
pub const STREAM_ID_AUDIO: u8 = 0xc0;

// Constants
pub const SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const PES_FIXED_HEADER_SIZE: usize = 9;
/// Largest `section_length` allowed for PAT and PMT sections.
pub const MAX_SECTION_LENGTH: usize = 1021;
pub const PTS_HZ: u64 = 90_000;
pub const PTS_MASK: u64 = (1 << 33) - 1;

/// Adaptation field control, bits 4–5 of header byte 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationFieldControl {
    Reserved,
    PayloadOnly,
    AdaptationOnly,
    AdaptationAndPayload,
}

impl AdaptationFieldControl {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            1 => AdaptationFieldControl::PayloadOnly,
            2 => AdaptationFieldControl::AdaptationOnly,
            3 => AdaptationFieldControl::AdaptationAndPayload,
            _ => AdaptationFieldControl::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            AdaptationFieldControl::Reserved => 0,
            AdaptationFieldControl::PayloadOnly => 1,
            AdaptationFieldControl::AdaptationOnly => 2,
            AdaptationFieldControl::AdaptationAndPayload => 3,
        }
    }

    pub fn has_adaptation_field(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::AdaptationOnly | AdaptationFieldControl::AdaptationAndPayload
        )
    }

    pub fn has_payload(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::PayloadOnly | AdaptationFieldControl::AdaptationAndPayload
        )
    }
}

/// The 4-byte transport packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_control: AdaptationFieldControl,
    pub continuity_counter: u8,
}

impl Default for TsHeader {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_control: AdaptationFieldControl::PayloadOnly,
            continuity_counter: 0,
        }
    }
}

impl TsHeader {
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(SYNC_BYTE);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let b3 = (self.scrambling_control & 0x3) << 6
            | self.adaptation_field_control.bits() << 4
            | (self.continuity_counter & 0x0f);
        buf.put_u8(b3);
    }
}

/// One 188-byte transport packet. The first byte is always the sync byte.
#[derive(Clone, PartialEq, Eq)]
pub struct TsPacket {
    data: [u8; TS_PACKET_SIZE],
}

impl TsPacket {
    /// Wraps raw packet bytes, returning `None` unless byte 0 is the sync byte.
    pub fn new(data: [u8; TS_PACKET_SIZE]) -> Option<Self> {
        (data[0] == SYNC_BYTE).then_some(Self { data })
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let data: [u8; TS_PACKET_SIZE] = data.try_into().ok()?;
        Self::new(data)
    }

    pub fn as_bytes(&self) -> &[u8; TS_PACKET_SIZE] {
        &self.data
    }

    pub fn pid(&self) -> u16 {
        (((self.data[1] & 0x1F) as u16) << 8) | self.data[2] as u16
    }

    pub fn payload_unit_start(&self) -> bool {
        self.data[1] & 0x40 != 0
    }

    pub fn header(&self) -> TsHeader {
        let data = &self.data;
        TsHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: self.pid(),
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: AdaptationFieldControl::from_bits(data[3] >> 4),
            continuity_counter: data[3] & 0x0F,
        }
    }
}

impl fmt::Debug for TsPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsPacket")
            .field("header", &self.header())
            .finish_non_exhaustive()
    }
}

/// Converts a 90 kHz timestamp to a duration.
pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(((pts as u128 * 1_000_000_000) / PTS_HZ as u128) as u64)
}

/// Converts a duration to a 90 kHz timestamp, wrapped to 33 bits.
pub fn time_to_pts(time: Duration) -> u64 {
    ((time.as_nanos() * PTS_HZ as u128 / 1_000_000_000) as u64) & PTS_MASK
}
