use super::types::*;
use crate::error::{DemuxError, Result};

/// Decoded adaptation field of a transport packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// Value of the adaptation_field_length byte
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    /// Program clock reference in 27 MHz units
    pub pcr: Option<u64>,
    /// Original program clock reference in 27 MHz units
    pub opcr: Option<u64>,
    pub splice_countdown: Option<i8>,
}

/// Where the payload of a packet starts, and its adaptation field if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketLayout {
    pub header: TsHeader,
    pub adaptation: Option<AdaptationField>,
    /// Offset of the first payload byte; equals the packet size when the
    /// packet carries no payload.
    pub payload_offset: usize,
}

/// Splits a packet into header, adaptation field and payload offset.
///
/// Fails when the adaptation field length runs past the end of the packet.
pub fn parse_layout(packet: &TsPacket) -> Result<PacketLayout> {
    let header = packet.header();
    let afc = header.adaptation_field_control;

    let mut payload_offset = TS_HEADER_SIZE;
    let mut adaptation = None;
    if afc.has_adaptation_field() {
        let field = parse_adaptation_field(packet.as_bytes(), TS_HEADER_SIZE)?;
        payload_offset += 1 + field.length;
        adaptation = Some(field);
    }

    if !afc.has_payload() {
        payload_offset = TS_PACKET_SIZE;
    }

    Ok(PacketLayout {
        header,
        adaptation,
        payload_offset,
    })
}

fn read_clock_reference(data: &[u8]) -> u64 {
    let base = ((data[0] as u64) << 25)
        | ((data[1] as u64) << 17)
        | ((data[2] as u64) << 9)
        | ((data[3] as u64) << 1)
        | ((data[4] & 0x80) as u64 >> 7);
    let ext = (((data[4] & 0x01) as u64) << 8) | (data[5] as u64);
    base * 300 + ext
}

/// Parses the adaptation field whose length byte sits at `offset`.
pub fn parse_adaptation_field(data: &[u8], offset: usize) -> Result<AdaptationField> {
    let length = *data
        .get(offset)
        .ok_or_else(|| DemuxError::InvalidData("Adaptation field missing".into()))?
        as usize;

    if offset + 1 + length > data.len() {
        return Err(DemuxError::InvalidData(format!(
            "Adaptation field length {} overruns packet",
            length
        )));
    }

    let mut field = AdaptationField {
        length,
        ..Default::default()
    };
    if length == 0 {
        return Ok(field);
    }

    let end = offset + 1 + length;
    let flags = data[offset + 1];
    field.discontinuity = (flags & 0x80) != 0;
    field.random_access = (flags & 0x40) != 0;
    field.es_priority = (flags & 0x20) != 0;

    let mut pos = offset + 2;

    if flags & 0x10 != 0 {
        if end < pos + 6 {
            return Err(DemuxError::InvalidData("PCR data too short".into()));
        }
        field.pcr = Some(read_clock_reference(&data[pos..pos + 6]));
        pos += 6;
    }

    if flags & 0x08 != 0 {
        if end < pos + 6 {
            return Err(DemuxError::InvalidData("OPCR data too short".into()));
        }
        field.opcr = Some(read_clock_reference(&data[pos..pos + 6]));
        pos += 6;
    }

    if flags & 0x04 != 0 {
        if end < pos + 1 {
            return Err(DemuxError::InvalidData("Splice countdown too short".into()));
        }
        field.splice_countdown = Some(data[pos] as i8);
    }

    Ok(field)
}
